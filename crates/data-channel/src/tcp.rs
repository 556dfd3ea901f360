//! TCP data connections.
//!
//! Passive mode connects out to the address the server announced; active
//! mode binds a listener and waits for the server to connect back. Both
//! honour a connect timeout and a cancellation token.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::DataChannelError;
use crate::stream::DataStream;
use crate::{TCP_ACCEPT_TIMEOUT, TCP_BUFFER_SIZE, TCP_CONNECT_TIMEOUT};

/// A data connection over TCP, buffered on the write side.
#[derive(Debug)]
pub struct TcpDataStream {
    inner: BufWriter<TcpStream>,
    position: u64,
    peer: SocketAddr,
}

impl TcpDataStream {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "could not disable Nagle on data connection");
        }
        Self {
            inner: BufWriter::with_capacity(TCP_BUFFER_SIZE, stream),
            position: 0,
            peer,
        }
    }

    /// Passive mode: connects to the address from the server's reply.
    pub async fn connect(
        addr: SocketAddr,
        cancel: &CancellationToken,
    ) -> Result<Self, DataChannelError> {
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DataChannelError::Cancelled);
            }
            result = tokio::time::timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect(addr)) => {
                match result {
                    Ok(Ok(s)) => {
                        info!(%addr, "data connection opened");
                        s
                    }
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Err(DataChannelError::Timeout),
                }
            }
        };
        Ok(Self::new(stream, addr))
    }

    /// Active mode, first half: binds the listener whose address is sent
    /// to the server.
    pub async fn listen(bind: SocketAddr) -> Result<TcpListener, DataChannelError> {
        let listener = TcpListener::bind(bind).await?;
        info!(addr = %listener.local_addr()?, "data listener bound");
        Ok(listener)
    }

    /// Active mode, second half: waits for the server to connect back.
    /// The listener is consumed; one connection per transfer.
    pub async fn accept(
        listener: TcpListener,
        cancel: &CancellationToken,
    ) -> Result<Self, DataChannelError> {
        let (stream, peer) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DataChannelError::Cancelled);
            }
            result = tokio::time::timeout(TCP_ACCEPT_TIMEOUT, listener.accept()) => {
                match result {
                    Ok(Ok(pair)) => {
                        info!(addr = %pair.1, "data connection accepted");
                        pair
                    }
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Err(DataChannelError::Timeout),
                }
            }
        };
        Ok(Self::new(stream, peer))
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl AsyncRead for TcpDataStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            this.position += (buf.filled().len() - before) as u64;
        }
        poll
    }
}

impl AsyncWrite for TcpDataStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            this.position += n as u64;
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl DataStream for TcpDataStream {
    fn position(&self) -> u64 {
        self.position
    }

    fn set_position(&mut self, offset: u64) {
        self.position = offset;
    }

    fn drain(
        &mut self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), DataChannelError>> + Send + '_>> {
        Box::pin(async move {
            self.inner.flush().await?;
            debug!(peer = %self.peer, position = self.position, "data connection drained");
            Ok(())
        })
    }
}
