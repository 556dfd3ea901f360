//! Local byte sources for uploads.

use std::future::Future;
use std::io::{self, Cursor, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeekExt, ReadBuf};

/// Future returned by [`LocalSource::seek_to`].
pub type SeekFuture<'a> = Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>;

/// Something an upload reads from.
///
/// Resume needs to reposition the source, so sources say up front whether
/// they can.
pub trait LocalSource: AsyncRead + Send + Unpin {
    fn can_seek(&self) -> bool;

    /// Moves the read position to `offset` bytes from the start.
    fn seek_to(&mut self, offset: u64) -> SeekFuture<'_>;
}

impl LocalSource for tokio::fs::File {
    fn can_seek(&self) -> bool {
        true
    }

    fn seek_to(&mut self, offset: u64) -> SeekFuture<'_> {
        Box::pin(async move {
            self.seek(SeekFrom::Start(offset)).await?;
            Ok(())
        })
    }
}

impl<T> LocalSource for Cursor<T>
where
    T: AsRef<[u8]> + Send + Unpin,
{
    fn can_seek(&self) -> bool {
        true
    }

    fn seek_to(&mut self, offset: u64) -> SeekFuture<'_> {
        self.set_position(offset);
        Box::pin(async { Ok(()) })
    }
}

/// Wraps a reader that can only move forward, such as a pipe.
#[derive(Debug)]
pub struct Forward<R>(pub R);

impl<R: AsyncRead + Unpin> AsyncRead for Forward<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl<R: AsyncRead + Send + Unpin> LocalSource for Forward<R> {
    fn can_seek(&self) -> bool {
        false
    }

    fn seek_to(&mut self, _offset: u64) -> SeekFuture<'_> {
        Box::pin(async {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "source cannot be repositioned",
            ))
        })
    }
}
