//! In-memory data connection.
//!
//! A [`MemoryStream`] reads from and writes into a [`SharedFile`] at its own
//! offset, so several streams opened one after another against the same file
//! behave like successive data connections to one remote path. Faults can be
//! injected at a byte offset to exercise recovery paths.

use std::io::{self, ErrorKind};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::DataChannelError;
use crate::stream::DataStream;

/// Contents of an in-memory file plus traffic counters.
#[derive(Debug, Default)]
pub struct MemoryFile {
    pub data: Vec<u8>,
    /// Bytes accepted by writes across every stream opened on this file.
    pub bytes_written: u64,
    /// Bytes served by reads across every stream opened on this file.
    pub bytes_read: u64,
}

impl MemoryFile {
    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }
}

/// A file shared between the streams that open it.
pub type SharedFile = Arc<Mutex<MemoryFile>>;

/// A fault that fires once, on the first read or write that starts at or
/// after the given offset. The failing call transfers no bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFault {
    /// Fails with `ConnectionReset`.
    ResetAt(u64),
    /// Fails with `TimedOut`.
    TimeoutAt(u64),
}

impl MemoryFault {
    fn offset(self) -> u64 {
        match self {
            Self::ResetAt(offset) | Self::TimeoutAt(offset) => offset,
        }
    }

    fn into_error(self) -> io::Error {
        match self {
            Self::ResetAt(offset) => io::Error::new(
                ErrorKind::ConnectionReset,
                format!("data connection reset at offset {offset}"),
            ),
            Self::TimeoutAt(offset) => io::Error::new(
                ErrorKind::TimedOut,
                format!("data connection timed out at offset {offset}"),
            ),
        }
    }
}

/// A data connection backed by a [`SharedFile`].
#[derive(Debug)]
pub struct MemoryStream {
    file: SharedFile,
    position: u64,
    fault: Option<MemoryFault>,
    accepts_length_hint: bool,
    length_hint: Option<u64>,
}

impl MemoryStream {
    /// Opens a stream on `file` positioned at `offset`.
    pub fn new(file: SharedFile, offset: u64) -> Self {
        Self {
            file,
            position: offset,
            fault: None,
            accepts_length_hint: true,
            length_hint: None,
        }
    }

    /// Arms a one-shot fault.
    pub fn with_fault(mut self, fault: MemoryFault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// Makes [`DataStream::set_length_hint`] fail, like servers that refuse it.
    pub fn rejecting_length_hint(mut self) -> Self {
        self.accepts_length_hint = false;
        self
    }

    /// The last length hint received, if any.
    pub fn length_hint(&self) -> Option<u64> {
        self.length_hint
    }

    fn take_fault(&mut self) -> Option<io::Error> {
        match self.fault {
            Some(fault) if self.position >= fault.offset() => {
                self.fault = None;
                Some(fault.into_error())
            }
            _ => None,
        }
    }
}

impl AsyncRead for MemoryStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(err) = this.take_fault() {
            return Poll::Ready(Err(err));
        }
        let mut file = this.file.lock().unwrap_or_else(PoisonError::into_inner);
        let start = usize::try_from(this.position).unwrap_or(usize::MAX);
        if start >= file.data.len() {
            return Poll::Ready(Ok(()));
        }
        let n = buf.remaining().min(file.data.len() - start);
        buf.put_slice(&file.data[start..start + n]);
        file.bytes_read += n as u64;
        this.position += n as u64;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MemoryStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Some(err) = this.take_fault() {
            return Poll::Ready(Err(err));
        }
        let mut file = this.file.lock().unwrap_or_else(PoisonError::into_inner);
        let start = usize::try_from(this.position)
            .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "offset out of range"))?;
        if file.data.len() < start {
            file.data.resize(start, 0);
        }
        let overlap = (file.data.len() - start).min(buf.len());
        file.data[start..start + overlap].copy_from_slice(&buf[..overlap]);
        file.data.extend_from_slice(&buf[overlap..]);
        file.bytes_written += buf.len() as u64;
        this.position += buf.len() as u64;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl DataStream for MemoryStream {
    fn position(&self) -> u64 {
        self.position
    }

    fn set_position(&mut self, offset: u64) {
        self.position = offset;
    }

    fn set_length_hint(&mut self, length: u64) -> Result<(), DataChannelError> {
        if !self.accepts_length_hint {
            return Err(DataChannelError::Unsupported("length hint"));
        }
        self.length_hint = Some(length);
        Ok(())
    }
}
