//! The data-connection abstraction consumed by the transfer engine.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::DataChannelError;

/// A data connection opened by the control channel for one transfer.
///
/// Bytes move through the `AsyncRead`/`AsyncWrite` halves. The extra
/// methods carry what a plain socket cannot express: the logical offset in
/// the remote file, a size hint, and an explicit drain acknowledgment.
pub trait DataStream: AsyncRead + AsyncWrite + Send + Unpin {
    /// Offset in the remote file the next byte will be read from or written to.
    fn position(&self) -> u64;

    /// Moves the logical offset. The server positions the real file through
    /// the command that opened the connection, so this never touches the wire.
    fn set_position(&mut self, offset: u64);

    /// Announces the final file length. Streams that cannot use it say so.
    fn set_length_hint(&mut self, _length: u64) -> Result<(), DataChannelError> {
        Err(DataChannelError::Unsupported("length hint"))
    }

    /// Resolves once every byte written so far has been handed to the
    /// transport. Callers bound the wait with their own timeout.
    fn drain(&mut self) -> Pin<Box<dyn Future<Output = Result<(), DataChannelError>> + Send + '_>> {
        Box::pin(async move {
            self.flush().await?;
            Ok(())
        })
    }
}

impl<T: DataStream + ?Sized> DataStream for Box<T> {
    fn position(&self) -> u64 {
        (**self).position()
    }

    fn set_position(&mut self, offset: u64) {
        (**self).set_position(offset);
    }

    fn set_length_hint(&mut self, length: u64) -> Result<(), DataChannelError> {
        (**self).set_length_hint(length)
    }

    fn drain(&mut self) -> Pin<Box<dyn Future<Output = Result<(), DataChannelError>> + Send + '_>> {
        (**self).drain()
    }
}
