//! The control-channel collaborator the engine drives.

use std::future::Future;
use std::pin::Pin;

use ftpflow_data_channel::DataStream;
use ftpflow_protocol::{ChecksumAlgorithm, FtpReply};

use crate::TransferError;

/// Future returned by [`FtpSession`] methods.
pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// A logged-in control connection able to open data connections.
///
/// One session serves one transfer at a time; every method takes
/// `&mut self`. Implementations own the command grammar and the reply
/// parsing, the engine only sequences calls.
pub trait FtpSession: Send {
    /// Opens a data connection that stores `path` from offset 0.
    fn open_write<'a>(
        &'a mut self,
        path: &'a str,
        size_hint: Option<u64>,
    ) -> SessionFuture<'a, Box<dyn DataStream>>;

    /// Opens a data connection that appends to `path`.
    fn open_append<'a>(
        &'a mut self,
        path: &'a str,
        size_hint: Option<u64>,
    ) -> SessionFuture<'a, Box<dyn DataStream>>;

    /// Opens a data connection that retrieves `path` starting at `offset`.
    fn open_read<'a>(
        &'a mut self,
        path: &'a str,
        offset: u64,
    ) -> SessionFuture<'a, Box<dyn DataStream>>;

    fn file_exists<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, bool>;

    /// Remote size, `None` when the server cannot tell.
    fn file_size<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, Option<u64>>;

    fn delete_file<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, ()>;

    fn directory_exists<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, bool>;

    fn create_directory<'a>(&'a mut self, path: &'a str) -> SessionFuture<'a, ()>;

    /// Sends a keep-alive. Returns whether a command actually went out, in
    /// which case its reply is still queued on the control channel.
    fn noop(&mut self) -> SessionFuture<'_, bool>;

    /// Reads the next reply. With `drain_noops`, queued keep-alive replies
    /// are consumed first so the returned reply belongs to the transfer.
    fn get_reply(&mut self, drain_noops: bool) -> SessionFuture<'_, FtpReply>;

    /// Hash algorithms the server advertised.
    fn checksum_algorithms(&self) -> Vec<ChecksumAlgorithm>;

    /// Asks the server for the hex digest of `path`.
    fn remote_checksum<'a>(
        &'a mut self,
        path: &'a str,
        algorithm: ChecksumAlgorithm,
    ) -> SessionFuture<'a, String>;
}
