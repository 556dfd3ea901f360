//! Single-file transfer engine.
//!
//! [`TransferClient`] drives one [`FtpSession`]: it resolves where a transfer
//! starts, moves the bytes in rate-limited chunks, recovers from broken data
//! connections, reads the completion reply, and optionally verifies the
//! result by checksum with retry escalation.

mod checksum;
mod client;
mod completion;
mod config;
mod download;
mod error;
mod existence;
mod keepalive;
mod progress;
mod resume;
mod session;
mod source;
mod throttle;
mod upload;
mod validation;
mod verify;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use checksum::{Hasher, checksum_bytes, checksum_reader, file_checksum};
pub use client::{DownloadOptions, TransferClient, UploadOptions};
pub use config::TransferConfig;
pub use error::TransferError;
pub use existence::{
    DownloadPlan, SkipReason, StartPosition, UploadPlan, resolve_download, resolve_upload,
};
pub use progress::{BatchContext, ProgressCallback, ProgressSnapshot};
pub use resume::{FaultOutcome, Reopen, handle_fault};
pub use session::{FtpSession, SessionFuture};
pub use source::{Forward, LocalSource, SeekFuture};
pub use throttle::Throttle;
pub use validation::{
    normalize_directory, remote_file_name, remote_parent, validate_file_name,
    validate_remote_path,
};
