//! Classification of data-connection faults and mid-transfer recovery.

use ftpflow_data_channel::DataStream;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::TransferError;
use crate::session::FtpSession;

/// What the transfer loop does after a fault.
pub enum FaultOutcome {
    /// The fault is harmless; keep the current stream.
    Continue(Box<dyn DataStream>),
    /// The old stream is gone; carry on with this one.
    ResumeWith(Box<dyn DataStream>),
    Fatal(TransferError),
}

impl std::fmt::Debug for FaultOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue(_) => f.write_str("Continue"),
            Self::ResumeWith(stream) => write!(f, "ResumeWith(position {})", stream.position()),
            Self::Fatal(e) => f.debug_tuple("Fatal").field(e).finish(),
        }
    }
}

/// How to reopen the data connection for a given direction.
#[derive(Debug, Clone, Copy)]
pub enum Reopen<'a> {
    /// Upload: append to the remote path.
    Append(&'a str),
    /// Download: retrieve the remote path from the confirmed offset.
    ReadFrom(&'a str),
}

/// Classifies `error` raised on `stream`.
///
/// A timeout once every byte has moved is absorbed. Connection-reset faults
/// get exactly one fresh connection positioned at `confirmed`, the last
/// offset known to have reached the other side. Everything else is fatal,
/// and so is any failure while recovering.
pub async fn handle_fault<S: FtpSession + ?Sized>(
    session: &mut S,
    mut stream: Box<dyn DataStream>,
    reopen: Reopen<'_>,
    confirmed: u64,
    complete: bool,
    error: TransferError,
) -> FaultOutcome {
    if error.is_timeout() && complete {
        warn!(offset = confirmed, "timeout after the last byte, ignoring");
        return FaultOutcome::Continue(stream);
    }
    if !error.is_connection_reset() {
        return FaultOutcome::Fatal(error);
    }

    info!(offset = confirmed, error = %error, "data connection lost, resuming");
    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "closing broken data connection");
    }
    drop(stream);

    let reopened = match reopen {
        Reopen::Append(path) => session.open_append(path, None).await,
        Reopen::ReadFrom(path) => session.open_read(path, confirmed).await,
    };
    match reopened {
        Ok(mut fresh) => {
            fresh.set_position(confirmed);
            FaultOutcome::ResumeWith(fresh)
        }
        Err(recovery) => FaultOutcome::Fatal(TransferError::Resume {
            original: Box::new(error),
            recovery: Box::new(recovery),
        }),
    }
}
