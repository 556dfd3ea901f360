//! Decides where a transfer starts, and whether it needs to run at all.

use std::path::Path;

use ftpflow_protocol::{ExistsMode, LocalExistsMode};
use tracing::{debug, warn};

use crate::TransferError;
use crate::session::FtpSession;

/// Why a transfer was not needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The target exists and the mode says to leave it alone.
    Exists,
    /// The target already holds every byte of the source.
    AlreadyComplete,
}

/// Offsets an upload starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartPosition {
    /// Where reading the local source begins.
    pub local_offset: u64,
    /// Where writing the remote file begins.
    pub remote_offset: u64,
    /// Remote length before the transfer, when it was asked for and known.
    pub remote_length: Option<u64>,
    /// Open the data connection in append mode.
    pub append: bool,
}

impl StartPosition {
    /// Full transfer into a fresh remote file.
    pub const FROM_START: Self = Self {
        local_offset: 0,
        remote_offset: 0,
        remote_length: None,
        append: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPlan {
    Skip(SkipReason),
    Transfer(StartPosition),
}

/// Resolves an upload of `local_length` bytes against the remote `path`.
///
/// `known_exists` short-circuits the existence query when the caller has
/// already listed the remote directory.
pub async fn resolve_upload<S: FtpSession + ?Sized>(
    session: &mut S,
    path: &str,
    mode: ExistsMode,
    known_exists: Option<bool>,
    local_length: u64,
) -> Result<UploadPlan, TransferError> {
    let position = match mode {
        ExistsMode::NoCheck => StartPosition::FROM_START,
        ExistsMode::ResumeNoCheck | ExistsMode::AddToEndNoCheck => {
            let remote = query_size(session, path).await;
            offsets(mode, remote, local_length)
        }
        _ => {
            let exists = match known_exists {
                Some(exists) => exists,
                None => session.file_exists(path).await?,
            };
            if !exists {
                debug!(path, "remote target absent");
                StartPosition::FROM_START
            } else {
                match mode {
                    ExistsMode::Skip => {
                        debug!(path, "remote target exists, skipping");
                        return Ok(UploadPlan::Skip(SkipReason::Exists));
                    }
                    ExistsMode::Overwrite => {
                        debug!(path, "deleting existing remote target");
                        session.delete_file(path).await?;
                        StartPosition::FROM_START
                    }
                    _ => {
                        let remote = query_size(session, path).await;
                        offsets(mode, remote, local_length)
                    }
                }
            }
        }
    };

    // A remote at least as long as the source leaves nothing to resume.
    if mode.is_resume() && position.remote_length.is_some_and(|remote| remote >= local_length) {
        debug!(path, length = local_length, "remote target already complete");
        return Ok(UploadPlan::Skip(SkipReason::AlreadyComplete));
    }
    Ok(UploadPlan::Transfer(position))
}

/// Remote size, or `None` when the query fails or the server cannot tell.
async fn query_size<S: FtpSession + ?Sized>(session: &mut S, path: &str) -> Option<u64> {
    match session.file_size(path).await {
        Ok(size) => size,
        Err(e) => {
            warn!(path, error = %e, "remote size query failed, starting from zero");
            None
        }
    }
}

/// Offsets for the resume and append families once the remote size is known.
fn offsets(mode: ExistsMode, remote: Option<u64>, local_length: u64) -> StartPosition {
    let forced = mode.skips_existence_query();
    let Some(remote) = remote else {
        return StartPosition {
            append: forced,
            ..StartPosition::FROM_START
        };
    };

    let (local_offset, remote_offset) = if mode.is_append() {
        // The whole source goes after the existing remote bytes.
        (0, remote)
    } else {
        let resume_at = remote.min(local_length);
        (resume_at, resume_at)
    };

    StartPosition {
        local_offset,
        remote_offset,
        remote_length: Some(remote),
        append: forced || remote_offset > 0,
    }
}

/// Where a download starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPlan {
    Skip(SkipReason),
    /// Start at `offset`; 0 truncates the local file.
    Transfer { offset: u64 },
}

/// Resolves a download into `local_path` against the local filesystem.
pub async fn resolve_download(
    local_path: &Path,
    mode: LocalExistsMode,
    remote_length: Option<u64>,
) -> Result<DownloadPlan, TransferError> {
    let local_length = match tokio::fs::metadata(local_path).await {
        Ok(metadata) => metadata.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(DownloadPlan::Transfer { offset: 0 });
        }
        Err(e) => return Err(e.into()),
    };

    match mode {
        LocalExistsMode::Skip => Ok(DownloadPlan::Skip(SkipReason::Exists)),
        LocalExistsMode::Overwrite => Ok(DownloadPlan::Transfer { offset: 0 }),
        LocalExistsMode::Resume => match remote_length {
            Some(remote) if remote == local_length => {
                Ok(DownloadPlan::Skip(SkipReason::AlreadyComplete))
            }
            Some(remote) if local_length > remote => {
                warn!(
                    path = %local_path.display(),
                    local_length,
                    remote,
                    "local file larger than remote, downloading again"
                );
                Ok(DownloadPlan::Transfer { offset: 0 })
            }
            _ => Ok(DownloadPlan::Transfer {
                offset: local_length,
            }),
        },
    }
}
