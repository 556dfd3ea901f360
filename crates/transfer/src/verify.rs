//! Post-transfer checksum verification and the escalation that follows a
//! mismatch.

use std::path::Path;

use ftpflow_protocol::{ChecksumAlgorithm, VerifyPolicy};
use tracing::{debug, warn};

use crate::TransferError;
use crate::checksum::{checksum_reader, file_checksum};
use crate::session::FtpSession;
use crate::source::LocalSource;

/// The local side of a verified transfer.
pub(crate) enum LocalContent<'a> {
    File(&'a Path),
    Source {
        source: &'a mut dyn LocalSource,
        length: u64,
    },
}

/// Compares the local content with `remote_path` on the server.
///
/// Returns `true` when they match, and also when the server shares no
/// checksum algorithm with us, in which case nothing can be compared.
pub(crate) async fn verify_transfer<S: FtpSession + ?Sized>(
    session: &mut S,
    local: LocalContent<'_>,
    remote_path: &str,
    policy: VerifyPolicy,
) -> Result<bool, TransferError> {
    if policy.only_verify {
        let local_length = match &local {
            LocalContent::File(path) => tokio::fs::metadata(path).await?.len(),
            LocalContent::Source { length, .. } => *length,
        };
        let remote_length = session.file_size(remote_path).await?;
        if remote_length != Some(local_length) {
            warn!(
                path = remote_path,
                local_length,
                remote_length = ?remote_length,
                "size mismatch"
            );
            return Ok(false);
        }
    }

    let Some(algorithm) = ChecksumAlgorithm::negotiate(&session.checksum_algorithms()) else {
        warn!(path = remote_path, "server supports no usable checksum, skipping verification");
        return Ok(true);
    };

    let local_digest = match local {
        LocalContent::File(path) => file_checksum(algorithm, path).await?,
        LocalContent::Source { source, .. } => {
            if !source.can_seek() {
                warn!(path = remote_path, "source cannot be re-read, skipping verification");
                return Ok(true);
            }
            source.seek_to(0).await?;
            checksum_reader(algorithm, source).await?
        }
    };
    let remote_digest = session.remote_checksum(remote_path, algorithm).await?;

    let verified = local_digest.eq_ignore_ascii_case(remote_digest.trim());
    debug!(
        path = remote_path,
        algorithm = algorithm.name(),
        verified,
        "checksum compared"
    );
    Ok(verified)
}

/// What to do after verifying attempt number `attempt` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VerifyAction {
    Accept,
    Retry,
    /// Give up on the file; optionally delete it and raise an error.
    Reject { delete: bool, throw: bool },
}

pub(crate) fn next_action(
    policy: VerifyPolicy,
    verified: bool,
    attempt: u32,
    max_attempts: u32,
) -> VerifyAction {
    if verified {
        return VerifyAction::Accept;
    }
    if policy.retry && attempt < max_attempts {
        return VerifyAction::Retry;
    }
    VerifyAction::Reject {
        delete: policy.delete,
        throw: policy.throw,
    }
}
