use std::path::PathBuf;

use ftpflow_protocol::TransferStatus;
use serde::Serialize;

/// One accepted entry of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    pub local_path: PathBuf,
    pub remote_path: String,
    /// Position in the batch input.
    pub index: usize,
}

/// Outcome of one batch entry, reported in input order.
///
/// An entry the batch never reached has every flag cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub is_success: bool,
    pub is_skipped: bool,
    pub is_failed: bool,
    /// Rejected by a rule. Filtered entries also count as skipped.
    pub is_filtered: bool,
    /// Transferred, then deleted when the batch aborted.
    pub is_purged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Size of the local file after a successful transfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl TransferResult {
    pub(crate) fn pending(local_path: PathBuf, remote_path: String) -> Self {
        Self {
            local_path,
            remote_path,
            ..Self::default()
        }
    }

    pub(crate) fn filtered(local_path: PathBuf, remote_path: String) -> Self {
        Self {
            is_skipped: true,
            is_filtered: true,
            ..Self::pending(local_path, remote_path)
        }
    }

    pub(crate) fn record(&mut self, status: TransferStatus) {
        self.is_success = status.is_success();
        self.is_skipped = status.is_skipped();
        self.is_failed = status.is_failed();
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.is_success = false;
        self.is_skipped = false;
        self.is_failed = true;
        self.error = Some(error);
    }

    pub(crate) fn purge(&mut self) {
        self.is_success = false;
        self.is_purged = true;
    }

    /// The batch stopped before this entry.
    pub fn not_attempted(&self) -> bool {
        !self.is_success && !self.is_skipped && !self.is_failed && !self.is_purged
    }
}

/// Totals over a batch's results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub succeeded: usize,
    /// Skipped by the conflict mode. Filtered entries are counted apart.
    pub skipped: usize,
    pub failed: usize,
    pub filtered: usize,
    pub purged: usize,
    pub not_attempted: usize,
    /// Bytes of the successfully transferred files.
    pub bytes: u64,
}

impl BatchSummary {
    pub fn from_results(results: &[TransferResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            if result.is_filtered {
                summary.filtered += 1;
            } else if result.is_success {
                summary.succeeded += 1;
                summary.bytes += result.size.unwrap_or(0);
            } else if result.is_skipped {
                summary.skipped += 1;
            } else if result.is_failed {
                summary.failed += 1;
            } else if result.is_purged {
                summary.purged += 1;
            } else {
                summary.not_attempted += 1;
            }
        }
        summary
    }
}
