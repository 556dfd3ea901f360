//! Batch error types.

use ftpflow_protocol::PolicyError;
use ftpflow_transfer::TransferError;

use crate::types::TransferResult;

/// Errors produced by a batch call.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("invalid argument: {0}")]
    Policy(#[from] PolicyError),

    #[error("invalid rule: {0}")]
    Rule(#[from] globset::Error),

    #[error("cancelled")]
    Cancelled,

    /// A file failed under the `Throw` policy.
    #[error("transfer of {path} failed: {source}")]
    Transfer {
        path: String,
        #[source]
        source: TransferError,
    },

    /// The batch stopped early under the `Throw` policy. Carries the results
    /// gathered up to the abort.
    #[error("batch aborted after {failed} failed transfer(s)")]
    Aborted {
        failed: usize,
        results: Vec<TransferResult>,
    },
}

impl BatchError {
    /// Rejected input, raised before any transfer is attempted.
    pub fn is_argument(&self) -> bool {
        matches!(self, Self::Argument(_) | Self::Policy(_) | Self::Rule(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
