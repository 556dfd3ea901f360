//! Multi-file transfer batches.
//!
//! [`BatchTransfer`] sequences single-file transfers from
//! [`ftpflow_transfer`], filters the input through [`Rule`]s and applies a
//! partial-failure policy across the whole batch.

mod batch;
mod error;
mod rules;
mod types;

pub use batch::{BatchTransfer, DownloadBatchOptions, UploadBatchOptions};
pub use error::BatchError;
pub use rules::{ExtensionRule, GlobRule, ListMode, NameRule, Rule, RuleCandidate, passes};
pub use types::{BatchSummary, TransferResult, TransferTarget};
