//! Value types shared by every layer of the ftpflow transfer engine.
//!
//! Nothing in this crate performs I/O. It defines the vocabulary the
//! single-file engine and the batch orchestrator agree on: conflict modes,
//! verification and batch policies, transfer statuses, and the shape of a
//! control-channel reply.

pub mod constants;
pub mod reply;
pub mod types;

pub use reply::FtpReply;
pub use types::{
    BatchErrorPolicy, ChecksumAlgorithm, ExistsMode, LocalExistsMode, PolicyError,
    TransferStatus, VerifyPolicy,
};
