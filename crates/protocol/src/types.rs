use serde::{Deserialize, Serialize};

/// What to do when the remote target of an upload already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistsMode {
    /// Do not check; always write from offset 0.
    NoCheck,
    /// Leave an existing remote file untouched.
    Skip,
    /// Delete the existing remote file, then write it anew.
    #[default]
    Overwrite,
    /// Continue after the bytes the server already has.
    Resume,
    /// Append the whole local file after the existing remote bytes.
    AddToEnd,
    /// Resume without an existence query; only the remote size is asked.
    ResumeNoCheck,
    /// Append without an existence query; only the remote size is asked.
    AddToEndNoCheck,
}

impl ExistsMode {
    /// `Resume` and `ResumeNoCheck`.
    pub fn is_resume(self) -> bool {
        matches!(self, Self::Resume | Self::ResumeNoCheck)
    }

    /// `AddToEnd` and `AddToEndNoCheck`.
    pub fn is_append(self) -> bool {
        matches!(self, Self::AddToEnd | Self::AddToEndNoCheck)
    }

    /// Modes that query the remote size without asking whether the file exists.
    pub fn skips_existence_query(self) -> bool {
        matches!(self, Self::ResumeNoCheck | Self::AddToEndNoCheck)
    }
}

/// What to do when the local target of a download already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalExistsMode {
    /// Truncate and download again.
    #[default]
    Overwrite,
    /// Leave the local file untouched.
    Skip,
    /// Continue after the bytes already on disk.
    Resume,
}

/// Checksum verification performed after a file has been transferred.
///
/// All flags off means no verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerifyPolicy {
    /// Transfer the file again (overwriting) while attempts remain.
    pub retry: bool,
    /// Delete the transferred file once no attempts remain.
    pub delete: bool,
    /// Fail with a verification error once no attempts remain.
    pub throw: bool,
    /// Compare sizes and checksums and report; no retry, delete or throw.
    pub only_verify: bool,
}

impl VerifyPolicy {
    /// No verification.
    pub const NONE: Self = Self {
        retry: false,
        delete: false,
        throw: false,
        only_verify: false,
    };

    pub fn retry() -> Self {
        Self {
            retry: true,
            ..Self::NONE
        }
    }

    pub fn only_verify() -> Self {
        Self {
            only_verify: true,
            ..Self::NONE
        }
    }

    /// Returns `true` when no flag is set.
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// `OnlyVerify` with none of the escalation flags.
    pub fn is_report_only(&self) -> bool {
        self.only_verify && !self.retry && !self.delete && !self.throw
    }
}

/// Rejected flag combination.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("the Stop and Throw batch error policies cannot be combined")]
    StopWithThrow,
}

/// How a batch reacts when one of its files fails.
///
/// All flags off means: record the failure and keep going.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchErrorPolicy {
    /// Stop the batch quietly at the first failure.
    pub stop: bool,
    /// Stop the batch and fail with a batch error.
    pub throw: bool,
    /// On abort, delete the files the batch already transferred.
    pub delete_processed: bool,
}

impl BatchErrorPolicy {
    pub fn stop() -> Self {
        Self {
            stop: true,
            ..Self::default()
        }
    }

    pub fn throw() -> Self {
        Self {
            throw: true,
            ..Self::default()
        }
    }

    pub fn with_delete_processed(mut self) -> Self {
        self.delete_processed = true;
        self
    }

    /// Checks that the combination can be honored.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.stop && self.throw {
            return Err(PolicyError::StopWithThrow);
        }
        Ok(())
    }

    /// A returned `Failed` status aborts the batch only under these levels.
    pub fn aborts_on_failure(&self) -> bool {
        self.stop || self.throw
    }
}

/// Terminal state of a single-file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Success,
    Skipped,
    Failed,
}

impl TransferStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn is_skipped(self) -> bool {
        self == Self::Skipped
    }

    pub fn is_failed(self) -> bool {
        self == Self::Failed
    }
}

/// Hash algorithms the engine can compute locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Sha256,
    Md5,
    Crc32,
}

impl ChecksumAlgorithm {
    /// Order in which a shared algorithm is picked.
    pub const PREFERENCE: [Self; 3] = [Self::Sha256, Self::Md5, Self::Crc32];

    /// Picks the first algorithm in [`PREFERENCE`](Self::PREFERENCE) order
    /// that the server also supports.
    pub fn negotiate(server: &[Self]) -> Option<Self> {
        Self::PREFERENCE
            .into_iter()
            .find(|algorithm| server.contains(algorithm))
    }

    /// Name as servers advertise it.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Md5 => "MD5",
            Self::Crc32 => "CRC",
        }
    }
}
