use ftpflow_data_channel::DataChannelError;
use ftpflow_protocol::FtpReply;

/// Errors produced by a single-file transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("server replied {0}")]
    Reply(FtpReply),

    #[error("data connection: {0}")]
    DataChannel(#[from] DataChannelError),

    /// Local file or source stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("checksum verification failed for {path}")]
    Verification { path: String },

    #[error("resume failed: {recovery} (after: {original})")]
    Resume {
        original: Box<TransferError>,
        recovery: Box<TransferError>,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl TransferError {
    /// Wraps an I/O error raised by a data connection, as opposed to the
    /// local side of the transfer.
    pub fn from_data(error: std::io::Error) -> Self {
        Self::DataChannel(DataChannelError::Io(error))
    }

    /// Cancellation, whether it came from the token or the data channel.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::DataChannel(DataChannelError::Cancelled)
        )
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::DataChannel(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Data-connection faults a fresh connection can recover from. Local
    /// I/O errors never qualify.
    pub fn is_connection_reset(&self) -> bool {
        match self {
            Self::DataChannel(e) => e.is_connection_reset(),
            _ => false,
        }
    }
}
