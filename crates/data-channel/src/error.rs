//! Error types for the data channel.

use std::io::ErrorKind;

/// Errors produced by a data connection.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("operation not supported by this stream: {0}")]
    Unsupported(&'static str),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DataChannelError {
    /// Faults after which a fresh data connection can pick up where the
    /// broken one stopped.
    pub fn is_connection_reset(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::NotConnected
                    | ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Io(e) => e.kind() == ErrorKind::TimedOut,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_class() {
        for kind in [
            ErrorKind::ConnectionReset,
            ErrorKind::ConnectionAborted,
            ErrorKind::BrokenPipe,
            ErrorKind::UnexpectedEof,
        ] {
            let err = DataChannelError::Io(std::io::Error::from(kind));
            assert!(err.is_connection_reset(), "{kind:?} should be resumable");
        }
        let denied = DataChannelError::Io(std::io::Error::from(ErrorKind::PermissionDenied));
        assert!(!denied.is_connection_reset());
        assert!(!DataChannelError::Timeout.is_connection_reset());
    }

    #[test]
    fn timeout_class() {
        assert!(DataChannelError::Timeout.is_timeout());
        let io = DataChannelError::Io(std::io::Error::from(ErrorKind::TimedOut));
        assert!(io.is_timeout());
        assert!(!DataChannelError::Cancelled.is_timeout());
    }
}
