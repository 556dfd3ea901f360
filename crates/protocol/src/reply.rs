use serde::{Deserialize, Serialize};

/// A reply read from the control channel.
///
/// Only the three-digit code and the human-readable text are kept; the
/// grammar of multi-line replies belongs to the control-channel client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtpReply {
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl FtpReply {
    /// Creates a reply from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Preliminary (1xx), completion (2xx) and intermediate (3xx) replies
    /// count as success; transient (4xx) and permanent (5xx) ones do not.
    pub fn success(&self) -> bool {
        matches!(self.code.as_bytes().first(), Some(b'1' | b'2' | b'3'))
    }

    /// Returns `true` for a 4xx reply.
    pub fn is_transient_failure(&self) -> bool {
        self.code.starts_with('4')
    }

    /// Returns `true` for a 5xx reply.
    pub fn is_permanent_failure(&self) -> bool {
        self.code.starts_with('5')
    }
}

impl std::fmt::Display for FtpReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.message)
        }
    }
}
