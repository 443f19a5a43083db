//! Session decoding errors.

use derive_more::{Display, Error};

/// A session document that could not be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum SessionError {
    /// The document does not have the session shape.
    #[display("Session document could not be decoded: {}", message)]
    Encoding {
        /// Decoder message.
        message: String,
    },
    /// The document decoded but breaks a session invariant.
    #[display("Malformed session: {}", reason)]
    Malformed {
        /// Which invariant failed.
        reason: String,
    },
}

impl SessionError {
    /// Creates a malformed-session error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding {
            message: err.to_string(),
        }
    }
}
