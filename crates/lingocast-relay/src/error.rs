//! Error types for the relay.
//!
//! None of these are fatal to the process: each connection's failures
//! stay on that connection's task. A missing handshake target and a
//! broadcaster displacing another are deliberately not errors; the
//! first is a logged silent drop, the second the defined replace
//! semantic.

use thiserror::Error;

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Broadcaster registration with a bad or expired token. Surfaced
    /// to the client as an explicit rejection frame.
    #[error("unauthorized broadcaster registration for language '{language}'")]
    Unauthorized {
        /// Language the registration targeted
        language: String,
    },

    /// Registration for a language outside the configured set.
    #[error("unknown language '{0}'")]
    UnknownLanguage(String),

    /// Undecodable frame. The frame is discarded; the connection stays
    /// open, since one bad frame should not end an otherwise-healthy
    /// session.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Internal relay error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Create an unauthorized-registration error.
    pub fn unauthorized(language: impl Into<String>) -> Self {
        Self::Unauthorized {
            language: language.into(),
        }
    }

    /// Create a malformed-message error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedMessage(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
