//! Error types for the pullhook domain.
//!
//! [`TriggerError`] covers conditions that stop the daemon from starting.
//! [`SignatureError`] covers the per-request authentication failures; those
//! are always terminated by a log line and a response, never propagated
//! further.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Startup errors
// ---------------------------------------------------------------------------

/// Errors that prevent the daemon from starting.
///
/// Produced at load time; the listener never starts with an invalid config.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    /// The configuration value is invalid.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },
}

impl TriggerError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-request authentication errors
// ---------------------------------------------------------------------------

/// Reasons a request's `x-hub-signature` is not accepted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The header is absent, has the wrong length, or lacks the `sha1=` prefix.
    ///
    /// No digest is computed for a malformed header.
    #[error("invalid x-hub-signature")]
    MalformedHeader,

    /// The computed digest does not match the claimed one.
    #[error("Invalid signature")]
    Mismatch,

    /// The HMAC could not be keyed with the configured secret.
    ///
    /// Unreachable with HMAC-SHA1, which accepts keys of any length; the
    /// variant exists because the MAC constructor's signature is fallible.
    #[error("HMAC key rejected: {reason}")]
    InvalidKey {
        /// Description reported by the MAC implementation.
        reason: String,
    },
}
