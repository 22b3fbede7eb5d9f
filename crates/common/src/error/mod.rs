//! Common error types shared across Twinline crates.
//!
//! [`CommonError`] covers the failure patterns that are not tied to a single
//! backend: cryptographic failures, malformed encoded payloads and internal
//! invariant violations. Crate-specific errors compose with it through
//! `#[from]` rather than duplicating these variants.

use thiserror::Error;

/// Result alias for operations returning [`CommonError`].
pub type CommonResult<T> = std::result::Result<T, CommonError>;

/// Errors shared by the foundation and runtime tiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommonError {
    /// Encryption or decryption could not be performed.
    #[error("Crypto error: {message}")]
    Crypto { message: String },

    /// An encoded payload (base64, length-prefixed frame) was malformed.
    #[error("Encoding error ({format}): {message}")]
    Encoding { format: String, message: String },

    /// Internal errors that shouldn't normally occur.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CommonError {
    /// Build a [`CommonError::Crypto`].
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto { message: message.into() }
    }

    /// Build a [`CommonError::Encoding`] for the named format.
    pub fn encoding(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encoding { format: format.into(), message: message.into() }
    }

    /// Build a [`CommonError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}
