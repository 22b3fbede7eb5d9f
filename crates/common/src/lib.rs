//! Common utilities shared across Twinline crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: shared error types
//! - `runtime`: AES-CTR encryption for persisted sessions

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod crypto;

#[cfg(feature = "runtime")]
pub use crypto::EncryptionService;
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult};
