//! # Twinline Domain
//!
//! Types shared by every layer of the client core.
//!
//! This crate contains:
//! - Job and partition types
//! - Error types and the `Result` alias
//! - Client configuration structures
//! - Wire-level constants
//!
//! ## Architecture
//! - No dependencies on other Twinline crates
//! - Only external dependencies allowed
//! - Pure data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
