//! Symmetric encryption used to protect persisted session state.

pub mod encryption;

pub use encryption::{EncryptionService, IV_LEN};
