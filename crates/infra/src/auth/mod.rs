//! Credential lifecycle shared by partition clients.

pub mod credential;

pub use credential::{CredentialProvider, SessionCredential};
