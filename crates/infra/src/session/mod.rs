//! Session persistence between runs.

pub mod cache;

pub use cache::CachedSessions;
