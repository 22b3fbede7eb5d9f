//! Error conversions at the infrastructure boundary.

pub mod conversions;

pub use conversions::{cache_crypto_error, cache_io_error, transport_error};
