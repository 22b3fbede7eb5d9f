//! HTTP transport shared by partitions and the credential.

pub mod client;
pub mod response;

pub use client::{HttpClient, HttpClientBuilder};
pub use response::RawResponse;
