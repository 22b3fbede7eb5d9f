//! # Twinline Infrastructure
//!
//! The I/O side of the client core.
//!
//! This crate contains:
//! - Endpoint descriptors and the registry
//! - The request option pipeline
//! - The HTTP transport and the request executor
//! - Partition wire formats and the job poller
//! - The session credential and the encrypted session cache
//! - Configuration loading and logging setup
//!
//! ## Architecture
//! - Depends on `twinline-domain` for types and errors
//! - Depends on `twinline-common` for encryption
//! - Contains all "impure" code (network, filesystem, environment)

pub mod auth;
pub mod bootstrap;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod errors;
pub mod http;
pub mod job;
pub mod observability;
pub mod partition;
pub mod request;
pub mod session;

// Re-export commonly used items
pub use auth::{CredentialProvider, SessionCredential};
pub use bootstrap::{default_registry, register_core_endpoints};
pub use client::{ApiResponse, Client};
pub use endpoint::{Endpoint, EndpointBuilder, JobPolicy, ParamSpec, Registry};
pub use http::{HttpClient, RawResponse};
pub use job::{JobAware, JobPoller, JobSource};
pub use partition::{BackendFormat, PartitionClient};
pub use request::{with_body, with_path_param, with_query_param, RequestOption};
