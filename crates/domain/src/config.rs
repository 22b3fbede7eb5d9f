//! Client configuration structures

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CERBERUS_API_VERSION, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_TOKEN_HEADER,
    DEFAULT_VMWARE_API_VERSION,
};
use crate::errors::{ApiError, Result};
use crate::types::{PartitionId, PollErrorPolicy};

/// Top-level configuration for a dual-partition client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub credentials: CredentialsConfig,
    pub vmware: PartitionConfig,
    pub cerberus: PartitionConfig,
    /// Per-request transport timeout.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Response header carrying the token after login.
    #[serde(default = "default_token_header")]
    pub token_header: String,
    #[serde(default)]
    pub session_cache: Option<SessionCacheConfig>,
}

impl ClientConfig {
    /// Configuration for one partition.
    pub fn partition(&self, id: PartitionId) -> &PartitionConfig {
        match id {
            PartitionId::Vmware => &self.vmware,
            PartitionId::Cerberus => &self.cerberus,
        }
    }

    /// Check the fields serde cannot enforce.
    ///
    /// # Errors
    /// Returns `ApiError::Configuration` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.credentials.username.trim().is_empty() {
            return Err(ApiError::Configuration("credentials.username is empty".into()));
        }
        if self.credentials.organization.trim().is_empty() {
            return Err(ApiError::Configuration("credentials.organization is empty".into()));
        }
        if self.http_timeout_secs == 0 {
            return Err(ApiError::Configuration("http_timeout_secs must be positive".into()));
        }
        if self.token_header.trim().is_empty() {
            return Err(ApiError::Configuration("token_header is empty".into()));
        }
        for id in PartitionId::ALL {
            if self.partition(id).base_url.trim().is_empty() {
                return Err(ApiError::Configuration(format!("{id}.base_url is empty")));
            }
        }
        Ok(())
    }
}

/// Login credentials shared by both partitions.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub username: String,
    pub organization: String,
    pub password: String,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("organization", &self.organization)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Connection settings for one backend partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub poll_error_policy: PollErrorPolicy,
}

impl PartitionConfig {
    /// Partition at `base_url` with the default API version and abort-on-error polling.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), api_version: None, poll_error_policy: PollErrorPolicy::Abort }
    }

    /// API version to advertise, falling back to the partition default.
    pub fn api_version_or_default(&self, id: PartitionId) -> &str {
        match (&self.api_version, id) {
            (Some(version), _) => version,
            (None, PartitionId::Vmware) => DEFAULT_VMWARE_API_VERSION,
            (None, PartitionId::Cerberus) => DEFAULT_CERBERUS_API_VERSION,
        }
    }
}

/// Where and how to persist partition sessions between runs.
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionCacheConfig {
    pub path: PathBuf,
    pub passphrase: String,
}

impl fmt::Debug for SessionCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCacheConfig")
            .field("path", &self.path)
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_token_header() -> String {
    DEFAULT_TOKEN_HEADER.to_string()
}
