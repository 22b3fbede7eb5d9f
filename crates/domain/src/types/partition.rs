//! Backend partitions and their per-partition policies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ApiError;

/// The backend systems a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionId {
    /// vCloud Director API: `Location`-header jobs, separate task resource.
    Vmware,
    /// Cerberus API: inline job status array in the response body.
    Cerberus,
}

impl PartitionId {
    /// Every partition, in a stable order.
    pub const ALL: [PartitionId; 2] = [PartitionId::Vmware, PartitionId::Cerberus];

    /// Lowercase identifier used in config and cache files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vmware => "vmware",
            Self::Cerberus => "cerberus",
        }
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionId {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vmware" => Ok(Self::Vmware),
            "cerberus" => Ok(Self::Cerberus),
            other => Err(ApiError::Configuration(format!("unknown partition '{other}'"))),
        }
    }
}

/// What the job poller does when a poll request fails at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollErrorPolicy {
    /// Stop polling and return the transport error.
    #[default]
    Abort,
    /// Count the attempt and keep polling until the job timeout.
    Continue,
}
