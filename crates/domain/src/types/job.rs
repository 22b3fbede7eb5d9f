//! Backend-tracked asynchronous jobs.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`Job`].
///
/// `Queued` and `Running` are transient; the other three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Error,
    Aborted,
}

impl JobStatus {
    /// Whether no further transition can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Aborted)
    }

    /// Whether the job ended without succeeding.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Aborted)
    }

    /// Lowercase wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
            Self::Aborted => "aborted",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Success | Self::Error | Self::Aborted => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot of a backend job as seen by the poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Resource the job acts on, when the backend reports one.
    pub href: String,
    pub status: JobStatus,
    /// Backend-provided failure detail for `Error`/`Aborted` jobs.
    pub message: Option<String>,
    /// Auxiliary values harvested by an endpoint's extractor hook.
    #[serde(default)]
    pub extracted: BTreeMap<String, String>,
}

impl Job {
    /// A freshly accepted job with only its id known.
    pub fn queued(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            href: String::new(),
            status: JobStatus::Queued,
            message: None,
            extracted: BTreeMap::new(),
        }
    }

    /// Whether the job reached `Success`, `Error` or `Aborted`.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold a newer observation into this job.
    ///
    /// Empty fields in `next` keep the current value, and the status only
    /// moves forward: a terminal job ignores later status reports and a
    /// running job never goes back to queued.
    pub fn absorb(&mut self, next: Job) {
        if !next.id.is_empty() {
            self.id = next.id;
        }
        if !next.name.is_empty() {
            self.name = next.name;
        }
        if !next.description.is_empty() {
            self.description = next.description;
        }
        if !next.href.is_empty() {
            self.href = next.href;
        }
        if next.message.is_some() {
            self.message = next.message;
        }
        if !self.status.is_terminal() && next.status.rank() >= self.status.rank() {
            self.status = next.status;
        }
        self.extracted.extend(next.extracted);
    }
}
