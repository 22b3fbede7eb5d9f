//! Asynchronous job tracking.
//!
//! Each partition reports jobs in its own wire format; [`JobAware`] is the
//! capability a partition exposes so the [`poller`] can follow a job
//! without knowing which backend it talks to.

pub mod poller;

use twinline_domain::Job;

pub use poller::{JobPoller, JobSource};

use crate::http::RawResponse;

/// Job parsing capability of a backend partition.
pub trait JobAware: Send + Sync {
    /// Registered name of the endpoint returning a single job by id.
    ///
    /// The endpoint must take the job id as its `jobId` path parameter.
    fn job_endpoint(&self) -> &'static str;

    /// Read a job from an initial or poll response.
    ///
    /// Fields the response does not carry are left empty; unknown status
    /// strings are an error.
    fn parse_job(&self, response: &RawResponse) -> Result<Job, String>;
}
