//! Error types used throughout the client core

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::types::{Job, JobStatus};

/// Categories of [`ApiError`] for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid endpoint definitions or client configuration - fatal
    Configuration,
    /// Caller-supplied parameter or body rejected before sending
    Parameter,
    /// Network failure or cancellation
    Transport,
    /// Structured non-success response from a backend
    Backend,
    /// Job ended in error, was aborted, or never finished
    Job,
    /// Login failure
    Authentication,
    /// Session cache read/write failure
    Cache,
}

/// Rejections raised while binding parameters and bodies to a request.
///
/// All of these are returned before any network I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("{endpoint}: required parameter '{parameter}' is missing")]
    Missing { endpoint: String, parameter: String },

    #[error("{endpoint}: parameter '{parameter}' is not declared")]
    Undeclared { endpoint: String, parameter: String },

    #[error("{endpoint}: invalid value for parameter '{parameter}': {reason}")]
    Invalid { endpoint: String, parameter: String, reason: String },

    #[error("{endpoint}: cannot transform parameter '{parameter}': {reason}")]
    Transform { endpoint: String, parameter: String, reason: String },

    #[error("{endpoint}: request body must be {expected}, got {actual}")]
    BodyMismatch { endpoint: String, expected: String, actual: String },

    #[error("{endpoint}: cannot encode request body: {reason}")]
    BodyEncoding { endpoint: String, reason: String },
}

/// A non-success HTTP response parsed by the partition that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub endpoint: String,
    /// Method and URL path of the failed call, e.g. `POST /api/org`.
    pub operation: String,
    pub status: u16,
    /// Backend error code, when the payload carries one.
    pub code: Option<String>,
    pub message: String,
    pub duration: Duration,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) returned HTTP {}", self.endpoint, self.operation, self.status)?;
        if let Some(code) = &self.code {
            write!(f, " [{code}]")?;
        }
        write!(f, ": {} after {:?}", self.message, self.duration)
    }
}

impl std::error::Error for BackendError {}

/// A job that reached `Error` or `Aborted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub endpoint: String,
    pub status: JobStatus,
    pub message: String,
    pub duration: Duration,
    pub job: Job,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: job {} ended with status {} after {:?}: {}",
            self.endpoint, self.job.id, self.status, self.duration, self.message
        )
    }
}

impl std::error::Error for JobFailure {}

/// Session cache failures. A missing cache file is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("session cache I/O failed for {path}: {message}")]
    Io { path: String, message: String },

    #[error("session cache frame is truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("session cache cannot be decrypted: {0}")]
    Decrypt(String),

    #[error("session cache payload is not a valid session document: {0}")]
    Decode(String),

    #[error("session cache cannot be encoded: {0}")]
    Encode(String),
}

/// Main error type for client operations
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("Transport error on {endpoint}: {message}")]
    Transport { endpoint: String, message: String, is_timeout: bool },

    #[error("Operation cancelled: {endpoint}")]
    Cancelled { endpoint: String },

    #[error(transparent)]
    Backend(Box<BackendError>),

    #[error(transparent)]
    Job(Box<JobFailure>),

    #[error("{endpoint}: job {} not completed after {attempts} polls (last status {})", .job.id, .job.status)]
    JobNotCompleted { endpoint: String, attempts: u32, job: Box<Job> },

    #[error("{endpoint}: cannot parse job payload: {message}")]
    JobParse { endpoint: String, message: String },

    #[error("{endpoint}: cannot decode response body: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ApiError {
    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::EndpointNotFound(_) => ErrorCategory::Configuration,
            Self::Parameter(_) => ErrorCategory::Parameter,
            Self::Transport { .. } | Self::Cancelled { .. } => ErrorCategory::Transport,
            Self::Backend(_) | Self::Decode { .. } => ErrorCategory::Backend,
            Self::Job(_) | Self::JobNotCompleted { .. } | Self::JobParse { .. } => {
                ErrorCategory::Job
            }
            Self::Auth(_) => ErrorCategory::Authentication,
            Self::Cache(_) => ErrorCategory::Cache,
        }
    }

    /// Whether a caller could reasonably try the same call again.
    ///
    /// The core itself never retries; this only classifies.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::JobNotCompleted { .. } => true,
            Self::Backend(err) => err.status == 429 || err.status >= 500,
            _ => false,
        }
    }

    /// The job observed before the error, for job-related failures.
    pub fn job(&self) -> Option<&Job> {
        match self {
            Self::Job(failure) => Some(&failure.job),
            Self::JobNotCompleted { job, .. } => Some(job.as_ref()),
            _ => None,
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        Self::Backend(Box::new(err))
    }
}

impl From<JobFailure> for ApiError {
    fn from(err: JobFailure) -> Self {
        Self::Job(Box::new(err))
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ApiError>;
