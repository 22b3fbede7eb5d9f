//! Cerberus wire format.
//!
//! Operations answer with an inline array of job entries in the body; the
//! first entry is the job being tracked. Each entry lists its actions, and
//! the first failed action carries the failure detail.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use serde_json::Value;
use twinline_domain::{ApiError, Job, JobStatus, PartitionId, Result};

use super::{json_str, BackendFormat, ErrorDetail};
use crate::http::RawResponse;
use crate::job::JobAware;

/// Registered name of the job lookup endpoint.
pub const JOB_ENDPOINT: &str = "GetCerberusJob";

const API_VERSION_HEADER: &str = "x-api-version";

/// Job and error wire format of the Cerberus partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct CerberusFormat;

/// Map a Cerberus job status onto [`JobStatus`].
pub fn parse_status(status: &str) -> std::result::Result<JobStatus, String> {
    match status {
        "CREATED" | "PENDING" => Ok(JobStatus::Queued),
        "IN_PROGRESS" => Ok(JobStatus::Running),
        "DONE" => Ok(JobStatus::Success),
        "FAILED" => Ok(JobStatus::Error),
        "CANCELLED" | "ABORTED" => Ok(JobStatus::Aborted),
        other => Err(format!("unknown job status '{other}'")),
    }
}

/// The tracked entry: first element of a bare array, of a `jobs` array, or
/// the body itself when it is a single job object.
fn tracked_entry(body: &Value) -> Option<&Value> {
    match body {
        Value::Array(entries) => entries.first(),
        Value::Object(map) => match map.get("jobs") {
            Some(Value::Array(entries)) => entries.first(),
            _ if map.contains_key("status") => Some(body),
            _ => None,
        },
        _ => None,
    }
}

fn failed_action_detail(entry: &Value) -> Option<String> {
    entry
        .get("actions")?
        .as_array()?
        .iter()
        .find(|action| {
            action
                .get("status")
                .and_then(Value::as_str)
                .and_then(|status| parse_status(status).ok())
                .is_some_and(JobStatus::is_failure)
        })
        .map(|action| {
            let name = json_str(action, &["name"]);
            let details = json_str(action, &["details"]);
            match (name.is_empty(), details.is_empty()) {
                (false, false) => format!("{name}: {details}"),
                (true, _) => details,
                (false, true) => name,
            }
        })
        .filter(|detail| !detail.is_empty())
}

impl JobAware for CerberusFormat {
    fn job_endpoint(&self) -> &'static str {
        JOB_ENDPOINT
    }

    fn parse_job(&self, response: &RawResponse) -> std::result::Result<Job, String> {
        let body = response.json_value().ok_or("response body is not JSON")?;
        let entry = tracked_entry(&body).ok_or("response body carries no job entry")?;

        let status = entry
            .get("status")
            .and_then(Value::as_str)
            .ok_or("job entry has no status")?;

        let mut job = Job::queued(json_str(entry, &["jobId", "id"]));
        job.status = parse_status(status)?;
        job.name = json_str(entry, &["name"]);
        job.description = json_str(entry, &["description"]);
        job.href = json_str(entry, &["href"]);
        job.message = failed_action_detail(entry).or_else(|| {
            Some(json_str(entry, &["message"])).filter(|message| !message.is_empty())
        });
        Ok(job)
    }
}

impl BackendFormat for CerberusFormat {
    fn id(&self) -> PartitionId {
        PartitionId::Cerberus
    }

    fn default_headers(&self, api_version: &str) -> Result<HeaderMap> {
        let version = HeaderValue::from_str(api_version)
            .map_err(|err| ApiError::Configuration(format!("invalid cerberus api version: {err}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(HeaderName::from_static(API_VERSION_HEADER), version);
        Ok(headers)
    }

    fn parse_error(&self, response: &RawResponse) -> ErrorDetail {
        let body = response.json_value().unwrap_or(Value::Null);
        let mut message = json_str(&body, &["message"]);
        let reason = json_str(&body, &["reason"]);
        if !reason.is_empty() && reason != message {
            message = if message.is_empty() { reason } else { format!("{message} ({reason})") };
        }
        ErrorDetail::new(json_str(&body, &["code"]), message, response)
    }
}
