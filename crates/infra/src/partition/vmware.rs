//! VMware Cloud Director wire format.
//!
//! Creation calls answer `202 Accepted` with a `Location` header pointing at
//! the task resource, sometimes alongside an inline task body or the created
//! entity. Task status is read with `GET /tasks/{jobId}`.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, LOCATION};
use serde_json::Value;
use twinline_domain::{ApiError, Job, JobStatus, PartitionId, Result};

use super::{json_str, BackendFormat, ErrorDetail};
use crate::http::RawResponse;
use crate::job::JobAware;

/// Registered name of the task lookup endpoint.
pub const TASK_ENDPOINT: &str = "GetVmwareTask";

/// Task and error wire format of the VMware partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct VmwareFormat;

/// Map a VMware task status onto [`JobStatus`].
pub fn parse_status(status: &str) -> std::result::Result<JobStatus, String> {
    match status {
        "queued" | "preRunning" => Ok(JobStatus::Queued),
        "running" => Ok(JobStatus::Running),
        "success" => Ok(JobStatus::Success),
        "error" => Ok(JobStatus::Error),
        "aborted" | "canceled" => Ok(JobStatus::Aborted),
        other => Err(format!("unknown task status '{other}'")),
    }
}

/// Last non-empty path segment of a `Location` value.
fn id_from_location(location: &str) -> Option<&str> {
    let path = location.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/').rsplit('/').next().filter(|segment| !segment.is_empty())
}

/// Whether `body` describes a task rather than the entity the task acts on.
fn is_task(body: &Value) -> bool {
    let media_type = body.get("type").and_then(Value::as_str).unwrap_or_default();
    let id = body.get("id").and_then(Value::as_str).unwrap_or_default();
    media_type.to_ascii_lowercase().contains("task") || id.starts_with("urn:vcloud:task:")
}

fn task_from_body(body: &Value) -> std::result::Result<Option<Job>, String> {
    let Some(status) = body.get("status") else {
        return Ok(None);
    };
    let status = status.as_str().ok_or("task status is not a string")?;

    let mut job = Job::queued(json_str(body, &["id"]));
    job.status = parse_status(status)?;
    job.name = json_str(body, &["operationName", "name"]);
    job.description = json_str(body, &["operation", "description"]);
    job.href = body
        .get("owner")
        .map(|owner| json_str(owner, &["href"]))
        .filter(|href| !href.is_empty())
        .unwrap_or_else(|| json_str(body, &["href"]));
    let error = body.get("error").map(|error| json_str(error, &["message"])).unwrap_or_default();
    let message = if error.is_empty() { json_str(body, &["details"]) } else { error };
    job.message = Some(message).filter(|message| !message.is_empty());
    Ok(Some(job))
}

impl JobAware for VmwareFormat {
    fn job_endpoint(&self) -> &'static str {
        TASK_ENDPOINT
    }

    fn parse_job(&self, response: &RawResponse) -> std::result::Result<Job, String> {
        let location_id = response.header(LOCATION.as_str()).and_then(id_from_location);
        // Next to a Location header the body may be the created entity.
        let task = match response.json_value() {
            Some(body) if location_id.is_none() || is_task(&body) => task_from_body(&body)?,
            _ => None,
        };

        match (task, location_id) {
            (Some(mut job), location) => {
                if job.id.is_empty() {
                    job.id = location.unwrap_or_default().to_string();
                }
                Ok(job)
            }
            (None, Some(id)) => Ok(Job::queued(id)),
            (None, None) => {
                Err("response carries neither a Location header nor a task body".to_string())
            }
        }
    }
}

impl BackendFormat for VmwareFormat {
    fn id(&self) -> PartitionId {
        PartitionId::Vmware
    }

    fn default_headers(&self, api_version: &str) -> Result<HeaderMap> {
        let accept = HeaderValue::from_str(&format!("application/json;version={api_version}"))
            .map_err(|err| ApiError::Configuration(format!("invalid vmware api version: {err}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, accept);
        Ok(headers)
    }

    fn parse_error(&self, response: &RawResponse) -> ErrorDetail {
        let body = response.json_value().unwrap_or(Value::Null);
        let code = json_str(&body, &["minorErrorCode", "majorErrorCode"]);
        ErrorDetail::new(code, json_str(&body, &["message"]), response)
    }
}
