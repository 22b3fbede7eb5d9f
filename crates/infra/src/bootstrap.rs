//! Endpoint catalog shipped with the client core.
//!
//! Applications build a [`Registry`], call [`register_core_endpoints`] and
//! then register their own business endpoints before creating a
//! [`Client`](crate::Client).

use std::sync::Arc;

use reqwest::Method;
use twinline_domain::constants::JOB_ID_PARAM;
use twinline_domain::{PartitionId, Result};

use crate::endpoint::{Endpoint, ParamSpec, Registry};
use crate::partition::{cerberus, vmware};

const VMWARE_TASK_DOCS: &str =
    "https://developer.broadcom.com/xapis/vmware-cloud-director-api/latest/doc/operations/GET-Task.html";
const CERBERUS_JOB_DOCS: &str = "https://docs.cerberus.example.com/api/v2/jobs#get-job";

/// Reusable parameter validators.
pub mod validators {
    /// Rejects blank values.
    pub fn non_empty(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            Err("value is blank".to_string())
        } else {
            Ok(())
        }
    }

    /// Accepts a bare UUID in any standard textual form.
    pub fn uuid(value: &str) -> Result<(), String> {
        uuid::Uuid::parse_str(value).map(|_| ()).map_err(|err| format!("not a UUID: {err}"))
    }

    /// A bare UUID or a `urn:...:<uuid>` identifier.
    pub fn uuid_or_urn(value: &str) -> Result<(), String> {
        if let Some(rest) = value.strip_prefix("urn:") {
            let id = rest.rsplit(':').next().unwrap_or_default();
            return uuid(id).map_err(|err| format!("URN '{value}' does not end in a UUID ({err})"));
        }
        uuid(value)
    }
}

/// Reusable parameter transforms.
pub mod transforms {
    /// `urn:vcloud:task:<uuid>` → `<uuid>`; other values pass through.
    pub fn urn_to_uuid(value: &str) -> Result<String, String> {
        if !value.starts_with("urn:") {
            return Ok(value.to_string());
        }
        match value.rsplit(':').next() {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(format!("URN '{value}' has no identifier segment")),
        }
    }
}

/// The job-status endpoints the poller relies on.
pub fn core_endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::builder(vmware::TASK_ENDPOINT, Method::GET, PartitionId::Vmware, "/tasks/{jobId}")
            .documentation(VMWARE_TASK_DOCS)
            .description("Get the status of a VMware task")
            .path_param(
                ParamSpec::required(JOB_ID_PARAM)
                    .description("Task id, bare or as a task URN")
                    .validator(validators::non_empty)
                    .transform(transforms::urn_to_uuid),
            )
            .build(),
        Endpoint::builder(cerberus::JOB_ENDPOINT, Method::GET, PartitionId::Cerberus, "/jobs/{jobId}")
            .documentation(CERBERUS_JOB_DOCS)
            .description("Get the status of a Cerberus job")
            .path_param(
                ParamSpec::required(JOB_ID_PARAM)
                    .description("Job id")
                    .validator(validators::non_empty),
            )
            .build(),
    ]
}

/// Register [`core_endpoints`] in `registry`.
///
/// # Errors
/// Fails if any of them is already registered.
pub fn register_core_endpoints(registry: &Registry) -> Result<()> {
    registry.register_all(core_endpoints())
}

/// A fresh registry holding the core endpoints.
pub fn default_registry() -> Result<Arc<Registry>> {
    let registry = Registry::new();
    register_core_endpoints(&registry)?;
    Ok(Arc::new(registry))
}
