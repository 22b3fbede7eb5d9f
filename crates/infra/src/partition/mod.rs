//! Partition clients: one per backend system.
//!
//! A [`PartitionClient`] binds a base URL, the partition's default headers,
//! a (possibly shared) credential and the partition's [`BackendFormat`].

pub mod cerberus;
pub mod vmware;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use twinline_domain::{ApiError, BackendError, PartitionConfig, PartitionId, PollErrorPolicy, Result};
use url::Url;

pub use cerberus::CerberusFormat;
pub use vmware::VmwareFormat;

use crate::auth::CredentialProvider;
use crate::http::RawResponse;
use crate::job::JobAware;

/// Code and message extracted from a non-success response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub code: Option<String>,
    pub message: String,
}

impl ErrorDetail {
    /// Empty fields fall back to the raw body, then to the status reason.
    pub fn new(code: String, message: String, response: &RawResponse) -> Self {
        let code = Some(code).filter(|code| !code.is_empty());
        let message = if !message.is_empty() {
            message
        } else {
            let text = response.text();
            let text = text.trim();
            if text.is_empty() {
                response.status().canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                text.to_string()
            }
        };
        Self { code, message }
    }
}

/// Wire conventions of one backend.
pub trait BackendFormat: JobAware + fmt::Debug {
    fn id(&self) -> PartitionId;

    /// Headers sent with every call, advertising `api_version`.
    fn default_headers(&self, api_version: &str) -> Result<HeaderMap>;

    /// Read the backend's error payload from a non-success response.
    fn parse_error(&self, response: &RawResponse) -> ErrorDetail;
}

/// The wire format used by `id`.
pub fn format_for(id: PartitionId) -> Arc<dyn BackendFormat> {
    match id {
        PartitionId::Vmware => Arc::new(VmwareFormat),
        PartitionId::Cerberus => Arc::new(CerberusFormat),
    }
}

/// First of `keys` holding a string or number in `value`, else empty.
pub(crate) fn json_str(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(|field| match field {
            Value::String(text) if !text.is_empty() => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Per-backend client state used by the executor.
pub struct PartitionClient {
    id: PartitionId,
    base_url: Url,
    default_headers: HeaderMap,
    credential: Arc<dyn CredentialProvider>,
    format: Arc<dyn BackendFormat>,
    poll_error_policy: PollErrorPolicy,
}

impl PartitionClient {
    /// # Errors
    /// Returns `ApiError::Configuration` for an unparseable base URL or API
    /// version.
    pub fn new(
        id: PartitionId,
        config: &PartitionConfig,
        credential: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        Self::with_format(id, config, credential, format_for(id))
    }

    /// Like [`PartitionClient::new`] with an explicit wire format.
    pub fn with_format(
        id: PartitionId,
        config: &PartitionConfig,
        credential: Arc<dyn CredentialProvider>,
        format: Arc<dyn BackendFormat>,
    ) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|err| {
            ApiError::Configuration(format!("{id}.base_url '{}' is invalid: {err}", config.base_url))
        })?;
        let default_headers = format.default_headers(config.api_version_or_default(id))?;

        Ok(Self {
            id,
            base_url,
            default_headers,
            credential,
            format,
            poll_error_policy: config.poll_error_policy,
        })
    }

    /// Partition this client talks to.
    pub fn id(&self) -> PartitionId {
        self.id
    }

    /// Base URL every endpoint path is joined to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Headers sent with every call, e.g. the API version.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// Credential providing auth headers.
    pub fn credential(&self) -> &Arc<dyn CredentialProvider> {
        &self.credential
    }

    /// Job and error wire format.
    pub fn format(&self) -> &dyn BackendFormat {
        self.format.as_ref()
    }

    /// What polling does on transport errors.
    pub fn poll_error_policy(&self) -> PollErrorPolicy {
        self.poll_error_policy
    }

    /// Absolute URL for a rendered path, with `query` appended.
    pub fn url_for(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let joined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        let mut url = Url::parse(&joined)
            .map_err(|err| ApiError::Configuration(format!("invalid request URL '{joined}': {err}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Log in if the credential has no session yet.
    pub async fn ensure_session(&self, cancel: &CancellationToken) -> Result<()> {
        if self.credential.is_initialized() {
            return Ok(());
        }
        debug!(partition = %self.id, "credential not initialized, refreshing");
        self.credential.refresh(cancel).await
    }

    /// Structured error for a non-success response.
    pub fn backend_error(
        &self,
        endpoint: &str,
        method: &Method,
        url: &Url,
        response: &RawResponse,
        duration: Duration,
    ) -> BackendError {
        let detail = self.format.parse_error(response);
        BackendError {
            endpoint: endpoint.to_string(),
            operation: format!("{method} {}", url.path()),
            status: response.status().as_u16(),
            code: detail.code,
            message: detail.message,
            duration,
        }
    }
}

impl fmt::Debug for PartitionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionClient")
            .field("id", &self.id)
            .field("base_url", &self.base_url.as_str())
            .field("poll_error_policy", &self.poll_error_policy)
            .field("credential", &self.credential)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::ACCEPT;
    use reqwest::StatusCode;

    use super::*;
    use crate::auth::SessionCredential;
    use crate::http::HttpClient;

    fn credential() -> Arc<dyn CredentialProvider> {
        Arc::new(SessionCredential::new(
            HttpClient::new().expect("http client"),
            "https://vcd.example.com/sessions",
            twinline_domain::CredentialsConfig {
                username: "alice".into(),
                organization: "acme".into(),
                password: "pw".into(),
            },
        ))
    }

    #[test]
    fn url_for_joins_base_path_and_query() {
        let config = PartitionConfig::new("https://vcd.example.com/cloudapi/1.0.0/");
        let client = PartitionClient::new(PartitionId::Vmware, &config, credential()).unwrap();

        let url = client
            .url_for("/orgs/1", &[("filter".into(), "name==dev".into())])
            .unwrap();
        assert_eq!(url.as_str(), "https://vcd.example.com/cloudapi/1.0.0/orgs/1?filter=name%3D%3Ddev");
        assert_eq!(client.default_headers()[ACCEPT], "application/json;version=38.1");
    }

    #[test]
    fn invalid_base_url_is_a_configuration_error() {
        let config = PartitionConfig::new("not a url");
        let err = PartitionClient::new(PartitionId::Cerberus, &config, credential()).unwrap_err();
        assert!(matches!(err, ApiError::Configuration(message) if message.contains("cerberus")));
    }

    #[test]
    fn backend_error_falls_back_to_body_text() {
        let config = PartitionConfig::new("https://console.example.com/api");
        let client = PartitionClient::new(PartitionId::Cerberus, &config, credential()).unwrap();
        let url = client.url_for("/foos", &[]).unwrap();
        let response = RawResponse::new(
            StatusCode::BAD_GATEWAY,
            HeaderMap::new(),
            b"upstream down".to_vec(),
            Duration::from_millis(3),
        );

        let err = client.backend_error("ListFoos", &Method::GET, &url, &response, Duration::from_millis(3));
        assert_eq!(err.operation, "GET /api/foos");
        assert_eq!(err.status, 502);
        assert_eq!(err.code, None);
        assert_eq!(err.message, "upstream down");
    }

    #[test]
    fn json_str_accepts_numbers() {
        let value = serde_json::json!({"a": "", "b": 403, "c": "x"});
        assert_eq!(json_str(&value, &["a", "b"]), "403");
        assert_eq!(json_str(&value, &["missing"]), "");
    }
}
