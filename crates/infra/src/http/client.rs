use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use reqwest::{Client as ReqwestClient, Method, RequestBuilder};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use twinline_domain::{ApiError, Result};

use super::response::RawResponse;
use crate::errors::transport_error;

const USER_AGENT: &str = concat!("twinline/", env!("CARGO_PKG_VERSION"));

/// HTTP client with timeout and cancellation support.
///
/// Each call is a single attempt: transport failures are returned as
/// [`ApiError::Transport`] and never retried here.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: ReqwestClient,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Send the request and buffer the response body.
    ///
    /// `endpoint` names the logical operation in errors and logs. Cancelling
    /// `cancel` aborts the in-flight request with [`ApiError::Cancelled`].
    pub async fn send(
        &self,
        builder: RequestBuilder,
        cancel: &CancellationToken,
        endpoint: &str,
    ) -> Result<RawResponse> {
        let request = builder.build().map_err(|err| transport_error(endpoint, &err))?;

        let method = request.method().clone();
        let url = request.url().clone();
        debug!(endpoint, %method, %url, "sending HTTP request");

        let started = Instant::now();
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(ApiError::Cancelled { endpoint: endpoint.to_string() });
            }
            result = self.client.execute(request) => {
                result.map_err(|err| transport_error(endpoint, &err))?
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(ApiError::Cancelled { endpoint: endpoint.to_string() });
            }
            result = response.bytes() => {
                result.map_err(|err| transport_error(endpoint, &err))?
            }
        };

        let elapsed = started.elapsed();
        debug!(
            endpoint,
            %method,
            %url,
            %status,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "received HTTP response"
        );

        Ok(RawResponse::new(status, headers, body.to_vec(), elapsed))
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    default_headers: Option<HeaderMap>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            default_headers: None,
        }
    }
}

impl HttpClientBuilder {
    /// Per-request timeout covering connect, send and body download.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Headers sent with every request.
    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// # Errors
    /// Returns `ApiError::Configuration` if reqwest rejects the settings.
    pub fn build(self) -> Result<HttpClient> {
        let mut builder = ReqwestClient::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .no_proxy();

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|err| ApiError::Configuration(format!("failed to build HTTP client: {err}")))?;

        Ok(HttpClient { client })
    }
}
