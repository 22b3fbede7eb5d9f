//! Request executor.
//!
//! [`Client`] looks up an endpoint, binds the caller's options, makes sure
//! the partition has a session, sends the call and, for job endpoints,
//! follows the job to its terminal status before returning.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use twinline_domain::constants::{JOB_ID_PARAM, SESSIONS_PATH};
use twinline_domain::{ApiError, ClientConfig, Job, PartitionId, Result, SessionCacheConfig};

use crate::auth::{CredentialProvider, SessionCredential};
use crate::endpoint::{Endpoint, Registry};
use crate::http::{HttpClient, RawResponse};
use crate::job::poller::JobSource;
use crate::job::JobPoller;
use crate::partition::PartitionClient;
use crate::request::{with_path_param, PreparedRequest, RequestOption};
use crate::session::{cache, CachedSessions};

/// Outcome of [`Client::execute`].
#[derive(Debug, Clone)]
pub struct ApiResponse {
    raw: RawResponse,
    job: Option<Job>,
}

impl ApiResponse {
    /// The response to the initial call.
    pub fn raw(&self) -> &RawResponse {
        &self.raw
    }

    /// The resolved job, for endpoints with a job policy.
    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    /// Consume the response, keeping only the resolved job.
    pub fn into_job(self) -> Option<Job> {
        self.job
    }
}

/// Executes registered endpoints against their partitions.
#[derive(Debug)]
pub struct Client {
    registry: Arc<Registry>,
    http: HttpClient,
    partitions: BTreeMap<PartitionId, PartitionClient>,
    session_cache: Option<SessionCacheConfig>,
}

impl Client {
    /// Build a client for both partitions sharing one session credential.
    ///
    /// The credential logs in against the VMware partition's `/sessions`
    /// resource.
    ///
    /// # Errors
    /// Returns `ApiError::Configuration` if `config` is invalid.
    pub fn new(config: &ClientConfig, registry: Arc<Registry>) -> Result<Self> {
        config.validate()?;

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        let login_url = format!("{}{SESSIONS_PATH}", config.vmware.base_url.trim_end_matches('/'));
        let accept = format!(
            "application/json;version={}",
            config.vmware.api_version_or_default(PartitionId::Vmware)
        );
        let credential: Arc<dyn CredentialProvider> = Arc::new(
            SessionCredential::new(http.clone(), login_url, config.credentials.clone())
                .with_token_header(config.token_header.clone())
                .with_accept(accept),
        );

        let partitions = PartitionId::ALL
            .into_iter()
            .map(|id| PartitionClient::new(id, config.partition(id), credential.clone()))
            .collect::<Result<Vec<_>>>()?;

        let mut client = Self::from_parts(registry, http, partitions);
        client.session_cache = config.session_cache.clone();
        Ok(client)
    }

    /// Assemble a client from prebuilt partition clients.
    pub fn from_parts(
        registry: Arc<Registry>,
        http: HttpClient,
        partitions: impl IntoIterator<Item = PartitionClient>,
    ) -> Self {
        let partitions = partitions.into_iter().map(|partition| (partition.id(), partition)).collect();
        Self { registry, http, partitions, session_cache: None }
    }

    /// Endpoints this client can execute.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// # Errors
    /// Returns `ApiError::Configuration` when the partition is not configured.
    pub fn partition(&self, id: PartitionId) -> Result<&PartitionClient> {
        self.partitions
            .get(&id)
            .ok_or_else(|| ApiError::Configuration(format!("partition '{id}' is not configured")))
    }

    /// Execute the endpoint registered as `name`.
    ///
    /// For endpoints with a job policy the call only returns once the job
    /// reached a terminal status; failed jobs surface as `ApiError::Job`.
    #[instrument(skip(self, options, cancel))]
    pub async fn execute(
        &self,
        name: &str,
        options: Vec<RequestOption>,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse> {
        let endpoint = self.registry.get(name)?;
        let raw = self.dispatch(&endpoint, options, cancel).await?;

        let Some(policy) = endpoint.job_policy() else {
            return Ok(ApiResponse { raw, job: None });
        };

        let partition = self.partition(endpoint.partition())?;
        let poller = JobPoller::new(
            endpoint.name(),
            partition.format(),
            policy,
            partition.poll_error_policy(),
        );
        let source = PartitionJobs { client: self, partition };
        let job = poller.resolve(&raw, &source, cancel).await?;

        Ok(ApiResponse { raw, job: Some(job) })
    }

    /// Execute a job endpoint and return only the resolved job.
    pub async fn execute_job(
        &self,
        name: &str,
        options: Vec<RequestOption>,
        cancel: &CancellationToken,
    ) -> Result<Job> {
        self.execute(name, options, cancel).await?.into_job().ok_or_else(|| {
            ApiError::Configuration(format!("endpoint '{name}' has no job policy"))
        })
    }

    /// Execute an endpoint and decode its JSON response body.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        name: &str,
        options: Vec<RequestOption>,
        cancel: &CancellationToken,
    ) -> Result<T> {
        let response = self.execute(name, options, cancel).await?;
        response.raw().json().map_err(|err| ApiError::Decode {
            endpoint: name.to_string(),
            message: err.to_string(),
        })
    }

    /// Send one call for `endpoint` without job handling.
    ///
    /// Options are bound before the session is checked, so parameter errors
    /// never trigger a login or any other request.
    pub async fn dispatch(
        &self,
        endpoint: &Endpoint,
        options: Vec<RequestOption>,
        cancel: &CancellationToken,
    ) -> Result<RawResponse> {
        let partition = self.partition(endpoint.partition())?;
        let prepared = PreparedRequest::prepare(endpoint, options)?;
        partition.ensure_session(cancel).await?;

        let url = partition.url_for(&prepared.render_path(endpoint), prepared.query())?;
        let mut request = self
            .http
            .request(endpoint.method().clone(), url.clone())
            .headers(partition.default_headers().clone());
        for (name, value) in partition.credential().headers() {
            request = request.header(name, value);
        }
        if let Some(body) = prepared.body() {
            request = request.json(body);
        }

        let started = Instant::now();
        let response = self.http.send(request, cancel, endpoint.name()).await?;
        if response.status().is_success() {
            return Ok(response);
        }

        if response.status() == StatusCode::UNAUTHORIZED {
            partition.credential().invalidate();
        }
        let err = partition.backend_error(
            endpoint.name(),
            endpoint.method(),
            &url,
            &response,
            started.elapsed(),
        );
        warn!(
            endpoint = endpoint.name(),
            partition = %partition.id(),
            status = err.status,
            code = err.code.as_deref().unwrap_or_default(),
            message = %err.message,
            "backend returned an error"
        );
        Err(err.into())
    }

    /// Persist every initialized partition session to `path`.
    pub async fn store_sessions_to_cache(&self, passphrase: &str, path: &Path) -> Result<()> {
        let mut cached = CachedSessions::default();
        for partition in self.partitions.values() {
            if let Some(headers) = partition.credential().snapshot() {
                cached.sessions.insert(partition.id().to_string(), headers);
            }
        }
        cache::write(path, passphrase, &cached).await?;
        Ok(())
    }

    /// Restore partition sessions saved by
    /// [`store_sessions_to_cache`](Self::store_sessions_to_cache).
    ///
    /// A missing file is not an error; entries for unknown partitions are
    /// skipped.
    pub async fn restore_sessions_from_cache(&self, passphrase: &str, path: &Path) -> Result<()> {
        let Some(cached) = cache::read(path, passphrase).await? else {
            return Ok(());
        };

        for (id, headers) in cached.sessions {
            match id.parse::<PartitionId>().ok().and_then(|id| self.partitions.get(&id)) {
                Some(partition) => partition.credential().restore(headers),
                None => debug!(partition = %id, "skipping cached session for unknown partition"),
            }
        }
        Ok(())
    }

    /// [`store_sessions_to_cache`](Self::store_sessions_to_cache) with the
    /// configured cache; a no-op without one.
    pub async fn store_sessions(&self) -> Result<()> {
        match &self.session_cache {
            Some(cache) => self.store_sessions_to_cache(&cache.passphrase, &cache.path).await,
            None => Ok(()),
        }
    }

    /// [`restore_sessions_from_cache`](Self::restore_sessions_from_cache)
    /// with the configured cache; a no-op without one.
    pub async fn restore_sessions(&self) -> Result<()> {
        match &self.session_cache {
            Some(cache) => self.restore_sessions_from_cache(&cache.passphrase, &cache.path).await,
            None => Ok(()),
        }
    }
}

/// Fetches jobs through a partition's registered job endpoint.
struct PartitionJobs<'a> {
    client: &'a Client,
    partition: &'a PartitionClient,
}

#[async_trait]
impl<'a> JobSource for PartitionJobs<'a> {
    async fn fetch(&self, job_id: &str, cancel: &CancellationToken) -> Result<RawResponse> {
        let endpoint = self.client.registry.get(self.partition.format().job_endpoint())?;
        self.client.dispatch(&endpoint, vec![with_path_param(JOB_ID_PARAM, job_id)], cancel).await
    }
}
