//! Session-token credential with lazy, single-flight refresh.
//!
//! The first login uses Basic auth (`username@organization:password`);
//! later refreshes present the current token as a Bearer credential. The
//! new token is read from a configurable response header.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::Method;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use twinline_domain::constants::DEFAULT_TOKEN_HEADER;
use twinline_domain::{ApiError, CredentialsConfig, Result};

use crate::http::HttpClient;

const LOGIN_ENDPOINT: &str = "Login";
const BEARER_PREFIX: &str = "Bearer ";

/// Produces auth headers for partition clients.
///
/// One instance may be shared by several partitions; implementations must
/// collapse concurrent refreshes into a single login.
#[async_trait]
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// Current auth headers; empty until initialized.
    fn headers(&self) -> HashMap<String, String>;

    fn is_initialized(&self) -> bool;

    /// Log in (or renew) and capture a new token.
    ///
    /// On failure the credential is left uninitialized.
    async fn refresh(&self, cancel: &CancellationToken) -> Result<()>;

    /// Headers worth persisting, or `None` before the first login.
    fn snapshot(&self) -> Option<HashMap<String, String>> {
        self.is_initialized().then(|| self.headers())
    }

    /// Adopt headers captured by an earlier [`snapshot`](Self::snapshot).
    fn restore(&self, headers: HashMap<String, String>);

    /// Forget the current token, e.g. after the backend rejected it.
    fn invalidate(&self);
}

/// Credential backed by the `/sessions` login resource.
pub struct SessionCredential {
    http: HttpClient,
    login_url: String,
    credentials: CredentialsConfig,
    token_header: String,
    accept: Option<String>,
    token: RwLock<Option<String>>,
    refresh_lock: Mutex<()>,
    generation: AtomicU64,
}

impl SessionCredential {
    /// Credential logging in at `login_url` with `credentials`.
    pub fn new(http: HttpClient, login_url: impl Into<String>, credentials: CredentialsConfig) -> Self {
        Self {
            http,
            login_url: login_url.into(),
            credentials,
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            accept: None,
            token: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Response header the token is read from.
    #[must_use]
    pub fn with_token_header(mut self, name: impl Into<String>) -> Self {
        self.token_header = name.into();
        self
    }

    /// `Accept` header sent with the login call.
    #[must_use]
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// URL of the `/sessions` login resource.
    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    async fn login(&self, cancel: &CancellationToken, current: Option<&str>) -> Result<String> {
        let mut request = self.http.request(Method::POST, &self.login_url);
        if let Some(accept) = &self.accept {
            request = request.header(ACCEPT, accept);
        }
        request = match current {
            Some(token) => request.bearer_auth(token),
            None => request.basic_auth(
                format!("{}@{}", self.credentials.username, self.credentials.organization),
                Some(&self.credentials.password),
            ),
        };

        let response = self.http.send(request, cancel, LOGIN_ENDPOINT).await?;
        if !response.status().is_success() {
            return Err(ApiError::Auth(format!(
                "login to {} returned HTTP {}",
                self.login_url,
                response.status().as_u16()
            )));
        }

        match response.header(&self.token_header) {
            Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(ApiError::Auth(format!(
                "login response from {} has no '{}' header",
                self.login_url, self.token_header
            ))),
        }
    }
}

#[async_trait]
impl CredentialProvider for SessionCredential {
    fn headers(&self) -> HashMap<String, String> {
        self.token
            .read()
            .as_ref()
            .map(|token| {
                HashMap::from([(AUTHORIZATION.as_str().to_string(), format!("{BEARER_PREFIX}{token}"))])
            })
            .unwrap_or_default()
    }

    fn is_initialized(&self) -> bool {
        self.token.read().is_some()
    }

    async fn refresh(&self, cancel: &CancellationToken) -> Result<()> {
        let observed = self.generation.load(Ordering::Acquire);

        let _guard = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(ApiError::Cancelled { endpoint: LOGIN_ENDPOINT.to_string() });
            }
            guard = self.refresh_lock.lock() => guard,
        };

        if self.generation.load(Ordering::Acquire) != observed && self.is_initialized() {
            debug!(login_url = %self.login_url, "credential refreshed by a concurrent caller");
            return Ok(());
        }

        let current = self.token.read().clone();
        match self.login(cancel, current.as_deref()).await {
            Ok(token) => {
                *self.token.write() = Some(token);
                self.generation.fetch_add(1, Ordering::AcqRel);
                info!(
                    login_url = %self.login_url,
                    renewed = current.is_some(),
                    "session credential refreshed"
                );
                Ok(())
            }
            Err(err) => {
                *self.token.write() = None;
                warn!(login_url = %self.login_url, error = %err, "login failed, credential reset");
                Err(err)
            }
        }
    }

    fn restore(&self, headers: HashMap<String, String>) {
        let token = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION.as_str()))
            .and_then(|(_, value)| value.strip_prefix(BEARER_PREFIX))
            .map(str::trim)
            .filter(|token| !token.is_empty() && HeaderValue::from_str(token).is_ok())
            .map(str::to_string);

        if token.is_some() {
            *self.token.write() = token;
            self.generation.fetch_add(1, Ordering::AcqRel);
            debug!(login_url = %self.login_url, "credential restored from snapshot");
        }
    }

    fn invalidate(&self) {
        if self.token.write().take().is_some() {
            debug!(login_url = %self.login_url, "credential invalidated");
        }
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("login_url", &self.login_url)
            .field("credentials", &self.credentials)
            .field("token_header", &self.token_header)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use wiremock::matchers::{basic_auth, bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn credentials() -> CredentialsConfig {
        CredentialsConfig {
            username: "alice".into(),
            organization: "acme".into(),
            password: "s3cret".into(),
        }
    }

    fn credential(server: &MockServer) -> SessionCredential {
        SessionCredential::new(
            HttpClient::new().expect("http client"),
            format!("{}/sessions", server.uri()),
            credentials(),
        )
    }

    fn token_response(token: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).insert_header(DEFAULT_TOKEN_HEADER, token)
    }

    #[tokio::test]
    async fn first_refresh_uses_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .and(basic_auth("alice@acme", "s3cret"))
            .respond_with(token_response("tok-1"))
            .expect(1)
            .mount(&server)
            .await;

        let cred = credential(&server);
        assert!(!cred.is_initialized());
        assert!(cred.headers().is_empty());

        cred.refresh(&CancellationToken::new()).await.unwrap();

        assert!(cred.is_initialized());
        assert_eq!(cred.headers().get("authorization").map(String::as_str), Some("Bearer tok-1"));
    }

    #[tokio::test]
    async fn later_refresh_presents_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(basic_auth("alice@acme", "s3cret"))
            .respond_with(token_response("tok-1"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(bearer_token("tok-1"))
            .respond_with(token_response("tok-2"))
            .expect(1)
            .mount(&server)
            .await;

        let cred = credential(&server);
        let cancel = CancellationToken::new();
        cred.refresh(&cancel).await.unwrap();
        cred.refresh(&cancel).await.unwrap();

        assert_eq!(cred.headers()["authorization"], "Bearer tok-2");
    }

    #[tokio::test]
    async fn failed_refresh_resets_to_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(basic_auth("alice@acme", "s3cret"))
            .respond_with(token_response("tok-1"))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(bearer_token("tok-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let cred = credential(&server);
        let cancel = CancellationToken::new();
        cred.refresh(&cancel).await.unwrap();

        let err = cred.refresh(&cancel).await.unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
        assert!(!cred.is_initialized());
        assert!(cred.headers().is_empty());

        cred.refresh(&cancel).await.unwrap();
        assert!(cred.is_initialized());
    }

    #[tokio::test]
    async fn missing_token_header_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let cred = credential(&server);
        let err = cred.refresh(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::Auth(message) if message.contains(DEFAULT_TOKEN_HEADER)));
        assert!(!cred.is_initialized());
    }

    #[tokio::test]
    async fn custom_token_header_is_honoured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).insert_header("X-Session-Token", "abc"))
            .mount(&server)
            .await;

        let cred = credential(&server).with_token_header("X-Session-Token");
        cred.refresh(&CancellationToken::new()).await.unwrap();
        assert_eq!(cred.headers()["authorization"], "Bearer abc");
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response("tok-1").set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;

        let cred = Arc::new(credential(&server));
        let cancel = CancellationToken::new();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cred = cred.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { cred.refresh(&cancel).await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(cred.headers()["authorization"], "Bearer tok-1");
    }

    #[tokio::test]
    async fn restore_and_invalidate() {
        let server = MockServer::start().await;
        let cred = credential(&server);

        cred.restore(HashMap::from([("X-Other".to_string(), "1".to_string())]));
        assert!(!cred.is_initialized());

        cred.restore(HashMap::from([("Authorization".to_string(), "Bearer cached".to_string())]));
        assert!(cred.is_initialized());
        assert_eq!(cred.headers()["authorization"], "Bearer cached");
        assert_eq!(cred.snapshot(), Some(cred.headers()));

        cred.invalidate();
        assert!(!cred.is_initialized());
        assert_eq!(cred.snapshot(), None);
    }

    #[test]
    fn debug_output_hides_password() {
        let cred = SessionCredential::new(
            HttpClient::new().expect("http client"),
            "https://vcd.example.com/sessions",
            credentials(),
        );
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("initialized: false"));
    }
}
