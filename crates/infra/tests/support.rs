//! Shared fixtures for client integration tests.
//!
//! Both partitions are served by one `MockServer`: VMware under
//! `/cloudapi`, Cerberus under `/cerberus`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use twinline_domain::constants::DEFAULT_TOKEN_HEADER;
use twinline_domain::{ClientConfig, CredentialsConfig, PartitionConfig};
use twinline_infra::{register_core_endpoints, Client, Endpoint, Registry};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const TOKEN: &str = "tok-1";
pub const VMWARE_PREFIX: &str = "/cloudapi";
pub const CERBERUS_PREFIX: &str = "/cerberus";

#[derive(Debug, Serialize)]
pub struct FooSpec {
    pub name: String,
}

pub fn config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        credentials: CredentialsConfig {
            username: "alice".into(),
            organization: "acme".into(),
            password: "s3cret".into(),
        },
        vmware: PartitionConfig::new(format!("{}{VMWARE_PREFIX}", server.uri())),
        cerberus: PartitionConfig::new(format!("{}{CERBERUS_PREFIX}", server.uri())),
        http_timeout_secs: 5,
        token_header: DEFAULT_TOKEN_HEADER.into(),
        session_cache: None,
    }
}

/// Core endpoints plus `extra`.
pub fn registry(extra: Vec<Endpoint>) -> Arc<Registry> {
    let registry = Registry::new();
    register_core_endpoints(&registry).expect("core endpoints register");
    registry.register_all(extra).expect("test endpoints register");
    Arc::new(registry)
}

pub fn client(server: &MockServer, extra: Vec<Endpoint>) -> Arc<Client> {
    Arc::new(Client::new(&config(server), registry(extra)).expect("client builds"))
}

/// Login mock answering with [`TOKEN`].
pub async fn mount_login(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(format!("{VMWARE_PREFIX}/sessions")))
        .respond_with(ResponseTemplate::new(200).insert_header(DEFAULT_TOKEN_HEADER, TOKEN))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub fn json_body(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "application/json")
}

/// Replays responses in order, repeating the last one once exhausted.
pub struct Sequence {
    responses: Vec<ResponseTemplate>,
    calls: AtomicUsize,
}

impl Sequence {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        assert!(!responses.is_empty(), "sequence needs at least one response");
        Self { responses, calls: AtomicUsize::new(0) }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses[n.min(self.responses.len() - 1)].clone()
    }
}

/// Requests the server saw on `path`.
pub async fn hits(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == request_path)
        .count()
}
