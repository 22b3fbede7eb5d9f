//! Session cache round trips through the client.
//!
//! **Coverage:**
//! - Store then restore into a fresh client without a new login
//! - Wrong passphrase and truncated files
//! - Missing files and unknown partitions

#![allow(dead_code)]

#[path = "support.rs"]
mod support;

use std::collections::{BTreeMap, HashMap};

use reqwest::Method;
use support::{json_body, mount_login, TOKEN, VMWARE_PREFIX};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use twinline_domain::{ApiError, CacheError, PartitionId, SessionCacheConfig};
use twinline_infra::session::{cache, CachedSessions};
use twinline_infra::{Client, Endpoint};
use wiremock::matchers::{bearer_token, method, path};
use wiremock::{Mock, MockServer};

const PASSPHRASE: &str = "correct horse battery staple";

fn list_orgs() -> Endpoint {
    Endpoint::builder("ListOrgs", Method::GET, PartitionId::Vmware, "/orgs")
        .documentation("https://docs.example.com/orgs#list")
        .build()
}

async fn mount_orgs(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("{VMWARE_PREFIX}/orgs")))
        .and(bearer_token(token))
        .respond_with(json_body(r#"{"values":[]}"#))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn stored_sessions_skip_login_in_a_new_client() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_orgs(&server, TOKEN, 2).await;
    let dir = TempDir::new()?;
    let file = dir.path().join("sessions.bin");
    let cancel = CancellationToken::new();

    let first = support::client(&server, vec![list_orgs()]);
    first.execute("ListOrgs", vec![], &cancel).await?;
    first.store_sessions_to_cache(PASSPHRASE, &file).await?;

    let second = support::client(&server, vec![list_orgs()]);
    second.restore_sessions_from_cache(PASSPHRASE, &file).await?;
    for id in PartitionId::ALL {
        assert!(second.partition(id)?.credential().is_initialized());
    }
    second.execute("ListOrgs", vec![], &cancel).await?;
    Ok(())
}

#[tokio::test]
async fn configured_cache_is_used_by_store_and_restore() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_orgs(&server, TOKEN, 1).await;
    let dir = TempDir::new().unwrap();

    let mut config = support::config(&server);
    config.session_cache = Some(SessionCacheConfig {
        path: dir.path().join("nested").join("sessions.bin"),
        passphrase: PASSPHRASE.into(),
    });

    let first = Client::new(&config, support::registry(vec![list_orgs()])).unwrap();
    first.partition(PartitionId::Vmware).unwrap().ensure_session(&CancellationToken::new()).await.unwrap();
    first.store_sessions().await.expect("store");

    let second = Client::new(&config, support::registry(vec![list_orgs()])).unwrap();
    second.restore_sessions().await.expect("restore");
    second.execute("ListOrgs", vec![], &CancellationToken::new()).await.expect("call");
}

#[tokio::test]
async fn uninitialized_sessions_are_not_stored() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("sessions.bin");

    let client = support::client(&server, vec![]);
    client.store_sessions_to_cache(PASSPHRASE, &file).await.expect("store");

    let cached = cache::read(&file, PASSPHRASE).await.unwrap().expect("file written");
    assert!(cached.is_empty());
}

#[tokio::test]
async fn wrong_passphrase_is_rejected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("sessions.bin");
    let sessions = CachedSessions {
        sessions: BTreeMap::from([(
            "vmware".to_string(),
            HashMap::from([("authorization".to_string(), "Bearer cached".to_string())]),
        )]),
    };
    cache::write(&file, PASSPHRASE, &sessions).await.unwrap();

    let client = support::client(&server, vec![]);
    let err = client.restore_sessions_from_cache("not the passphrase", &file).await.unwrap_err();

    assert!(matches!(err, ApiError::Cache(CacheError::Decode(_) | CacheError::Decrypt(_))));
    assert!(!client.partition(PartitionId::Vmware).unwrap().credential().is_initialized());
}

#[tokio::test]
async fn truncated_file_is_rejected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("sessions.bin");
    tokio::fs::write(&file, [0u8, 0, 1]).await.unwrap();

    let client = support::client(&server, vec![]);
    let err = client.restore_sessions_from_cache(PASSPHRASE, &file).await.unwrap_err();

    assert!(matches!(
        err,
        ApiError::Cache(CacheError::Truncated { expected: 4, actual: 3 })
    ));
}

#[tokio::test]
async fn missing_file_is_a_no_op() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let client = support::client(&server, vec![]);
    client
        .restore_sessions_from_cache(PASSPHRASE, &dir.path().join("absent.bin"))
        .await
        .expect("missing cache is fine");

    assert!(!client.partition(PartitionId::Cerberus).unwrap().credential().is_initialized());
}

#[tokio::test]
async fn unknown_partitions_are_ignored() {
    let server = MockServer::start().await;
    mount_orgs(&server, "cached", 1).await;
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("sessions.bin");
    let bearer = |token: &str| {
        HashMap::from([("Authorization".to_string(), format!("Bearer {token}"))])
    };
    let sessions = CachedSessions {
        sessions: BTreeMap::from([
            ("vmware".to_string(), bearer("cached")),
            ("mainframe".to_string(), bearer("other")),
        ]),
    };
    cache::write(&file, PASSPHRASE, &sessions).await.unwrap();

    let client = support::client(&server, vec![list_orgs()]);
    client.restore_sessions_from_cache(PASSPHRASE, &file).await.expect("restore");

    client
        .execute("ListOrgs", vec![], &CancellationToken::new())
        .await
        .expect("restored token is used without login");
}
