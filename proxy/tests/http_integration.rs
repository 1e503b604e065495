// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! HTTP integration tests for the ECR proxy.
//!
//! These tests use `axum-test` to drive the full router. The registry token
//! provider is replaced by a scripted in-memory implementation, and the peer
//! address is injected with `MockConnectInfo`.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::VecDeque;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderValue, StatusCode};
use axum_test::TestServer;
use ecr_proxy::access::AccessRules;
use ecr_proxy::application::{AppState, create_router};
use ecr_proxy::cache::CredentialCache;
use ecr_proxy::constants::{AUTH_REALM, HEALTH_BODY};
use ecr_proxy::errors::ProviderError;
use ecr_proxy::models::{IssuedToken, RegistryTarget};
use ecr_proxy::provider::CredentialProvider;
use ecr_proxy::upstream::Upstream;
use ecr_proxy::users::UserStore;

const TWELVE_HOURS: Duration = Duration::from_secs(12 * 60 * 60);

struct ScriptedProvider {
    calls: AtomicUsize,
    results: Mutex<VecDeque<Result<IssuedToken, ProviderError>>>,
}

impl ScriptedProvider {
    fn new(results: Vec<Result<IssuedToken, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            results: Mutex::new(results.into()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for ScriptedProvider {
    async fn fetch(&self) -> Result<IssuedToken, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Request("unavailable".into())))
    }
}

fn token(secret: &str) -> Result<IssuedToken, ProviderError> {
    Ok(IssuedToken {
        secret: secret.to_string(),
        expires_at: SystemTime::now() + TWELVE_HOURS,
        endpoint: Some("https://123456789012.dkr.ecr.us-east-1.amazonaws.com".to_string()),
    })
}

struct Harness {
    server: TestServer,
    cache: Arc<CredentialCache>,
    provider: Arc<ScriptedProvider>,
}

/// Builds a test server whose caller appears at `peer`.
async fn harness(
    whitelist: &str,
    peer: SocketAddr,
    results: Vec<Result<IssuedToken, ProviderError>>,
    users: Option<Arc<UserStore>>,
) -> Harness {
    let provider = ScriptedProvider::new(results);
    let target = RegistryTarget::from_account("123456789012", "us-east-1");
    let cache = Arc::new(CredentialCache::new(provider.clone(), target.host.clone()));

    let state = AppState {
        target,
        cache: cache.clone(),
        rules: AccessRules::parse(whitelist),
        users,
        upstream: Upstream::new().unwrap(),
    };
    let app = create_router(state).layer(MockConnectInfo(peer));

    Harness {
        server: TestServer::new(app).unwrap(),
        cache,
        provider,
    }
}

fn peer(addr: &str) -> SocketAddr {
    addr.parse().unwrap()
}

// =============================================================================
// Health and readiness
// =============================================================================

#[tokio::test]
async fn test_root_and_healthz_return_200() {
    let h = harness("", peer("127.0.0.1:40000"), vec![], None).await;

    for path in ["/", "/healthz"] {
        let response = h.server.get(path).await;
        response.assert_status_ok();
        assert_eq!(response.text(), HEALTH_BODY);
    }
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn test_readyz_without_token_returns_500() {
    let h = harness("", peer("127.0.0.1:40000"), vec![token("first")], None).await;

    let response = h.server.get("/readyz").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], 500);
    assert_eq!(body["message"], "ECR token has not been obtained");
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn test_readyz_follows_cache_expiry() {
    let h = harness("", peer("127.0.0.1:40000"), vec![token("first")], None).await;
    h.cache.refresh().await.unwrap();

    let response = h.server.get("/readyz").await;
    response.assert_status_ok();
    response.assert_json(&serde_json::json!({"status": "ok"}));

    h.cache
        .force_expiry(SystemTime::now() - Duration::from_secs(1))
        .await;

    let response = h.server.get("/readyz").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert!(body["message"].as_str().unwrap().contains("expired"));

    // readiness never refreshes on its own
    assert_eq!(h.provider.calls(), 1);
}

// =============================================================================
// Access gate
// =============================================================================

#[tokio::test]
async fn test_denied_ip_gets_403_without_touching_cache() {
    let h = harness("127.0.0.1,10.0.0.0/8", peer("8.8.8.8:53"), vec![token("first")], None).await;

    let response = h.server.get("/v2/").await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], 403);
    assert_eq!(body["message"], "Forbidden");
    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn test_denied_ipv6_outside_prefix() {
    let h = harness("2001:db8::/32", peer("[2001:db9::1]:443"), vec![], None).await;

    h.server
        .get("/v2/team/app/tags/list")
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_all_methods_are_gated() {
    let h = harness("10.0.0.0/8", peer("192.168.1.1:5555"), vec![], None).await;

    h.server.put("/v2/team/app/manifests/latest").await.assert_status(StatusCode::FORBIDDEN);
    h.server.post("/v2/team/app/blobs/uploads/").await.assert_status(StatusCode::FORBIDDEN);
    h.server.delete("/v2/team/app/manifests/sha256:abc").await.assert_status(StatusCode::FORBIDDEN);
    h.server.get("/v2").await.assert_status(StatusCode::FORBIDDEN);
}

// =============================================================================
// Credential failures
// =============================================================================

#[tokio::test]
async fn test_allowed_ip_with_failing_provider_gets_502() {
    let h = harness(
        "127.0.0.1,10.0.0.0/8",
        peer("10.1.2.3:8080"),
        vec![Err(ProviderError::Request("AccessDenied".into()))],
        None,
    )
    .await;

    let response = h.server.get("/v2/").await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Failed to refresh ECR token");
    assert_eq!(h.provider.calls(), 1);
}

#[tokio::test]
async fn test_expired_token_is_not_reused_when_refresh_fails() {
    let h = harness(
        "",
        peer("10.1.2.3:8080"),
        vec![token("first"), Err(ProviderError::Request("throttled".into()))],
        None,
    )
    .await;
    h.cache.refresh().await.unwrap();
    h.cache
        .force_expiry(SystemTime::now() - Duration::from_secs(1))
        .await;

    h.server
        .get("/v2/team/app/tags/list")
        .await
        .assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(h.provider.calls(), 2);
    assert!(!h.cache.is_healthy().await);
}

// =============================================================================
// Local client authentication
// =============================================================================

#[tokio::test]
async fn test_users_file_requires_basic_auth() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"[{"username":"user1","password":"pass1"}]"#)
        .unwrap();
    let users = Arc::new(UserStore::load(file.path()).await.unwrap());

    let h = harness("", peer("10.1.2.3:8080"), vec![], Some(users)).await;

    let response = h.server.get("/v2/").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.header("www-authenticate"), AUTH_REALM);

    let response = h
        .server
        .get("/v2/")
        .add_header(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjE6d3Jvbmc="))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn test_valid_client_reaches_credential_cache() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"[{"username":"user1","password":"pass1"}]"#)
        .unwrap();
    let users = Arc::new(UserStore::load(file.path()).await.unwrap());

    let h = harness(
        "",
        peer("10.1.2.3:8080"),
        vec![Err(ProviderError::Request("unavailable".into()))],
        Some(users),
    )
    .await;

    // base64("user1:pass1")
    let response = h
        .server
        .get("/v2/")
        .add_header(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjE6cGFzczE="))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(h.provider.calls(), 1);
}
