//! Reusable test helpers for integration tests.
//!
//! Provides `TestApp` for sending requests through the full axum router over
//! an in-memory store, fake attestation collaborators, and seed data helpers.
//!
//! ## Test Servers
//!
//! Use [`spawn_test_server()`] when the code under test makes real HTTP calls
//! (API rule callbacks) instead of going through `tower::ServiceExt::oneshot`.
#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use rolegate_server::api::{create_router, AppState};
use rolegate_server::attestation::{
    AttestationError, AttestationEvaluator, AttestationTimeouts, IdentityResolver, Profile,
    TokenOracle,
};
use rolegate_server::config::Config;
use rolegate_server::permissions::{self, Permission};
use rolegate_server::store::{MemoryStore, Store};
use tokio::task::JoinHandle;
use tower::ServiceExt;
use uuid::Uuid;

// ============================================================================
// Fake collaborators
// ============================================================================

/// Token oracle answering from a fixed holder set, optionally slowly.
#[derive(Debug, Default)]
pub struct FakeOracle {
    holders: HashSet<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeOracle {
    pub fn holding(addresses: &[&str]) -> Self {
        Self {
            holders: addresses.iter().map(|a| a.to_lowercase()).collect(),
            ..Self::default()
        }
    }

    /// Sleep this long before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenOracle for FakeOracle {
    async fn is_holder(
        &self,
        address: &str,
        _contract_address: &str,
        _chain_id: i64,
    ) -> Result<bool, AttestationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.holders.contains(&address.to_lowercase()))
    }
}

/// Oracle that always fails at the transport level.
#[derive(Debug, Default)]
pub struct BrokenOracle;

#[async_trait]
impl TokenOracle for BrokenOracle {
    async fn is_holder(&self, _: &str, _: &str, _: i64) -> Result<bool, AttestationError> {
        Err(AttestationError::Transport("connection refused".into()))
    }
}

/// Identity resolver with a fixed set of linked addresses.
#[derive(Debug, Default)]
pub struct FakeIdentity {
    linked: HashSet<String>,
}

impl FakeIdentity {
    pub fn linking(addresses: &[&str]) -> Self {
        Self {
            linked: addresses.iter().map(|a| a.to_lowercase()).collect(),
        }
    }
}

#[async_trait]
impl IdentityResolver for FakeIdentity {
    async fn resolve_by_address(&self, address: &str) -> Result<Option<Profile>, AttestationError> {
        Ok(self.linked.contains(&address.to_lowercase()).then(|| Profile {
            fid: 42,
            username: Some("linked".into()),
            display_name: None,
        }))
    }
}

/// Short timeouts so fail-closed paths finish quickly.
pub fn test_timeouts() -> AttestationTimeouts {
    AttestationTimeouts {
        oracle: Duration::from_millis(200),
        webhook: Duration::from_secs(2),
        identity: Duration::from_millis(200),
    }
}

/// Evaluator over `store` that may call private addresses (local test servers).
pub fn test_evaluator_over(store: Arc<dyn Store>) -> AttestationEvaluator {
    AttestationEvaluator::new(store, test_timeouts(), true).expect("Failed to build evaluator")
}

pub fn test_evaluator(store: Arc<MemoryStore>) -> AttestationEvaluator {
    test_evaluator_over(store)
}

// ============================================================================
// TestApp
// ============================================================================

/// Full router over an in-memory store.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_evaluator(test_evaluator)
    }

    /// Build the app with a custom evaluator (fake oracle, resolver, ...).
    pub fn with_evaluator(build: impl FnOnce(Arc<MemoryStore>) -> AttestationEvaluator) -> Self {
        let store = Arc::new(MemoryStore::new());
        let evaluator = build(store.clone());
        let dyn_store: Arc<dyn Store> = store.clone();
        let state = AppState::new(dyn_store, evaluator, Config::default_for_test());

        Self {
            router: create_router(state),
            store,
        }
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Build a JSON request.
    pub fn json(method: Method, uri: &str, body: &serde_json::Value) -> Request<Body> {
        Self::request(method, uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("Failed to build request")
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}

// ============================================================================
// Test Server
// ============================================================================

/// A running test server bound to a random port.
pub struct TestServer {
    /// Server address (127.0.0.1:PORT).
    pub addr: SocketAddr,
    /// Base URL for HTTP requests (e.g., `http://127.0.0.1:12345`).
    pub url: String,
    /// Handle to the server task for cleanup.
    _handle: JoinHandle<()>,
}

/// Spawn a real HTTP server on a random port.
pub async fn spawn_test_server(router: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server failed");
    });

    TestServer {
        addr,
        url,
        _handle: handle,
    }
}

// ============================================================================
// Data helpers
// ============================================================================

/// Community with READ (position 0) and WRITE (position 1).
pub struct Community {
    pub id: Uuid,
    pub read: Permission,
    pub write: Permission,
}

pub async fn seed_community(store: &dyn Store) -> Community {
    let id = Uuid::new_v4();
    let read = permissions::create_permission(store, id, "Read", Some("READ"), true, 0)
        .await
        .expect("Failed to create READ");
    let write = permissions::create_permission(store, id, "Write", Some("WRITE"), true, 1)
        .await
        .expect("Failed to create WRITE");

    Community { id, read, write }
}
