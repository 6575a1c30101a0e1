//! API Router and Application State
//!
//! Thin JSON surface over the engine. Authentication and authorization of
//! administrative calls belong to the deployment in front of this service.

mod channels;
mod error;
mod members;
mod roles;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};

use crate::attestation::AttestationEvaluator;
use crate::config::Config;
use crate::store::Store;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Persistence backend
    pub store: Arc<dyn Store>,
    /// Attestation evaluator, shares the same store
    pub evaluator: Arc<AttestationEvaluator>,
    /// Server configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, evaluator: AttestationEvaluator, config: Config) -> Self {
        Self {
            store,
            evaluator: Arc::new(evaluator),
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let community_routes = Router::new()
        .route(
            "/permissions",
            get(roles::list_permissions).post(roles::create_permission),
        )
        .route("/roles", get(roles::list_roles).post(roles::create_role))
        .route("/default-roles", post(roles::create_default_roles))
        .route(
            "/roles/{role_id}/rule",
            get(roles::get_rule).put(roles::create_rule),
        )
        .route("/channels/{channel_id}/overwrites", put(channels::set_overwrite))
        .route("/capabilities/check", post(channels::check_capability))
        .route("/refresh", post(members::refresh))
        .route("/resync", post(members::resync));

    let api_routes = Router::new()
        .nest("/communities/{community_id}", community_routes)
        .route("/permissions/{permission_id}", delete(roles::delete_permission))
        .route("/roles/{role_id}", delete(roles::delete_role))
        .route("/roles/{role_id}/permissions", put(roles::set_role_permissions))
        .route("/roles/{role_id}/claim", post(members::claim))
        .route("/roles/{role_id}/grant", post(members::grant))
        .route("/rules/{rule_id}", delete(roles::delete_rule))
        .route("/channels/{channel_id}/overwrites", get(channels::list_overwrites))
        .route(
            "/channels/{channel_id}/overwrites/{object_type}/{object_type_id}",
            delete(channels::delete_overwrite),
        )
        .route(
            "/memberships/{membership_id}/roles/{role_id}",
            delete(members::revoke),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Whether NFT rules can be evaluated
    token_oracle: bool,
    /// Whether FARCASTER rules can be evaluated
    identity_resolver: bool,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        token_oracle: state.config.has_token_oracle(),
        identity_resolver: state.config.has_identity_resolver(),
    })
}
