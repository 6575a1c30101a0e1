//! Membership ledger and attestation endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::error::ApiResult;
use super::AppState;
use crate::membership::{self, LedgerEntry, SyncReport};
use crate::permissions::{Actor, Role};

#[derive(Debug, Deserialize, Validate)]
pub struct ActorRequest {
    pub account_id: Uuid,
    /// Wallet address the attestation rules are evaluated against.
    #[validate(length(min = 1, max = 128))]
    pub address: String,
}

impl ActorRequest {
    fn actor(self) -> Actor {
        Actor::new(self.account_id, self.address)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ClaimRequest {
    #[validate(nested)]
    #[serde(flatten)]
    pub actor: ActorRequest,
    pub managed_override: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub account_id: Uuid,
    pub managed_override: Option<bool>,
}

/// POST /api/communities/{community_id}/refresh
///
/// Roles the actor currently qualifies for. Does not change the ledger.
#[tracing::instrument(skip(state, body))]
pub async fn refresh(
    State(state): State<AppState>,
    Path(community_id): Path<Uuid>,
    Json(body): Json<ActorRequest>,
) -> ApiResult<Json<Vec<Role>>> {
    body.validate()?;
    let actor = body.actor();
    Ok(Json(state.evaluator.refresh(&actor, community_id).await?))
}

/// POST /api/communities/{community_id}/resync
#[tracing::instrument(skip(state, body))]
pub async fn resync(
    State(state): State<AppState>,
    Path(community_id): Path<Uuid>,
    Json(body): Json<ActorRequest>,
) -> ApiResult<Json<SyncReport>> {
    body.validate()?;
    let actor = body.actor();
    Ok(Json(
        membership::resync(&state.evaluator, &actor, community_id).await?,
    ))
}

/// POST /api/roles/{role_id}/claim
#[tracing::instrument(skip(state, body))]
pub async fn claim(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
    Json(body): Json<ClaimRequest>,
) -> ApiResult<Json<LedgerEntry>> {
    body.validate()?;
    let managed_override = body.managed_override;
    let actor = body.actor.actor();
    Ok(Json(
        membership::claim(&state.evaluator, &actor, role_id, managed_override).await?,
    ))
}

/// POST /api/roles/{role_id}/grant
#[tracing::instrument(skip(state))]
pub async fn grant(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
    Json(body): Json<GrantRequest>,
) -> ApiResult<Json<LedgerEntry>> {
    Ok(Json(
        membership::grant(state.store(), body.account_id, role_id, body.managed_override).await?,
    ))
}

/// DELETE /api/memberships/{membership_id}/roles/{role_id}
#[tracing::instrument(skip(state))]
pub async fn revoke(
    State(state): State<AppState>,
    Path((membership_id, role_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<LedgerEntry>> {
    Ok(Json(
        membership::revoke(state.store(), membership_id, role_id).await?,
    ))
}
