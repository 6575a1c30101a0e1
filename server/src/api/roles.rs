//! Permission catalog, role and attestation rule endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::attestation::{self, AttestationRule, RuleKind};
use crate::permissions::{self, DefaultRoles, Permission, Role};

// ============================================================================
// Request Types
// ============================================================================

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePermissionRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub unique_identifier: Option<String>,
    #[serde(default = "default_true")]
    pub editable: bool,
    /// Lowest free position when omitted.
    #[validate(range(min = 0, max = 62))]
    pub bit_position: Option<i16>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub is_managed_by_indexer: bool,
    #[serde(default = "default_true")]
    pub editable: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetPermissionsRequest {
    #[validate(length(max = 63))]
    pub permission_ids: Vec<Uuid>,
}

// ============================================================================
// Permissions
// ============================================================================

/// POST /api/communities/{community_id}/permissions
#[tracing::instrument(skip(state, body))]
pub async fn create_permission(
    State(state): State<AppState>,
    Path(community_id): Path<Uuid>,
    Json(body): Json<CreatePermissionRequest>,
) -> ApiResult<(StatusCode, Json<Permission>)> {
    body.validate()?;

    let permission = match body.bit_position {
        Some(position) => {
            permissions::create_permission(
                state.store(),
                community_id,
                &body.name,
                body.unique_identifier.as_deref(),
                body.editable,
                position,
            )
            .await?
        }
        None => {
            permissions::create_next_permission(
                state.store(),
                community_id,
                &body.name,
                body.unique_identifier.as_deref(),
                body.editable,
            )
            .await?
        }
    };

    Ok((StatusCode::CREATED, Json(permission)))
}

/// GET /api/communities/{community_id}/permissions
pub async fn list_permissions(
    State(state): State<AppState>,
    Path(community_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Permission>>> {
    Ok(Json(
        permissions::list_permissions(state.store(), community_id).await?,
    ))
}

/// DELETE /api/permissions/{permission_id}
pub async fn delete_permission(
    State(state): State<AppState>,
    Path(permission_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    permissions::delete_permission(state.store(), permission_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Roles
// ============================================================================

/// POST /api/communities/{community_id}/roles
#[tracing::instrument(skip(state, body))]
pub async fn create_role(
    State(state): State<AppState>,
    Path(community_id): Path<Uuid>,
    Json(body): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<Role>)> {
    body.validate()?;

    let role = permissions::create_role(
        state.store(),
        community_id,
        &body.name,
        body.position,
        body.is_managed_by_indexer,
        body.editable,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(role)))
}

/// POST /api/communities/{community_id}/default-roles
pub async fn create_default_roles(
    State(state): State<AppState>,
    Path(community_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let DefaultRoles { public, owner } =
        permissions::create_default_roles(state.store(), community_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "public": public, "owner": owner })),
    ))
}

/// GET /api/communities/{community_id}/roles
pub async fn list_roles(
    State(state): State<AppState>,
    Path(community_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Role>>> {
    Ok(Json(permissions::list_roles(state.store(), community_id).await?))
}

/// PUT /api/roles/{role_id}/permissions
#[tracing::instrument(skip(state, body))]
pub async fn set_role_permissions(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
    Json(body): Json<SetPermissionsRequest>,
) -> ApiResult<Json<Role>> {
    body.validate()?;

    let role = permissions::set_role_permissions(state.store(), role_id, &body.permission_ids).await?;
    Ok(Json(role))
}

/// DELETE /api/roles/{role_id}
pub async fn delete_role(
    State(state): State<AppState>,
    Path(role_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    permissions::delete_role(state.store(), role_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Attestation rules
// ============================================================================

/// PUT /api/communities/{community_id}/roles/{role_id}/rule
#[tracing::instrument(skip(state, rule))]
pub async fn create_rule(
    State(state): State<AppState>,
    Path((community_id, role_id)): Path<(Uuid, Uuid)>,
    Json(rule): Json<RuleKind>,
) -> ApiResult<(StatusCode, Json<AttestationRule>)> {
    let rule = attestation::create_rule(state.store(), community_id, role_id, rule).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

/// GET /api/communities/{community_id}/roles/{role_id}/rule
pub async fn get_rule(
    State(state): State<AppState>,
    Path((community_id, role_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<AttestationRule>> {
    attestation::rule_for_role(state.store(), role_id)
        .await?
        .filter(|r| r.community_id == community_id)
        .map(Json)
        .ok_or(ApiError::NotFound("Attestation rule"))
}

/// DELETE /api/rules/{rule_id}
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    attestation::delete_rule(state.store(), rule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
