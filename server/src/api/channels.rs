//! Channel overwrite and capability check endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::permissions::{
    self, Actor, CapabilityQuery, OverwriteTarget, PermissionMask, PermissionOverwrite,
};

#[derive(Debug, Deserialize, Validate)]
pub struct SetOverwriteRequest {
    pub object_type: OverwriteTarget,
    pub object_type_id: Uuid,
    pub allowed: Option<PermissionMask>,
    pub denied: Option<PermissionMask>,
    /// Alternative to `allowed`/`denied`: permission ids combined into masks.
    #[validate(length(max = 63))]
    pub allowed_permission_ids: Option<Vec<Uuid>>,
    #[validate(length(max = 63))]
    pub denied_permission_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckCapabilityRequest {
    pub permission_id: Option<Uuid>,
    #[validate(length(min = 1, max = 64))]
    pub permission_identifier: Option<String>,
    pub channel_id: Option<Uuid>,
    /// Checked account; anonymous when omitted.
    pub account_id: Option<Uuid>,
    #[validate(length(max = 128))]
    pub address: Option<String>,
    /// Check a single role instead of an account; account overwrites do not apply.
    pub role_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CapabilityResponse {
    pub allowed: bool,
}

/// GET /api/channels/{channel_id}/overwrites
pub async fn list_overwrites(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PermissionOverwrite>>> {
    Ok(Json(
        permissions::list_overwrites(state.store(), channel_id).await?,
    ))
}

/// PUT /api/communities/{community_id}/channels/{channel_id}/overwrites
#[tracing::instrument(skip(state, body))]
pub async fn set_overwrite(
    State(state): State<AppState>,
    Path((community_id, channel_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<SetOverwriteRequest>,
) -> ApiResult<Json<PermissionOverwrite>> {
    body.validate()?;

    let by_ids = body.allowed_permission_ids.is_some() || body.denied_permission_ids.is_some();
    if by_ids && (body.allowed.is_some() || body.denied.is_some()) {
        return Err(ApiError::InvalidRequest(
            "give either masks or permission ids, not both".into(),
        ));
    }

    let overwrite = if by_ids {
        permissions::set_overwrite_from_permission_ids(
            state.store(),
            community_id,
            channel_id,
            body.object_type,
            body.object_type_id,
            body.allowed_permission_ids.as_deref().unwrap_or_default(),
            body.denied_permission_ids.as_deref().unwrap_or_default(),
        )
        .await?
    } else {
        permissions::set_overwrite(
            state.store(),
            community_id,
            channel_id,
            body.object_type,
            body.object_type_id,
            body.allowed,
            body.denied,
        )
        .await?
    };

    Ok(Json(overwrite))
}

/// DELETE /api/channels/{channel_id}/overwrites/{object_type}/{object_type_id}
pub async fn delete_overwrite(
    State(state): State<AppState>,
    Path((channel_id, object_type, object_type_id)): Path<(Uuid, OverwriteTarget, Uuid)>,
) -> ApiResult<StatusCode> {
    if permissions::delete_overwrite(state.store(), channel_id, object_type, object_type_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Overwrite"))
    }
}

/// POST /api/communities/{community_id}/capabilities/check
#[tracing::instrument(skip(state, body))]
pub async fn check_capability(
    State(state): State<AppState>,
    Path(community_id): Path<Uuid>,
    Json(body): Json<CheckCapabilityRequest>,
) -> ApiResult<Json<CapabilityResponse>> {
    body.validate()?;
    if body.permission_id.is_none() && body.permission_identifier.is_none() {
        return Err(ApiError::InvalidRequest(
            "permission_id or permission_identifier is required".into(),
        ));
    }

    let query = CapabilityQuery {
        permission_id: body.permission_id,
        permission_identifier: body.permission_identifier,
        channel_id: body.channel_id,
    };

    let allowed = if let Some(role_id) = body.role_id {
        match state.store().get_role(role_id).await? {
            Some(role) if role.community_id == community_id => {
                permissions::role_has_capability(state.store(), community_id, &role, &query).await?
            }
            _ => false,
        }
    } else {
        let actor = body
            .account_id
            .map(|id| Actor::new(id, body.address.unwrap_or_default()));
        permissions::actor_has_capability(state.store(), community_id, actor.as_ref(), &query)
            .await?
    };

    Ok(Json(CapabilityResponse { allowed }))
}
