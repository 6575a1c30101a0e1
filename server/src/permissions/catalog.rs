//! Permission catalog.
//!
//! Per-community named capabilities, each bound to a unique bit position.

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use super::mask::{PermissionMask, MAX_BIT_POSITION, POSITION_COUNT};
use super::models::{CapabilityQuery, NewPermission, Permission};
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::store::{constraint, Store, StoreError, StoreResult};

/// Create a permission at an explicit bit position.
///
/// Rejects positions outside `0..=62`, a position already used in the
/// community, and a duplicate `unique_identifier`.
#[tracing::instrument(skip(store))]
pub async fn create_permission(
    store: &dyn Store,
    community_id: Uuid,
    name: &str,
    unique_identifier: Option<&str>,
    editable: bool,
    bit_position: i16,
) -> EngineResult<Permission> {
    if !(0..=MAX_BIT_POSITION).contains(&bit_position) {
        return Err(ValidationError::BitPositionOutOfRange(bit_position).into());
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::Field("permission name is required".into()).into());
    }
    let unique_identifier = unique_identifier
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let new = NewPermission {
        community_id,
        name: name.to_string(),
        unique_identifier: unique_identifier.clone(),
        editable,
        bit_position,
    };

    let permission = store.insert_permission(new).await.map_err(|e| match e {
        StoreError::Conflict(ref c) if c == constraint::PERMISSION_IDENTIFIER => {
            ValidationError::DuplicateIdentifier(unique_identifier.unwrap_or_default()).into()
        }
        StoreError::Conflict(ref c) if c == constraint::PERMISSION_POSITION => {
            ValidationError::BitPositionTaken(bit_position).into()
        }
        other => EngineError::from(other),
    })?;

    debug!(
        permission_id = %permission.id,
        bit_position,
        "Permission created"
    );
    Ok(permission)
}

/// Create a permission at the lowest free bit position of the community.
#[tracing::instrument(skip(store))]
pub async fn create_next_permission(
    store: &dyn Store,
    community_id: Uuid,
    name: &str,
    unique_identifier: Option<&str>,
    editable: bool,
) -> EngineResult<Permission> {
    let existing = store.list_permissions(community_id).await?;
    let position = lowest_free_position(existing.iter().map(|p| p.bit_position))
        .ok_or(ValidationError::PositionSpaceExhausted)?;

    create_permission(
        store,
        community_id,
        name,
        unique_identifier,
        editable,
        position,
    )
    .await
}

/// Lowest position in `0..=62` not present in `used`.
fn lowest_free_position(used: impl Iterator<Item = i16>) -> Option<i16> {
    let used: HashSet<i16> = used.collect();
    if used.len() >= POSITION_COUNT {
        return None;
    }
    (0..=MAX_BIT_POSITION).find(|p| !used.contains(p))
}

/// Find the permission a query targets.
///
/// The id wins over the identifier when both are given. A permission from
/// another community resolves to `None`.
#[tracing::instrument(skip(store))]
pub async fn resolve_permission(
    store: &dyn Store,
    community_id: Uuid,
    query: &CapabilityQuery,
) -> StoreResult<Option<Permission>> {
    if let Some(id) = query.permission_id {
        let permission = store.get_permission(id).await?;
        return Ok(permission.filter(|p| p.community_id == community_id));
    }

    match query.permission_identifier.as_deref() {
        Some(identifier) => {
            store
                .find_permission_by_identifier(community_id, identifier)
                .await
        }
        None => Ok(None),
    }
}

/// Combine the flags of the given permissions.
///
/// Returns `None` for an empty id list, meaning "no explicit grant", which is
/// distinct from an explicit empty mask. Every id must name a permission of
/// the community.
#[tracing::instrument(skip(store))]
pub async fn mask_from_permission_ids(
    store: &dyn Store,
    community_id: Uuid,
    ids: &[Uuid],
) -> EngineResult<Option<PermissionMask>> {
    if ids.is_empty() {
        return Ok(None);
    }

    let permissions = store.get_permissions(ids).await?;
    for id in ids {
        let known = permissions
            .iter()
            .any(|p| p.id == *id && p.community_id == community_id);
        if !known {
            return Err(ValidationError::UnknownPermission(*id).into());
        }
    }

    Ok(Some(PermissionMask::combine(
        permissions.iter().map(|p| p.bit_flag),
    )))
}

/// List the catalog of a community, ordered by bit position.
pub async fn list_permissions(
    store: &dyn Store,
    community_id: Uuid,
) -> EngineResult<Vec<Permission>> {
    Ok(store.list_permissions(community_id).await?)
}

/// Delete an editable permission.
///
/// Its bit is cleared from every role and channel overwrite of the community
/// in the same store operation, so a permission later created at the freed
/// position starts out granted to nobody.
#[tracing::instrument(skip(store))]
pub async fn delete_permission(store: &dyn Store, permission_id: Uuid) -> EngineResult<()> {
    let permission = store
        .get_permission(permission_id)
        .await?
        .ok_or(ValidationError::UnknownPermission(permission_id))?;

    if !permission.editable {
        return Err(EngineError::NotEditable {
            kind: "permission",
            id: permission_id,
        });
    }

    store.delete_permission(permission_id).await?;
    Ok(())
}
