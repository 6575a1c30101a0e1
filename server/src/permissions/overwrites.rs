//! Channel overwrite administration.

use tracing::debug;
use uuid::Uuid;

use super::catalog::mask_from_permission_ids;
use super::mask::PermissionMask;
use super::models::{NewOverwrite, OverwriteTarget, PermissionOverwrite};
use crate::error::{EngineResult, ValidationError};
use crate::store::Store;

/// Insert or replace the overwrite of one role or account on a channel.
///
/// Role targets must name a role of `community_id`. Account targets are not
/// checked, accounts live outside this engine.
#[tracing::instrument(skip(store))]
pub async fn set_overwrite(
    store: &dyn Store,
    community_id: Uuid,
    channel_id: Uuid,
    object_type: OverwriteTarget,
    object_type_id: Uuid,
    allowed: Option<PermissionMask>,
    denied: Option<PermissionMask>,
) -> EngineResult<PermissionOverwrite> {
    if object_type == OverwriteTarget::Role {
        let known = store
            .get_role(object_type_id)
            .await?
            .is_some_and(|r| r.community_id == community_id);
        if !known {
            return Err(ValidationError::UnknownRole(object_type_id).into());
        }
    }

    let overwrite = store
        .upsert_overwrite(NewOverwrite {
            community_id,
            channel_id,
            object_type,
            object_type_id,
            allowed,
            denied,
        })
        .await?;

    debug!(overwrite_id = %overwrite.id, "Channel overwrite set");
    Ok(overwrite)
}

/// Like [`set_overwrite`], with allow and deny given as permission ids.
#[tracing::instrument(skip(store))]
pub async fn set_overwrite_from_permission_ids(
    store: &dyn Store,
    community_id: Uuid,
    channel_id: Uuid,
    object_type: OverwriteTarget,
    object_type_id: Uuid,
    allowed: &[Uuid],
    denied: &[Uuid],
) -> EngineResult<PermissionOverwrite> {
    let allowed = mask_from_permission_ids(store, community_id, allowed).await?;
    let denied = mask_from_permission_ids(store, community_id, denied).await?;

    set_overwrite(
        store,
        community_id,
        channel_id,
        object_type,
        object_type_id,
        allowed,
        denied,
    )
    .await
}

pub async fn list_overwrites(
    store: &dyn Store,
    channel_id: Uuid,
) -> EngineResult<Vec<PermissionOverwrite>> {
    Ok(store.list_overwrites(channel_id).await?)
}

/// Remove an overwrite. Returns whether one existed.
#[tracing::instrument(skip(store))]
pub async fn delete_overwrite(
    store: &dyn Store,
    channel_id: Uuid,
    object_type: OverwriteTarget,
    object_type_id: Uuid,
) -> EngineResult<bool> {
    Ok(store
        .delete_overwrite(channel_id, object_type, object_type_id)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::permissions::catalog::create_permission;
    use crate::permissions::roles::create_role;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let store = MemoryStore::new();
        let community = Uuid::new_v4();
        let channel = Uuid::new_v4();
        let role = create_role(&store, community, "Members", 1, false, true)
            .await
            .unwrap();

        let first = set_overwrite(
            &store,
            community,
            channel,
            OverwriteTarget::Role,
            role.id,
            Some(PermissionMask::from(1)),
            None,
        )
        .await
        .unwrap();
        let second = set_overwrite(
            &store,
            community,
            channel,
            OverwriteTarget::Role,
            role.id,
            None,
            Some(PermissionMask::from(2)),
        )
        .await
        .unwrap();

        assert_eq!(first.id, second.id);
        let all = list_overwrites(&store, channel).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].allowed, None);
        assert_eq!(all[0].denied, Some(PermissionMask::from(2)));
    }

    #[tokio::test]
    async fn test_role_target_must_exist() {
        let store = MemoryStore::new();
        let community = Uuid::new_v4();
        let missing = Uuid::new_v4();

        let err = set_overwrite(
            &store,
            community,
            Uuid::new_v4(),
            OverwriteTarget::Role,
            missing,
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::UnknownRole(id)) if id == missing
        ));

        // Accounts are not checked.
        set_overwrite(
            &store,
            community,
            Uuid::new_v4(),
            OverwriteTarget::User,
            Uuid::new_v4(),
            Some(PermissionMask::from(1)),
            None,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_from_permission_ids() {
        let store = MemoryStore::new();
        let community = Uuid::new_v4();
        let channel = Uuid::new_v4();
        let read = create_permission(&store, community, "Read", Some("READ"), true, 0)
            .await
            .unwrap();
        let write = create_permission(&store, community, "Write", Some("WRITE"), true, 1)
            .await
            .unwrap();
        let account = Uuid::new_v4();

        let ovr = set_overwrite_from_permission_ids(
            &store,
            community,
            channel,
            OverwriteTarget::User,
            account,
            &[read.id],
            &[write.id],
        )
        .await
        .unwrap();
        assert_eq!(ovr.allowed.map(|m| m.to_string()).as_deref(), Some("1"));
        assert_eq!(ovr.denied.map(|m| m.to_string()).as_deref(), Some("2"));

        assert!(delete_overwrite(&store, channel, OverwriteTarget::User, account)
            .await
            .unwrap());
        assert!(!delete_overwrite(&store, channel, OverwriteTarget::User, account)
            .await
            .unwrap());
    }
}
