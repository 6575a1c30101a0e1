//! Capability checks.
//!
//! Entry points callers use to answer "may this actor do X here?". A target
//! permission, role or channel that does not exist yields `false`, never an
//! error. Only storage failures are propagated.

use uuid::Uuid;

use super::catalog::resolve_permission;
use super::mask::{is_set, PermissionMask};
use super::models::{Actor, CapabilityQuery, Role};
use super::resolver::{base_permissions_of, overwrite_for};
use super::roles::public_role;
use crate::store::{Store, StoreResult};

/// Check a capability for a set of roles, layering the actor's own overwrite.
///
/// `always_granted` holds the roles every caller implicitly has (the public
/// role). Anonymous checks pass `actor = None` and no `roles`.
#[tracing::instrument(skip(store, always_granted, roles))]
pub async fn has_capability(
    store: &dyn Store,
    community_id: Uuid,
    always_granted: &[Role],
    roles: &[Role],
    query: &CapabilityQuery,
    actor: Option<&Actor>,
) -> StoreResult<bool> {
    let Some(permission) = resolve_permission(store, community_id, query).await? else {
        return Ok(false);
    };

    let effective_roles = merge_roles(always_granted, roles);
    let base = base_permissions_of(&effective_roles);
    let effective = overwrite_for(
        store,
        query.channel_id,
        &effective_roles,
        actor.map(|a| a.account_id),
        base,
    )
    .await?;

    Ok(is_set(Some(effective), Some(permission.bit_flag)))
}

/// Check a capability for one role, without any account context.
///
/// Role overwrites of the channel apply; no account overwrite is layered on
/// top. This differs from [`has_capability`] on purpose and is kept apart.
#[tracing::instrument(skip(store, role), fields(role_id = %role.id))]
pub async fn role_has_capability(
    store: &dyn Store,
    community_id: Uuid,
    role: &Role,
    query: &CapabilityQuery,
) -> StoreResult<bool> {
    let Some(permission) = resolve_permission(store, community_id, query).await? else {
        return Ok(false);
    };

    let roles = std::slice::from_ref(role);
    let effective = overwrite_for(
        store,
        query.channel_id,
        roles,
        None,
        role.base_permissions(),
    )
    .await?;

    Ok(is_set(Some(effective), Some(permission.bit_flag)))
}

/// Roles an account holds through valid ledger entries in a community.
#[tracing::instrument(skip(store))]
pub async fn held_roles(
    store: &dyn Store,
    community_id: Uuid,
    account_id: Uuid,
) -> StoreResult<Vec<Role>> {
    let Some(membership) = store.find_membership(account_id, community_id).await? else {
        return Ok(Vec::new());
    };

    let role_ids: Vec<Uuid> = store
        .list_ledger_entries(membership.id)
        .await?
        .into_iter()
        .filter(|e| e.is_valid)
        .map(|e| e.role_id)
        .collect();

    let mut roles = store.get_roles(&role_ids).await?;
    roles.retain(|r| r.community_id == community_id);
    Ok(roles)
}

/// Check a capability for an actor, loading their roles from the ledger.
///
/// The community's public role is always included; anonymous actors get
/// nothing else.
pub async fn actor_has_capability(
    store: &dyn Store,
    community_id: Uuid,
    actor: Option<&Actor>,
    query: &CapabilityQuery,
) -> StoreResult<bool> {
    let ctx = MemberPermissionContext::load(store, community_id, actor.cloned()).await?;
    ctx.can(store, query).await
}

/// Deduplicated union of two role lists, first occurrence wins.
fn merge_roles(always_granted: &[Role], roles: &[Role]) -> Vec<Role> {
    let mut merged: Vec<Role> = Vec::with_capacity(always_granted.len() + roles.len());
    for role in always_granted.iter().chain(roles) {
        if !merged.iter().any(|r| r.id == role.id) {
            merged.push(role.clone());
        }
    }
    merged
}

/// Pre-computed permission context for one actor in one community.
///
/// Holds the roles and base mask so repeated checks only load channel
/// overwrites.
#[derive(Debug, Clone)]
pub struct MemberPermissionContext {
    pub community_id: Uuid,

    /// `None` for anonymous visitors.
    pub actor: Option<Actor>,

    /// The public role, if the community has one.
    pub always_granted: Vec<Role>,

    /// Roles held through valid ledger entries.
    pub roles: Vec<Role>,

    /// Union of the base permissions of all roles above.
    pub base_permissions: PermissionMask,
}

impl MemberPermissionContext {
    #[tracing::instrument(skip(store))]
    pub async fn load(
        store: &dyn Store,
        community_id: Uuid,
        actor: Option<Actor>,
    ) -> StoreResult<Self> {
        let always_granted: Vec<Role> = public_role(store, community_id).await?.into_iter().collect();
        let roles = match &actor {
            Some(actor) => held_roles(store, community_id, actor.account_id).await?,
            None => Vec::new(),
        };
        let base_permissions = base_permissions_of(&merge_roles(&always_granted, &roles));

        Ok(Self {
            community_id,
            actor,
            always_granted,
            roles,
            base_permissions,
        })
    }

    /// Whether the base permissions alone contain `flag`, ignoring channels.
    #[must_use]
    pub const fn base_has(&self, flag: PermissionMask) -> bool {
        self.base_permissions.has(flag)
    }

    /// Full capability check against this context.
    pub async fn can(&self, store: &dyn Store, query: &CapabilityQuery) -> StoreResult<bool> {
        has_capability(
            store,
            self.community_id,
            &self.always_granted,
            &self.roles,
            query,
            self.actor.as_ref(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::catalog::create_permission;
    use crate::permissions::models::OverwriteTarget;
    use crate::permissions::overwrites::set_overwrite;
    use crate::permissions::roles::{create_default_roles, create_role, set_role_permissions};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_unknown_permission_is_false() {
        let store = MemoryStore::new();
        let community = Uuid::new_v4();
        let role = create_role(&store, community, "Any", 1, false, true)
            .await
            .unwrap();

        let query = CapabilityQuery::identifier("NOPE").in_channel(Uuid::new_v4());
        assert!(!has_capability(&store, community, &[], &[role.clone()], &query, None)
            .await
            .unwrap());
        assert!(!role_has_capability(&store, community, &role, &query)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_single_role_path_skips_account_overwrite() {
        let store = MemoryStore::new();
        let community = Uuid::new_v4();
        let channel = Uuid::new_v4();
        let write = create_permission(&store, community, "Write", Some("WRITE"), true, 1)
            .await
            .unwrap();
        let role = create_role(&store, community, "Writers", 1, false, true)
            .await
            .unwrap();
        let role = set_role_permissions(&store, role.id, &[write.id]).await.unwrap();
        let actor = Actor::new(Uuid::new_v4(), "0xabc");

        set_overwrite(
            &store,
            community,
            channel,
            OverwriteTarget::Role,
            role.id,
            None,
            Some(write.bit_flag),
        )
        .await
        .unwrap();
        set_overwrite(
            &store,
            community,
            channel,
            OverwriteTarget::User,
            actor.account_id,
            Some(write.bit_flag),
            None,
        )
        .await
        .unwrap();

        let query = CapabilityQuery::identifier("WRITE").in_channel(channel);
        assert!(has_capability(&store, community, &[], &[role.clone()], &query, Some(&actor))
            .await
            .unwrap());
        assert!(!role_has_capability(&store, community, &role, &query)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_anonymous_gets_public_role_only() {
        let store = MemoryStore::new();
        let community = Uuid::new_v4();
        let read = create_permission(&store, community, "Read", Some("READ"), true, 0)
            .await
            .unwrap();
        let defaults = create_default_roles(&store, community).await.unwrap();
        set_role_permissions(&store, defaults.public.id, &[read.id])
            .await
            .unwrap();

        let ctx = MemberPermissionContext::load(&store, community, None)
            .await
            .unwrap();
        assert!(ctx.base_has(read.bit_flag));
        assert!(ctx.roles.is_empty());

        assert!(actor_has_capability(&store, community, None, &CapabilityQuery::id(read.id))
            .await
            .unwrap());
    }

    #[test]
    fn test_merge_roles_dedupes() {
        let role = Role {
            id: Uuid::new_v4(),
            community_id: Uuid::nil(),
            name: "Public".into(),
            slug: "public".into(),
            position: 0,
            editable: false,
            permission_string: None,
            is_managed_by_indexer: true,
            indexer_rule_id: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let merged = merge_roles(std::slice::from_ref(&role), std::slice::from_ref(&role));
        assert_eq!(merged.len(), 1);
    }
}
