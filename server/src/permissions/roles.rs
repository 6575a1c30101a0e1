//! Role store.
//!
//! Roles hold a combined permission mask. A role is either administered by
//! hand or managed by the indexer, in which case membership follows its
//! attestation rule.

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::catalog::mask_from_permission_ids;
use super::models::{NewRole, Role};
use crate::attestation::RuleKind;
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::store::{constraint, Store, StoreError, StoreResult};

/// Slug of the community-wide role every visitor implicitly holds.
pub const PUBLIC_ROLE_SLUG: &str = "public";

/// Slug of the community owner role.
pub const OWNER_ROLE_SLUG: &str = "owner";

/// Attempts at finding a free slug before giving up.
const MAX_SLUG_ATTEMPTS: usize = 10;

/// Length of the random suffix appended on slug collisions.
const SLUG_SUFFIX_LEN: usize = 4;

/// Turn a role name into a slug: lowercase ASCII alphanumerics joined by `-`.
///
/// # Examples
///
/// ```
/// use rolegate_server::permissions::slugify;
///
/// assert_eq!(slugify("Gold Holders!"), "gold-holders");
/// assert_eq!(slugify("  "), "role");
/// ```
#[must_use]
pub fn slugify(name: &str) -> String {
    let slug = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        "role".to_string()
    } else {
        slug
    }
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SLUG_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Create a role with a slug unique in its community.
///
/// The first attempt uses the plain slug; collisions retry with a random
/// suffix, up to ten attempts in total.
#[tracing::instrument(skip(store))]
pub async fn create_role(
    store: &dyn Store,
    community_id: Uuid,
    name: &str,
    position: i32,
    is_managed_by_indexer: bool,
    editable: bool,
) -> EngineResult<Role> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::Field("role name is required".into()).into());
    }

    let base = slugify(name);
    for attempt in 0..MAX_SLUG_ATTEMPTS {
        let slug = if attempt == 0 {
            base.clone()
        } else {
            format!("{base}-{}", random_suffix())
        };

        let new = NewRole {
            community_id,
            name: name.to_string(),
            slug,
            position,
            editable,
            is_managed_by_indexer,
            permission_string: None,
        };

        match store.insert_role(new).await {
            Ok(role) => {
                debug!(role_id = %role.id, slug = %role.slug, attempt, "Role created");
                return Ok(role);
            }
            Err(e) if e.is_conflict_on(constraint::ROLE_SLUG) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Err(ValidationError::SlugExhausted(base).into())
}

/// Replace a role's base permissions with the union of the given permissions.
///
/// An empty list stores `None`, "no base permissions".
#[tracing::instrument(skip(store))]
pub async fn set_role_permissions(
    store: &dyn Store,
    role_id: Uuid,
    permission_ids: &[Uuid],
) -> EngineResult<Role> {
    let role = store
        .get_role(role_id)
        .await?
        .ok_or(ValidationError::UnknownRole(role_id))?;

    let mask = mask_from_permission_ids(store, role.community_id, permission_ids).await?;

    let updated = store
        .set_role_permissions(role_id, mask)
        .await?
        .ok_or(ValidationError::UnknownRole(role_id))?;

    info!(
        role_id = %role_id,
        permission_string = ?updated.permission_string.map(|m| m.to_string()),
        "Role permissions updated"
    );
    Ok(updated)
}

/// Look up a role that must belong to the given community.
pub async fn get_community_role(
    store: &dyn Store,
    community_id: Uuid,
    role_id: Uuid,
) -> EngineResult<Role> {
    store
        .get_role(role_id)
        .await?
        .filter(|r| r.community_id == community_id)
        .ok_or_else(|| ValidationError::UnknownRole(role_id).into())
}

/// The community's implicit public role, if it was created.
pub async fn public_role(store: &dyn Store, community_id: Uuid) -> StoreResult<Option<Role>> {
    store.find_role_by_slug(community_id, PUBLIC_ROLE_SLUG).await
}

/// All roles of a community, ordered by position.
pub async fn list_roles(store: &dyn Store, community_id: Uuid) -> EngineResult<Vec<Role>> {
    Ok(store.list_roles(community_id).await?)
}

/// Delete an editable role.
#[tracing::instrument(skip(store))]
pub async fn delete_role(store: &dyn Store, role_id: Uuid) -> EngineResult<()> {
    let role = store
        .get_role(role_id)
        .await?
        .ok_or(ValidationError::UnknownRole(role_id))?;

    if !role.editable {
        return Err(EngineError::NotEditable {
            kind: "role",
            id: role_id,
        });
    }

    store.delete_role(role_id).await?;
    Ok(())
}

/// The two roles every community starts with.
#[derive(Debug, Clone)]
pub struct DefaultRoles {
    pub public: Role,
    pub owner: Role,
}

/// Create the `public` and `owner` roles of a new community.
///
/// - public: indexer-managed with an unconditional rule, not editable
/// - owner: administered by hand, not editable
///
/// Meant to run once per community; a second run fails on the slug.
/// The three writes are not one transaction: when a later one fails, the
/// roles already inserted are deleted again before the error is returned.
#[tracing::instrument(skip(store))]
pub async fn create_default_roles(
    store: &dyn Store,
    community_id: Uuid,
) -> EngineResult<DefaultRoles> {
    let owner = insert_fixed_role(store, community_id, "Owner", OWNER_ROLE_SLUG, 0, false).await?;

    let public = match insert_public_role(store, community_id).await {
        Ok(public) => public,
        Err(e) => {
            discard_role(store, owner.id).await;
            return Err(e);
        }
    };

    info!(community_id = %community_id, "Default roles created");
    Ok(DefaultRoles { public, owner })
}

async fn insert_public_role(store: &dyn Store, community_id: Uuid) -> EngineResult<Role> {
    let public = insert_fixed_role(store, community_id, "Public", PUBLIC_ROLE_SLUG, 1000, true).await?;

    match store.insert_rule(community_id, public.id, RuleKind::Public).await {
        Ok(rule) => Ok(Role {
            indexer_rule_id: Some(rule.id),
            ..public
        }),
        Err(e) => {
            discard_role(store, public.id).await;
            Err(e.into())
        }
    }
}

/// Best-effort removal of a half-created default role.
async fn discard_role(store: &dyn Store, role_id: Uuid) {
    if let Err(e) = store.delete_role(role_id).await {
        warn!(role_id = %role_id, error = %e, "Failed to remove partially created default role");
    }
}

async fn insert_fixed_role(
    store: &dyn Store,
    community_id: Uuid,
    name: &str,
    slug: &str,
    position: i32,
    is_managed_by_indexer: bool,
) -> EngineResult<Role> {
    store
        .insert_role(NewRole {
            community_id,
            name: name.to_string(),
            slug: slug.to_string(),
            position,
            editable: false,
            is_managed_by_indexer,
            permission_string: None,
        })
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => {
                ValidationError::Field(format!("community already has a '{slug}' role")).into()
            }
            other => EngineError::from(other),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::catalog::create_permission;
    use crate::store::MemoryStore;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Moderator"), "moderator");
        assert_eq!(slugify("  Gold -- Holders "), "gold-holders");
        assert_eq!(slugify("Ünïcode Ñame"), "n-code-ame");
        assert_eq!(slugify("!!!"), "role");
    }

    #[test]
    fn test_random_suffix_shape() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), SLUG_SUFFIX_LEN);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_slug_collision_gets_suffix() {
        let store = MemoryStore::new();
        let community = Uuid::new_v4();

        let first = create_role(&store, community, "Holders", 1, false, true)
            .await
            .unwrap();
        let second = create_role(&store, community, "Holders", 2, false, true)
            .await
            .unwrap();

        assert_eq!(first.slug, "holders");
        assert!(second.slug.starts_with("holders-"));
        assert_ne!(first.slug, second.slug);
    }

    #[tokio::test]
    async fn test_same_slug_in_other_community() {
        let store = MemoryStore::new();
        let a = create_role(&store, Uuid::new_v4(), "Holders", 1, false, true)
            .await
            .unwrap();
        let b = create_role(&store, Uuid::new_v4(), "Holders", 1, false, true)
            .await
            .unwrap();
        assert_eq!(a.slug, b.slug);
    }

    #[tokio::test]
    async fn test_set_permissions_and_clear() {
        let store = MemoryStore::new();
        let community = Uuid::new_v4();
        let read = create_permission(&store, community, "Read", Some("READ"), true, 0)
            .await
            .unwrap();
        let write = create_permission(&store, community, "Write", Some("WRITE"), true, 1)
            .await
            .unwrap();
        let role = create_role(&store, community, "Editors", 1, false, true)
            .await
            .unwrap();
        assert_eq!(role.permission_string, None);

        let role = set_role_permissions(&store, role.id, &[read.id, write.id])
            .await
            .unwrap();
        assert_eq!(
            role.permission_string.map(|m| m.to_string()).as_deref(),
            Some("3")
        );

        let role = set_role_permissions(&store, role.id, &[]).await.unwrap();
        assert_eq!(role.permission_string, None);
    }

    #[tokio::test]
    async fn test_set_permissions_unknown_role() {
        let store = MemoryStore::new();
        let missing = Uuid::new_v4();
        let err = set_role_permissions(&store, missing, &[]).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::UnknownRole(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_default_roles() {
        let store = MemoryStore::new();
        let community = Uuid::new_v4();

        let defaults = create_default_roles(&store, community).await.unwrap();
        assert!(defaults.public.is_managed_by_indexer);
        assert!(!defaults.public.editable);
        assert!(defaults.public.indexer_rule_id.is_some());
        assert!(!defaults.owner.is_managed_by_indexer);

        let found = public_role(&store, community).await.unwrap().unwrap();
        assert_eq!(found.id, defaults.public.id);

        let rule = store
            .find_rule_for_role(defaults.public.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rule.rule, RuleKind::Public);

        assert!(create_default_roles(&store, community).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_default_roles_leave_nothing_behind() {
        let store = MemoryStore::new();
        let community = Uuid::new_v4();
        let squatter = create_role(&store, community, "Public", 1, false, true)
            .await
            .unwrap();
        assert_eq!(squatter.slug, PUBLIC_ROLE_SLUG);

        let err = create_default_roles(&store, community).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(ValidationError::Field(_))));

        let roles = list_roles(&store, community).await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].id, squatter.id);
        assert!(store
            .find_role_by_slug(community, OWNER_ROLE_SLUG)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_role_drops_overwrites_and_membership_entries() {
        use crate::permissions::{set_overwrite, OverwriteTarget, PermissionMask};

        let store = MemoryStore::new();
        let community = Uuid::new_v4();
        let channel = Uuid::new_v4();
        let doomed = create_role(&store, community, "Doomed", 1, false, true)
            .await
            .unwrap();
        let stays = create_role(&store, community, "Stays", 2, false, true)
            .await
            .unwrap();

        for role_id in [doomed.id, stays.id] {
            set_overwrite(
                &store,
                community,
                channel,
                OverwriteTarget::Role,
                role_id,
                Some(PermissionMask::from(1)),
                None,
            )
            .await
            .unwrap();
        }

        let membership = store
            .upsert_membership(Uuid::new_v4(), community)
            .await
            .unwrap();
        for role_id in [doomed.id, stays.id] {
            store.add_membership_role(membership.id, role_id).await.unwrap();
        }

        delete_role(&store, doomed.id).await.unwrap();

        let overwrites = store.list_overwrites(channel).await.unwrap();
        assert_eq!(overwrites.len(), 1);
        assert_eq!(overwrites[0].object_type_id, stays.id);

        let membership = store.get_membership(membership.id).await.unwrap().unwrap();
        assert_eq!(membership.roles, vec![stays.id]);
    }

    #[tokio::test]
    async fn test_delete_requires_editable() {
        let store = MemoryStore::new();
        let community = Uuid::new_v4();
        let defaults = create_default_roles(&store, community).await.unwrap();
        let custom = create_role(&store, community, "Custom", 5, false, true)
            .await
            .unwrap();

        let err = delete_role(&store, defaults.owner.id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotEditable { kind: "role", .. }));

        delete_role(&store, custom.id).await.unwrap();
        assert_eq!(list_roles(&store, community).await.unwrap().len(), 2);
    }
}
