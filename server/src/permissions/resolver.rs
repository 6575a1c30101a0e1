//! Permission resolution logic.
//!
//! Computes effective permissions for a set of roles in a channel context.
//!
//! Resolution order:
//! 1. Union of the base permissions of every held role
//! 2. Role overwrites of the channel, all matching pairs unioned and applied once
//! 3. The actor's own overwrite of the channel, applied to the result of step 2
//!
//! Each step uses `(mask AND NOT deny) OR allow`, so the actor's overwrite wins
//! over role overwrites, which win over the base.

use uuid::Uuid;

use super::mask::PermissionMask;
use super::models::{OverwriteTarget, PermissionOverwrite, Role};
use crate::store::{Store, StoreResult};

/// Union of the base permissions of `roles`. Never the intersection.
#[must_use]
pub fn base_permissions_of(roles: &[Role]) -> PermissionMask {
    PermissionMask::combine(roles.iter().map(Role::base_permissions))
}

/// Apply a channel's overwrites to `base`.
///
/// Role overwrites for roles outside `roles` are ignored. The user overwrite is
/// only considered when `actor_id` is given.
#[must_use]
pub fn apply_channel_overwrites(
    base: PermissionMask,
    overwrites: &[PermissionOverwrite],
    roles: &[Role],
    actor_id: Option<Uuid>,
) -> PermissionMask {
    let mut allow = PermissionMask::empty();
    let mut deny = PermissionMask::empty();

    for ovr in overwrites
        .iter()
        .filter(|o| o.object_type == OverwriteTarget::Role)
    {
        if roles.iter().any(|r| r.id == ovr.object_type_id) {
            allow |= ovr.allow_mask();
            deny |= ovr.deny_mask();
        }
    }

    let mut result = base.apply(allow, deny);

    if let Some(actor_id) = actor_id {
        let own = overwrites
            .iter()
            .find(|o| o.object_type == OverwriteTarget::User && o.object_type_id == actor_id);
        if let Some(own) = own {
            result = result.apply(own.allow_mask(), own.deny_mask());
        }
    }

    result
}

/// Effective mask for `roles` (and optionally one actor) in a channel.
///
/// Without a channel the base is returned untouched and nothing is loaded.
pub async fn overwrite_for(
    store: &dyn Store,
    channel_id: Option<Uuid>,
    roles: &[Role],
    actor_id: Option<Uuid>,
    base: PermissionMask,
) -> StoreResult<PermissionMask> {
    let Some(channel_id) = channel_id else {
        return Ok(base);
    };

    let overwrites = store.list_overwrites(channel_id).await?;
    Ok(apply_channel_overwrites(base, &overwrites, roles, actor_id))
}
