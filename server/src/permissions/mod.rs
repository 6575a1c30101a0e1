//! Permission system.
//!
//! Per-community permission catalog, roles, channel overwrites and the
//! capability checks built on top of them:
//! - Masks: fixed 63-position bitsets, one catalog per community
//! - Roles: union of base permissions, never the intersection
//! - Overwrites: role pairs unioned first, the actor's own pair layered last

pub mod capability;
pub mod catalog;
pub mod mask;
pub mod models;
pub mod overwrites;
pub mod resolver;
pub mod roles;

pub use capability::{
    actor_has_capability, has_capability, held_roles, role_has_capability,
    MemberPermissionContext,
};
pub use catalog::{
    create_next_permission, create_permission, delete_permission, list_permissions,
    mask_from_permission_ids, resolve_permission,
};
pub use mask::{is_set, ParseMaskError, PermissionMask, MAX_BIT_POSITION};
pub use models::*;
pub use overwrites::{
    delete_overwrite, list_overwrites, set_overwrite, set_overwrite_from_permission_ids,
};
pub use resolver::{apply_channel_overwrites, base_permissions_of, overwrite_for};
pub use roles::{
    create_default_roles, create_role, delete_role, get_community_role, list_roles,
    public_role, set_role_permissions, slugify, DefaultRoles, OWNER_ROLE_SLUG, PUBLIC_ROLE_SLUG,
};
