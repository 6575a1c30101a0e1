//! Database models for the permission system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::mask::PermissionMask;

/// Named capability bound to one bit position inside a community.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Permission {
    pub id: Uuid,
    pub community_id: Uuid,
    pub name: String,
    pub unique_identifier: Option<String>,
    pub editable: bool,
    pub bit_position: i16,
    pub bit_flag: PermissionMask,
    pub created_at: DateTime<Utc>,
}

/// Named grant holding a combined permission mask.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: Uuid,
    pub community_id: Uuid,
    pub name: String,
    pub slug: String,
    pub position: i32,
    pub editable: bool,
    /// `None` means the role grants no base permissions.
    pub permission_string: Option<PermissionMask>,
    pub is_managed_by_indexer: bool,
    pub indexer_rule_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Base permissions granted by this role, absent masks count as empty.
    #[must_use]
    pub fn base_permissions(&self) -> PermissionMask {
        self.permission_string.unwrap_or_default()
    }
}

/// What a channel overwrite is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "overwrite_target", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum OverwriteTarget {
    Role,
    User,
}

/// Per-channel allow/deny pair for one role or one account.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionOverwrite {
    pub id: Uuid,
    pub community_id: Uuid,
    pub channel_id: Uuid,
    pub object_type: OverwriteTarget,
    pub object_type_id: Uuid,
    pub allowed: Option<PermissionMask>,
    pub denied: Option<PermissionMask>,
}

impl PermissionOverwrite {
    /// Allowed bits, absent counts as empty.
    #[must_use]
    pub fn allow_mask(&self) -> PermissionMask {
        self.allowed.unwrap_or_default()
    }

    /// Denied bits, absent counts as empty.
    #[must_use]
    pub fn deny_mask(&self) -> PermissionMask {
        self.denied.unwrap_or_default()
    }
}

// ============================================================================
// Insert payloads
// ============================================================================

/// Fields for a permission insert. The flag is derived from the position.
#[derive(Debug, Clone)]
pub struct NewPermission {
    pub community_id: Uuid,
    pub name: String,
    pub unique_identifier: Option<String>,
    pub editable: bool,
    pub bit_position: i16,
}

/// Fields for a role insert.
#[derive(Debug, Clone)]
pub struct NewRole {
    pub community_id: Uuid,
    pub name: String,
    pub slug: String,
    pub position: i32,
    pub editable: bool,
    pub is_managed_by_indexer: bool,
    pub permission_string: Option<PermissionMask>,
}

/// Fields for an overwrite upsert, keyed by `(channel_id, object_type, object_type_id)`.
#[derive(Debug, Clone)]
pub struct NewOverwrite {
    pub community_id: Uuid,
    pub channel_id: Uuid,
    pub object_type: OverwriteTarget,
    pub object_type_id: Uuid,
    pub allowed: Option<PermissionMask>,
    pub denied: Option<PermissionMask>,
}

/// The party whose capabilities are being checked or evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub account_id: Uuid,
    /// Wallet address used by attestation rules.
    pub address: String,
}

impl Actor {
    #[must_use]
    pub fn new(account_id: Uuid, address: impl Into<String>) -> Self {
        Self {
            account_id,
            address: address.into(),
        }
    }
}

/// Target capability of a check, optionally scoped to a channel.
///
/// `permission_id` wins over `permission_identifier` when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityQuery {
    pub permission_id: Option<Uuid>,
    pub permission_identifier: Option<String>,
    pub channel_id: Option<Uuid>,
}

impl CapabilityQuery {
    /// Query by unique identifier.
    #[must_use]
    pub fn identifier(identifier: impl Into<String>) -> Self {
        Self {
            permission_identifier: Some(identifier.into()),
            ..Self::default()
        }
    }

    /// Query by permission id.
    #[must_use]
    pub fn id(permission_id: Uuid) -> Self {
        Self {
            permission_id: Some(permission_id),
            ..Self::default()
        }
    }

    /// Scope the query to a channel.
    #[must_use]
    pub fn in_channel(mut self, channel_id: Uuid) -> Self {
        self.channel_id = Some(channel_id);
        self
    }
}
