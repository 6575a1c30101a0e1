//! Document store used by the engine.
//!
//! Every uniqueness-sensitive write is a single call here, so duplicate
//! creation is closed at the storage layer rather than by check-then-insert.
//! A violated unique key surfaces as [`StoreError::Conflict`] carrying the
//! constraint name from [`constraint`].

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::attestation::{AttestationRule, RuleKind};
use crate::membership::{LedgerEntry, Membership};
use crate::permissions::{
    NewOverwrite, NewPermission, NewRole, OverwriteTarget, Permission, PermissionMask,
    PermissionOverwrite, Role,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Unique constraint names shared by every store implementation.
pub mod constraint {
    pub const PERMISSION_IDENTIFIER: &str = "permissions_community_identifier_key";
    pub const PERMISSION_POSITION: &str = "permissions_community_position_key";
    pub const ROLE_SLUG: &str = "roles_community_slug_key";
    pub const RULE_ROLE: &str = "indexer_rules_role_id_key";
}

/// Storage failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Referenced row does not exist: {0}")]
    MissingReference(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Whether this is a violation of the named unique constraint.
    #[must_use]
    pub fn is_conflict_on(&self, name: &str) -> bool {
        matches!(self, Self::Conflict(c) if c == name)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return Self::Conflict(db.constraint().unwrap_or_default().to_string());
            }
            if db.is_foreign_key_violation() {
                return Self::MissingReference(db.constraint().unwrap_or_default().to_string());
            }
        }
        Self::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for permissions, roles, overwrites, memberships and rules.
#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    /// Insert a permission; conflicts on identifier or bit position.
    async fn insert_permission(&self, new: NewPermission) -> StoreResult<Permission>;

    async fn get_permission(&self, id: Uuid) -> StoreResult<Option<Permission>>;

    async fn find_permission_by_identifier(
        &self,
        community_id: Uuid,
        identifier: &str,
    ) -> StoreResult<Option<Permission>>;

    /// Fetch permissions by id. Unknown ids are skipped.
    async fn get_permissions(&self, ids: &[Uuid]) -> StoreResult<Vec<Permission>>;

    /// All permissions of a community, ordered by bit position.
    async fn list_permissions(&self, community_id: Uuid) -> StoreResult<Vec<Permission>>;

    /// Delete a permission and clear its bit from the community's role masks
    /// and overwrites, atomically.
    async fn delete_permission(&self, id: Uuid) -> StoreResult<bool>;

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// Insert a role; conflicts on slug.
    async fn insert_role(&self, new: NewRole) -> StoreResult<Role>;

    async fn get_role(&self, id: Uuid) -> StoreResult<Option<Role>>;

    async fn find_role_by_slug(&self, community_id: Uuid, slug: &str)
        -> StoreResult<Option<Role>>;

    /// Fetch roles by id. Unknown ids are skipped.
    async fn get_roles(&self, ids: &[Uuid]) -> StoreResult<Vec<Role>>;

    /// All roles of a community, ordered by position.
    async fn list_roles(&self, community_id: Uuid) -> StoreResult<Vec<Role>>;

    /// Roles that are both indexer-managed and editable.
    async fn list_indexer_roles(&self, community_id: Uuid) -> StoreResult<Vec<Role>>;

    async fn set_role_permissions(
        &self,
        role_id: Uuid,
        permission_string: Option<PermissionMask>,
    ) -> StoreResult<Option<Role>>;

    /// Delete a role together with its rule, ledger entries and overwrites,
    /// and drop it from membership role lists.
    async fn delete_role(&self, id: Uuid) -> StoreResult<bool>;

    // ------------------------------------------------------------------
    // Channel overwrites
    // ------------------------------------------------------------------

    async fn list_overwrites(&self, channel_id: Uuid) -> StoreResult<Vec<PermissionOverwrite>>;

    /// Insert or replace the overwrite for `(channel, object_type, object_type_id)`.
    async fn upsert_overwrite(&self, new: NewOverwrite) -> StoreResult<PermissionOverwrite>;

    async fn delete_overwrite(
        &self,
        channel_id: Uuid,
        object_type: OverwriteTarget,
        object_type_id: Uuid,
    ) -> StoreResult<bool>;

    // ------------------------------------------------------------------
    // Memberships
    // ------------------------------------------------------------------

    /// Find or create the membership row for an account in a community.
    async fn upsert_membership(
        &self,
        account_id: Uuid,
        community_id: Uuid,
    ) -> StoreResult<Membership>;

    async fn find_membership(
        &self,
        account_id: Uuid,
        community_id: Uuid,
    ) -> StoreResult<Option<Membership>>;

    async fn get_membership(&self, id: Uuid) -> StoreResult<Option<Membership>>;

    /// Append a role id to the membership's role list if it is missing.
    async fn add_membership_role(&self, membership_id: Uuid, role_id: Uuid) -> StoreResult<()>;

    async fn remove_membership_role(&self, membership_id: Uuid, role_id: Uuid)
        -> StoreResult<()>;

    // ------------------------------------------------------------------
    // Ledger
    // ------------------------------------------------------------------

    /// Create or re-validate the entry for `(membership, role)`.
    ///
    /// The entry ends up with `is_valid = true` and the given managed flag.
    async fn upsert_ledger_entry(
        &self,
        membership_id: Uuid,
        role_id: Uuid,
        is_managed_by_indexer: bool,
    ) -> StoreResult<LedgerEntry>;

    async fn find_ledger_entry(
        &self,
        membership_id: Uuid,
        role_id: Uuid,
    ) -> StoreResult<Option<LedgerEntry>>;

    async fn list_ledger_entries(&self, membership_id: Uuid) -> StoreResult<Vec<LedgerEntry>>;

    async fn set_ledger_flags(
        &self,
        membership_id: Uuid,
        role_id: Uuid,
        is_valid: bool,
        is_managed_by_indexer: bool,
    ) -> StoreResult<Option<LedgerEntry>>;

    // ------------------------------------------------------------------
    // Attestation rules
    // ------------------------------------------------------------------

    /// Attach a rule to a role and mark the role indexer-managed.
    ///
    /// Conflicts when the role already has a rule.
    async fn insert_rule(
        &self,
        community_id: Uuid,
        role_id: Uuid,
        rule: RuleKind,
    ) -> StoreResult<AttestationRule>;

    async fn get_rule(&self, id: Uuid) -> StoreResult<Option<AttestationRule>>;

    async fn find_rule_for_role(&self, role_id: Uuid) -> StoreResult<Option<AttestationRule>>;

    /// Delete a rule and clear the owning role's reference to it.
    async fn delete_rule(&self, id: Uuid) -> StoreResult<bool>;
}
