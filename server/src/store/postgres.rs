//! `PostgreSQL` store.
//!
//! Uniqueness is enforced by constraints and `ON CONFLICT` clauses, so every
//! find-or-create is a single round trip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::attestation::{AttestationRule, RuleKind};
use crate::membership::{LedgerEntry, Membership};
use crate::permissions::{
    NewOverwrite, NewPermission, NewRole, OverwriteTarget, Permission, PermissionMask,
    PermissionOverwrite, Role,
};

/// Store backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Row shape of `indexer_rules`.
#[derive(Debug, FromRow)]
struct RuleRow {
    id: Uuid,
    community_id: Uuid,
    role_id: Uuid,
    rule_data: Json<RuleKind>,
    created_at: DateTime<Utc>,
}

impl From<RuleRow> for AttestationRule {
    fn from(row: RuleRow) -> Self {
        Self {
            id: row.id,
            community_id: row.community_id,
            role_id: row.role_id,
            rule: row.rule_data.0,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl Store for PgStore {
    // ========================================================================
    // Permissions
    // ========================================================================

    async fn insert_permission(&self, new: NewPermission) -> StoreResult<Permission> {
        let flag = PermissionMask::flag(new.bit_position).unwrap_or_default();

        let permission = sqlx::query_as::<_, Permission>(
            r"
            INSERT INTO permissions (id, community_id, name, unique_identifier, editable, bit_position, bit_flag)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, community_id, name, unique_identifier, editable, bit_position, bit_flag, created_at
            ",
        )
        .bind(Uuid::now_v7())
        .bind(new.community_id)
        .bind(&new.name)
        .bind(&new.unique_identifier)
        .bind(new.editable)
        .bind(new.bit_position)
        .bind(flag)
        .fetch_one(&self.pool)
        .await?;

        Ok(permission)
    }

    async fn get_permission(&self, id: Uuid) -> StoreResult<Option<Permission>> {
        let permission = sqlx::query_as::<_, Permission>(
            r"
            SELECT id, community_id, name, unique_identifier, editable, bit_position, bit_flag, created_at
            FROM permissions
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(permission)
    }

    async fn find_permission_by_identifier(
        &self,
        community_id: Uuid,
        identifier: &str,
    ) -> StoreResult<Option<Permission>> {
        let permission = sqlx::query_as::<_, Permission>(
            r"
            SELECT id, community_id, name, unique_identifier, editable, bit_position, bit_flag, created_at
            FROM permissions
            WHERE community_id = $1
              AND unique_identifier = $2
            ",
        )
        .bind(community_id)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(permission)
    }

    async fn get_permissions(&self, ids: &[Uuid]) -> StoreResult<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(
            r"
            SELECT id, community_id, name, unique_identifier, editable, bit_position, bit_flag, created_at
            FROM permissions
            WHERE id = ANY($1)
            ORDER BY bit_position ASC
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }

    async fn list_permissions(&self, community_id: Uuid) -> StoreResult<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(
            r"
            SELECT id, community_id, name, unique_identifier, editable, bit_position, bit_flag, created_at
            FROM permissions
            WHERE community_id = $1
            ORDER BY bit_position ASC
            ",
        )
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }

    async fn delete_permission(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let deleted: Option<(Uuid, PermissionMask)> = sqlx::query_as(
            "DELETE FROM permissions WHERE id = $1 RETURNING community_id, bit_flag",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((community_id, flag)) = deleted else {
            tx.rollback().await?;
            return Ok(false);
        };

        // The freed position may be reused; nothing may keep granting it.
        sqlx::query(
            r"
            UPDATE roles
            SET permission_string = permission_string & ~$2,
                updated_at = NOW()
            WHERE community_id = $1
              AND permission_string & $2 <> 0
            ",
        )
        .bind(community_id)
        .bind(flag)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            UPDATE permission_overwrites
            SET allowed = allowed & ~$2,
                denied = denied & ~$2
            WHERE community_id = $1
              AND (allowed & $2 <> 0 OR denied & $2 <> 0)
            ",
        )
        .bind(community_id)
        .bind(flag)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    // ========================================================================
    // Roles
    // ========================================================================

    async fn insert_role(&self, new: NewRole) -> StoreResult<Role> {
        let role = sqlx::query_as::<_, Role>(
            r"
            INSERT INTO roles (id, community_id, name, slug, position, editable, permission_string, is_managed_by_indexer)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, community_id, name, slug, position, editable, permission_string,
                      is_managed_by_indexer, indexer_rule_id, created_at, updated_at
            ",
        )
        .bind(Uuid::now_v7())
        .bind(new.community_id)
        .bind(&new.name)
        .bind(&new.slug)
        .bind(new.position)
        .bind(new.editable)
        .bind(new.permission_string)
        .bind(new.is_managed_by_indexer)
        .fetch_one(&self.pool)
        .await?;

        Ok(role)
    }

    async fn get_role(&self, id: Uuid) -> StoreResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            r"
            SELECT id, community_id, name, slug, position, editable, permission_string,
                   is_managed_by_indexer, indexer_rule_id, created_at, updated_at
            FROM roles
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    async fn find_role_by_slug(
        &self,
        community_id: Uuid,
        slug: &str,
    ) -> StoreResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            r"
            SELECT id, community_id, name, slug, position, editable, permission_string,
                   is_managed_by_indexer, indexer_rule_id, created_at, updated_at
            FROM roles
            WHERE community_id = $1
              AND slug = $2
            ",
        )
        .bind(community_id)
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    async fn get_roles(&self, ids: &[Uuid]) -> StoreResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            r"
            SELECT id, community_id, name, slug, position, editable, permission_string,
                   is_managed_by_indexer, indexer_rule_id, created_at, updated_at
            FROM roles
            WHERE id = ANY($1)
            ORDER BY position ASC
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    async fn list_roles(&self, community_id: Uuid) -> StoreResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            r"
            SELECT id, community_id, name, slug, position, editable, permission_string,
                   is_managed_by_indexer, indexer_rule_id, created_at, updated_at
            FROM roles
            WHERE community_id = $1
            ORDER BY position ASC
            ",
        )
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    async fn list_indexer_roles(&self, community_id: Uuid) -> StoreResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            r"
            SELECT id, community_id, name, slug, position, editable, permission_string,
                   is_managed_by_indexer, indexer_rule_id, created_at, updated_at
            FROM roles
            WHERE community_id = $1
              AND is_managed_by_indexer = true
              AND editable = true
            ORDER BY position ASC
            ",
        )
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    async fn set_role_permissions(
        &self,
        role_id: Uuid,
        permission_string: Option<PermissionMask>,
    ) -> StoreResult<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            r"
            UPDATE roles
            SET permission_string = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, community_id, name, slug, position, editable, permission_string,
                      is_managed_by_indexer, indexer_rule_id, created_at, updated_at
            ",
        )
        .bind(role_id)
        .bind(permission_string)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    async fn delete_role(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM permission_overwrites WHERE object_type = $1 AND object_type_id = $2",
        )
        .bind(OverwriteTarget::Role)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            UPDATE account_communities
            SET roles = array_remove(roles, $1)
            WHERE $1 = ANY(roles)
            ",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        // Rule and ledger rows go with the role via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Channel overwrites
    // ========================================================================

    async fn list_overwrites(&self, channel_id: Uuid) -> StoreResult<Vec<PermissionOverwrite>> {
        let overwrites = sqlx::query_as::<_, PermissionOverwrite>(
            r"
            SELECT id, community_id, channel_id, object_type, object_type_id, allowed, denied
            FROM permission_overwrites
            WHERE channel_id = $1
            ",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(overwrites)
    }

    async fn upsert_overwrite(&self, new: NewOverwrite) -> StoreResult<PermissionOverwrite> {
        let overwrite = sqlx::query_as::<_, PermissionOverwrite>(
            r"
            INSERT INTO permission_overwrites (id, community_id, channel_id, object_type, object_type_id, allowed, denied)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (channel_id, object_type, object_type_id) DO UPDATE
            SET allowed = EXCLUDED.allowed,
                denied = EXCLUDED.denied
            RETURNING id, community_id, channel_id, object_type, object_type_id, allowed, denied
            ",
        )
        .bind(Uuid::now_v7())
        .bind(new.community_id)
        .bind(new.channel_id)
        .bind(new.object_type)
        .bind(new.object_type_id)
        .bind(new.allowed)
        .bind(new.denied)
        .fetch_one(&self.pool)
        .await?;

        Ok(overwrite)
    }

    async fn delete_overwrite(
        &self,
        channel_id: Uuid,
        object_type: OverwriteTarget,
        object_type_id: Uuid,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r"
            DELETE FROM permission_overwrites
            WHERE channel_id = $1
              AND object_type = $2
              AND object_type_id = $3
            ",
        )
        .bind(channel_id)
        .bind(object_type)
        .bind(object_type_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Memberships
    // ========================================================================

    async fn upsert_membership(
        &self,
        account_id: Uuid,
        community_id: Uuid,
    ) -> StoreResult<Membership> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let membership = sqlx::query_as::<_, Membership>(
            r"
            INSERT INTO account_communities (id, account_id, community_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_id, community_id) DO UPDATE
            SET account_id = EXCLUDED.account_id
            RETURNING id, account_id, community_id, roles, joined_at
            ",
        )
        .bind(Uuid::now_v7())
        .bind(account_id)
        .bind(community_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(membership)
    }

    async fn find_membership(
        &self,
        account_id: Uuid,
        community_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        let membership = sqlx::query_as::<_, Membership>(
            r"
            SELECT id, account_id, community_id, roles, joined_at
            FROM account_communities
            WHERE account_id = $1
              AND community_id = $2
            ",
        )
        .bind(account_id)
        .bind(community_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }

    async fn get_membership(&self, id: Uuid) -> StoreResult<Option<Membership>> {
        let membership = sqlx::query_as::<_, Membership>(
            r"
            SELECT id, account_id, community_id, roles, joined_at
            FROM account_communities
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }

    async fn add_membership_role(&self, membership_id: Uuid, role_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r"
            UPDATE account_communities
            SET roles = array_append(roles, $2)
            WHERE id = $1
              AND NOT ($2 = ANY(roles))
            ",
        )
        .bind(membership_id)
        .bind(role_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_membership_role(
        &self,
        membership_id: Uuid,
        role_id: Uuid,
    ) -> StoreResult<()> {
        sqlx::query(
            r"
            UPDATE account_communities
            SET roles = array_remove(roles, $2)
            WHERE id = $1
            ",
        )
        .bind(membership_id)
        .bind(role_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Ledger
    // ========================================================================

    async fn upsert_ledger_entry(
        &self,
        membership_id: Uuid,
        role_id: Uuid,
        is_managed_by_indexer: bool,
    ) -> StoreResult<LedgerEntry> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r"
            INSERT INTO account_community_roles (id, account_community_id, role_id, is_managed_by_indexer, is_valid)
            VALUES ($1, $2, $3, $4, true)
            ON CONFLICT (account_community_id, role_id) DO UPDATE
            SET is_valid = true,
                is_managed_by_indexer = EXCLUDED.is_managed_by_indexer,
                updated_at = NOW()
            RETURNING id, account_community_id, role_id, is_managed_by_indexer, is_valid, created_at, updated_at
            ",
        )
        .bind(Uuid::now_v7())
        .bind(membership_id)
        .bind(role_id)
        .bind(is_managed_by_indexer)
        .fetch_one(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn find_ledger_entry(
        &self,
        membership_id: Uuid,
        role_id: Uuid,
    ) -> StoreResult<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r"
            SELECT id, account_community_id, role_id, is_managed_by_indexer, is_valid, created_at, updated_at
            FROM account_community_roles
            WHERE account_community_id = $1
              AND role_id = $2
            ",
        )
        .bind(membership_id)
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn list_ledger_entries(&self, membership_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r"
            SELECT id, account_community_id, role_id, is_managed_by_indexer, is_valid, created_at, updated_at
            FROM account_community_roles
            WHERE account_community_id = $1
            ORDER BY created_at ASC
            ",
        )
        .bind(membership_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn set_ledger_flags(
        &self,
        membership_id: Uuid,
        role_id: Uuid,
        is_valid: bool,
        is_managed_by_indexer: bool,
    ) -> StoreResult<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r"
            UPDATE account_community_roles
            SET is_valid = $3,
                is_managed_by_indexer = $4,
                updated_at = NOW()
            WHERE account_community_id = $1
              AND role_id = $2
            RETURNING id, account_community_id, role_id, is_managed_by_indexer, is_valid, created_at, updated_at
            ",
        )
        .bind(membership_id)
        .bind(role_id)
        .bind(is_valid)
        .bind(is_managed_by_indexer)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    // ========================================================================
    // Attestation rules
    // ========================================================================

    async fn insert_rule(
        &self,
        community_id: Uuid,
        role_id: Uuid,
        rule: RuleKind,
    ) -> StoreResult<AttestationRule> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RuleRow>(
            r"
            INSERT INTO indexer_rules (id, community_id, role_id, rule_type, rule_data)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, community_id, role_id, rule_data, created_at
            ",
        )
        .bind(Uuid::now_v7())
        .bind(community_id)
        .bind(role_id)
        .bind(rule.rule_type())
        .bind(Json(&rule))
        .fetch_one(&mut *tx)
        .await?;

        let updated = sqlx::query(
            r"
            UPDATE roles
            SET indexer_rule_id = $2,
                is_managed_by_indexer = true,
                updated_at = NOW()
            WHERE id = $1
              AND community_id = $3
            ",
        )
        .bind(role_id)
        .bind(row.id)
        .bind(community_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::MissingReference("roles".into()));
        }

        tx.commit().await?;
        Ok(row.into())
    }

    async fn get_rule(&self, id: Uuid) -> StoreResult<Option<AttestationRule>> {
        let row = sqlx::query_as::<_, RuleRow>(
            r"
            SELECT id, community_id, role_id, rule_data, created_at
            FROM indexer_rules
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_rule_for_role(&self, role_id: Uuid) -> StoreResult<Option<AttestationRule>> {
        let row = sqlx::query_as::<_, RuleRow>(
            r"
            SELECT id, community_id, role_id, rule_data, created_at
            FROM indexer_rules
            WHERE role_id = $1
            ",
        )
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn delete_rule(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            UPDATE roles
            SET indexer_rule_id = NULL,
                updated_at = NOW()
            WHERE indexer_rule_id = $1
            ",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM indexer_rules WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
