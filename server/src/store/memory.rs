//! In-process store.
//!
//! Each operation runs under one write (or read) lock, which gives the same
//! atomicity as the single-statement upserts of the `PostgreSQL` store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{constraint, Store, StoreError, StoreResult};
use crate::attestation::{AttestationRule, RuleKind};
use crate::membership::{LedgerEntry, Membership};
use crate::permissions::{
    is_set, NewOverwrite, NewPermission, NewRole, OverwriteTarget, Permission, PermissionMask,
    PermissionOverwrite, Role,
};

#[derive(Debug, Default)]
struct Tables {
    permissions: HashMap<Uuid, Permission>,
    roles: HashMap<Uuid, Role>,
    overwrites: HashMap<Uuid, PermissionOverwrite>,
    memberships: HashMap<Uuid, Membership>,
    ledger: HashMap<Uuid, LedgerEntry>,
    rules: HashMap<Uuid, AttestationRule>,
}

impl Tables {
    fn ledger_entry_mut(&mut self, membership_id: Uuid, role_id: Uuid) -> Option<&mut LedgerEntry> {
        self.ledger
            .values_mut()
            .find(|e| e.account_community_id == membership_id && e.role_id == role_id)
    }
}

/// Store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(key);
    items
}

#[async_trait]
impl Store for MemoryStore {
    // ========================================================================
    // Permissions
    // ========================================================================

    async fn insert_permission(&self, new: NewPermission) -> StoreResult<Permission> {
        let mut tables = self.tables.write().await;

        let same_community = tables
            .permissions
            .values()
            .filter(|p| p.community_id == new.community_id);
        for existing in same_community {
            if new.unique_identifier.is_some()
                && existing.unique_identifier == new.unique_identifier
            {
                return Err(StoreError::Conflict(
                    constraint::PERMISSION_IDENTIFIER.into(),
                ));
            }
            if existing.bit_position == new.bit_position {
                return Err(StoreError::Conflict(constraint::PERMISSION_POSITION.into()));
            }
        }

        let permission = Permission {
            id: Uuid::now_v7(),
            community_id: new.community_id,
            name: new.name,
            unique_identifier: new.unique_identifier,
            editable: new.editable,
            bit_position: new.bit_position,
            bit_flag: PermissionMask::flag(new.bit_position).unwrap_or_default(),
            created_at: Utc::now(),
        };
        tables.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn get_permission(&self, id: Uuid) -> StoreResult<Option<Permission>> {
        Ok(self.tables.read().await.permissions.get(&id).cloned())
    }

    async fn find_permission_by_identifier(
        &self,
        community_id: Uuid,
        identifier: &str,
    ) -> StoreResult<Option<Permission>> {
        let tables = self.tables.read().await;
        Ok(tables
            .permissions
            .values()
            .find(|p| {
                p.community_id == community_id
                    && p.unique_identifier.as_deref() == Some(identifier)
            })
            .cloned())
    }

    async fn get_permissions(&self, ids: &[Uuid]) -> StoreResult<Vec<Permission>> {
        let tables = self.tables.read().await;
        let found = ids
            .iter()
            .filter_map(|id| tables.permissions.get(id).cloned())
            .collect();
        Ok(sorted_by(found, |p: &Permission| p.bit_position))
    }

    async fn list_permissions(&self, community_id: Uuid) -> StoreResult<Vec<Permission>> {
        let tables = self.tables.read().await;
        let found = tables
            .permissions
            .values()
            .filter(|p| p.community_id == community_id)
            .cloned()
            .collect();
        Ok(sorted_by(found, |p: &Permission| p.bit_position))
    }

    async fn delete_permission(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(permission) = tables.permissions.remove(&id) else {
            return Ok(false);
        };

        // The freed position may be reused; nothing may keep granting it.
        let flag = permission.bit_flag;
        let strip = |mask: &mut Option<PermissionMask>| {
            if let Some(m) = mask {
                *m = m.difference(flag);
            }
        };

        for role in tables.roles.values_mut() {
            if role.community_id == permission.community_id
                && is_set(role.permission_string, Some(flag))
            {
                strip(&mut role.permission_string);
                role.updated_at = Utc::now();
            }
        }
        for overwrite in tables.overwrites.values_mut() {
            if overwrite.community_id == permission.community_id {
                strip(&mut overwrite.allowed);
                strip(&mut overwrite.denied);
            }
        }
        Ok(true)
    }

    // ========================================================================
    // Roles
    // ========================================================================

    async fn insert_role(&self, new: NewRole) -> StoreResult<Role> {
        let mut tables = self.tables.write().await;

        let taken = tables
            .roles
            .values()
            .any(|r| r.community_id == new.community_id && r.slug == new.slug);
        if taken {
            return Err(StoreError::Conflict(constraint::ROLE_SLUG.into()));
        }

        let now = Utc::now();
        let role = Role {
            id: Uuid::now_v7(),
            community_id: new.community_id,
            name: new.name,
            slug: new.slug,
            position: new.position,
            editable: new.editable,
            permission_string: new.permission_string,
            is_managed_by_indexer: new.is_managed_by_indexer,
            indexer_rule_id: None,
            created_at: now,
            updated_at: now,
        };
        tables.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn get_role(&self, id: Uuid) -> StoreResult<Option<Role>> {
        Ok(self.tables.read().await.roles.get(&id).cloned())
    }

    async fn find_role_by_slug(
        &self,
        community_id: Uuid,
        slug: &str,
    ) -> StoreResult<Option<Role>> {
        let tables = self.tables.read().await;
        Ok(tables
            .roles
            .values()
            .find(|r| r.community_id == community_id && r.slug == slug)
            .cloned())
    }

    async fn get_roles(&self, ids: &[Uuid]) -> StoreResult<Vec<Role>> {
        let tables = self.tables.read().await;
        let found = ids
            .iter()
            .filter_map(|id| tables.roles.get(id).cloned())
            .collect();
        Ok(sorted_by(found, |r: &Role| r.position))
    }

    async fn list_roles(&self, community_id: Uuid) -> StoreResult<Vec<Role>> {
        let tables = self.tables.read().await;
        let found = tables
            .roles
            .values()
            .filter(|r| r.community_id == community_id)
            .cloned()
            .collect();
        Ok(sorted_by(found, |r: &Role| r.position))
    }

    async fn list_indexer_roles(&self, community_id: Uuid) -> StoreResult<Vec<Role>> {
        let tables = self.tables.read().await;
        let found = tables
            .roles
            .values()
            .filter(|r| r.community_id == community_id && r.is_managed_by_indexer && r.editable)
            .cloned()
            .collect();
        Ok(sorted_by(found, |r: &Role| r.position))
    }

    async fn set_role_permissions(
        &self,
        role_id: Uuid,
        permission_string: Option<PermissionMask>,
    ) -> StoreResult<Option<Role>> {
        let mut tables = self.tables.write().await;
        Ok(tables.roles.get_mut(&role_id).map(|role| {
            role.permission_string = permission_string;
            role.updated_at = Utc::now();
            role.clone()
        }))
    }

    async fn delete_role(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.roles.remove(&id).is_none() {
            return Ok(false);
        }
        tables.rules.retain(|_, rule| rule.role_id != id);
        tables.ledger.retain(|_, entry| entry.role_id != id);
        tables
            .overwrites
            .retain(|_, o| !(o.object_type == OverwriteTarget::Role && o.object_type_id == id));
        for membership in tables.memberships.values_mut() {
            membership.roles.retain(|role_id| *role_id != id);
        }
        Ok(true)
    }

    // ========================================================================
    // Channel overwrites
    // ========================================================================

    async fn list_overwrites(&self, channel_id: Uuid) -> StoreResult<Vec<PermissionOverwrite>> {
        let tables = self.tables.read().await;
        Ok(tables
            .overwrites
            .values()
            .filter(|o| o.channel_id == channel_id)
            .cloned()
            .collect())
    }

    async fn upsert_overwrite(&self, new: NewOverwrite) -> StoreResult<PermissionOverwrite> {
        let mut tables = self.tables.write().await;

        let existing = tables.overwrites.values_mut().find(|o| {
            o.channel_id == new.channel_id
                && o.object_type == new.object_type
                && o.object_type_id == new.object_type_id
        });
        if let Some(existing) = existing {
            existing.allowed = new.allowed;
            existing.denied = new.denied;
            return Ok(existing.clone());
        }

        let overwrite = PermissionOverwrite {
            id: Uuid::now_v7(),
            community_id: new.community_id,
            channel_id: new.channel_id,
            object_type: new.object_type,
            object_type_id: new.object_type_id,
            allowed: new.allowed,
            denied: new.denied,
        };
        tables.overwrites.insert(overwrite.id, overwrite.clone());
        Ok(overwrite)
    }

    async fn delete_overwrite(
        &self,
        channel_id: Uuid,
        object_type: OverwriteTarget,
        object_type_id: Uuid,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.overwrites.len();
        tables.overwrites.retain(|_, o| {
            !(o.channel_id == channel_id
                && o.object_type == object_type
                && o.object_type_id == object_type_id)
        });
        Ok(tables.overwrites.len() < before)
    }

    // ========================================================================
    // Memberships
    // ========================================================================

    async fn upsert_membership(
        &self,
        account_id: Uuid,
        community_id: Uuid,
    ) -> StoreResult<Membership> {
        let mut tables = self.tables.write().await;

        let existing = tables
            .memberships
            .values()
            .find(|m| m.account_id == account_id && m.community_id == community_id);
        if let Some(existing) = existing {
            return Ok(existing.clone());
        }

        let membership = Membership {
            id: Uuid::now_v7(),
            account_id,
            community_id,
            roles: Vec::new(),
            joined_at: Utc::now(),
        };
        tables.memberships.insert(membership.id, membership.clone());
        Ok(membership)
    }

    async fn find_membership(
        &self,
        account_id: Uuid,
        community_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        let tables = self.tables.read().await;
        Ok(tables
            .memberships
            .values()
            .find(|m| m.account_id == account_id && m.community_id == community_id)
            .cloned())
    }

    async fn get_membership(&self, id: Uuid) -> StoreResult<Option<Membership>> {
        Ok(self.tables.read().await.memberships.get(&id).cloned())
    }

    async fn add_membership_role(&self, membership_id: Uuid, role_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(membership) = tables.memberships.get_mut(&membership_id) {
            if !membership.roles.contains(&role_id) {
                membership.roles.push(role_id);
            }
        }
        Ok(())
    }

    async fn remove_membership_role(
        &self,
        membership_id: Uuid,
        role_id: Uuid,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(membership) = tables.memberships.get_mut(&membership_id) {
            membership.roles.retain(|r| *r != role_id);
        }
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
        let mut tables = self.tables.write().await;

        if !tables.memberships.contains_key(&membership_id) {
            return Err(StoreError::MissingReference("account_communities".into()));
        }
        if !tables.roles.contains_key(&role_id) {
            return Err(StoreError::MissingReference("roles".into()));
        }

        if let Some(entry) = tables.ledger_entry_mut(membership_id, role_id) {
            entry.is_valid = true;
            entry.is_managed_by_indexer = is_managed_by_indexer;
            entry.updated_at = Utc::now();
            return Ok(entry.clone());
        }

        let now = Utc::now();
        let entry = LedgerEntry {
            id: Uuid::now_v7(),
            account_community_id: membership_id,
            role_id,
            is_managed_by_indexer,
            is_valid: true,
            created_at: now,
            updated_at: now,
        };
        tables.ledger.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn find_ledger_entry(
        &self,
        membership_id: Uuid,
        role_id: Uuid,
    ) -> StoreResult<Option<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ledger
            .values()
            .find(|e| e.account_community_id == membership_id && e.role_id == role_id)
            .cloned())
    }

    async fn list_ledger_entries(&self, membership_id: Uuid) -> StoreResult<Vec<LedgerEntry>> {
        let tables = self.tables.read().await;
        let found = tables
            .ledger
            .values()
            .filter(|e| e.account_community_id == membership_id)
            .cloned()
            .collect();
        Ok(sorted_by(found, |e: &LedgerEntry| e.created_at))
    }

    async fn set_ledger_flags(
        &self,
        membership_id: Uuid,
        role_id: Uuid,
        is_valid: bool,
        is_managed_by_indexer: bool,
    ) -> StoreResult<Option<LedgerEntry>> {
        let mut tables = self.tables.write().await;
        Ok(tables.ledger_entry_mut(membership_id, role_id).map(|entry| {
            entry.is_valid = is_valid;
            entry.is_managed_by_indexer = is_managed_by_indexer;
            entry.updated_at = Utc::now();
            entry.clone()
        }))
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
        let mut tables = self.tables.write().await;

        if tables.rules.values().any(|r| r.role_id == role_id) {
            return Err(StoreError::Conflict(constraint::RULE_ROLE.into()));
        }

        let attestation = AttestationRule {
            id: Uuid::now_v7(),
            community_id,
            role_id,
            rule,
            created_at: Utc::now(),
        };

        let role = tables
            .roles
            .get_mut(&role_id)
            .filter(|r| r.community_id == community_id)
            .ok_or_else(|| StoreError::MissingReference("roles".into()))?;
        role.indexer_rule_id = Some(attestation.id);
        role.is_managed_by_indexer = true;
        role.updated_at = Utc::now();

        tables.rules.insert(attestation.id, attestation.clone());
        Ok(attestation)
    }

    async fn get_rule(&self, id: Uuid) -> StoreResult<Option<AttestationRule>> {
        Ok(self.tables.read().await.rules.get(&id).cloned())
    }

    async fn find_rule_for_role(&self, role_id: Uuid) -> StoreResult<Option<AttestationRule>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rules
            .values()
            .find(|r| r.role_id == role_id)
            .cloned())
    }

    async fn delete_rule(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(rule) = tables.rules.remove(&id) else {
            return Ok(false);
        };
        if let Some(role) = tables.roles.get_mut(&rule.role_id) {
            if role.indexer_rule_id == Some(id) {
                role.indexer_rule_id = None;
                role.updated_at = Utc::now();
            }
        }
        Ok(true)
    }
}
