//! Membership ledger models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One account's membership in one community.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    pub id: Uuid,
    pub account_id: Uuid,
    pub community_id: Uuid,
    /// Role ids granted through this membership, in grant order.
    pub roles: Vec<Uuid>,
    pub joined_at: DateTime<Utc>,
}

/// Link between a membership and one role.
///
/// At most one entry exists per `(account_community_id, role_id)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_community_id: Uuid,
    pub role_id: Uuid,
    /// Automated re-synchronization only touches entries with this flag set.
    pub is_managed_by_indexer: bool,
    /// Soft revocation: `false` keeps the row but removes its effect.
    pub is_valid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one automated re-synchronization pass.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries created or re-validated.
    pub claimed: Vec<LedgerEntry>,
    /// Entries invalidated because the attestation lapsed.
    pub retracted: Vec<LedgerEntry>,
    /// Qualifying roles left alone because an administrator manages them.
    pub skipped: Vec<Uuid>,
}
