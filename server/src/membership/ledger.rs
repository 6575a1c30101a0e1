//! Ledger mutations: attested claims, administrative grants and revocations,
//! and automated re-synchronization.
//!
//! Re-synchronization only touches entries with `is_managed_by_indexer` set.
//! Administrative grants and revocations clear that flag, so an explicit
//! decision is never overridden by attestation.

use std::collections::HashSet;

use tracing::{debug, info};
use uuid::Uuid;

use super::models::{LedgerEntry, SyncReport};
use crate::attestation::AttestationEvaluator;
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::permissions::{Actor, Role};
use crate::store::Store;

/// Claim a role through its attestation rule.
///
/// Fails with `AttestationDenied` when the actor does not qualify. The entry
/// is created or re-validated, with the managed flag copied from the role
/// unless `managed_override` says otherwise.
#[tracing::instrument(skip(evaluator, actor), fields(account_id = %actor.account_id))]
pub async fn claim(
    evaluator: &AttestationEvaluator,
    actor: &Actor,
    role_id: Uuid,
    managed_override: Option<bool>,
) -> EngineResult<LedgerEntry> {
    let store = evaluator.store();
    let role = store
        .get_role(role_id)
        .await?
        .ok_or(ValidationError::UnknownRole(role_id))?;

    if !evaluator.can_claim(&role, actor).await {
        return Err(EngineError::AttestationDenied { role_id });
    }

    let managed = managed_override.unwrap_or(role.is_managed_by_indexer);
    let entry = record(store, actor.account_id, &role, managed).await?;

    info!(role_id = %role_id, entry_id = %entry.id, "Role claimed");
    Ok(entry)
}

/// Grant a role by hand, without attestation.
///
/// The entry is not indexer-managed unless `managed_override` is `Some(true)`.
#[tracing::instrument(skip(store))]
pub async fn grant(
    store: &dyn Store,
    account_id: Uuid,
    role_id: Uuid,
    managed_override: Option<bool>,
) -> EngineResult<LedgerEntry> {
    let role = store
        .get_role(role_id)
        .await?
        .ok_or(ValidationError::UnknownRole(role_id))?;

    let entry = record(store, account_id, &role, managed_override.unwrap_or(false)).await?;

    info!(role_id = %role_id, entry_id = %entry.id, "Role granted");
    Ok(entry)
}

/// Find-or-create the membership, upsert the entry, list the role on the membership.
async fn record(
    store: &dyn Store,
    account_id: Uuid,
    role: &Role,
    managed: bool,
) -> EngineResult<LedgerEntry> {
    let membership = store.upsert_membership(account_id, role.community_id).await?;
    let entry = store
        .upsert_ledger_entry(membership.id, role.id, managed)
        .await?;
    store.add_membership_role(membership.id, role.id).await?;
    Ok(entry)
}

/// Revoke a role from a membership.
///
/// The entry is kept but marked invalid and no longer indexer-managed, so a
/// later re-synchronization will not grant the role again.
#[tracing::instrument(skip(store))]
pub async fn revoke(
    store: &dyn Store,
    membership_id: Uuid,
    role_id: Uuid,
) -> EngineResult<LedgerEntry> {
    if store.get_membership(membership_id).await?.is_none() {
        return Err(ValidationError::UnknownMembership(membership_id).into());
    }

    let entry = store
        .set_ledger_flags(membership_id, role_id, false, false)
        .await?
        .ok_or(ValidationError::UnknownLedgerEntry {
            membership_id,
            role_id,
        })?;
    store.remove_membership_role(membership_id, role_id).await?;

    info!(role_id = %role_id, membership_id = %membership_id, "Role revoked");
    Ok(entry)
}

/// Bring an actor's indexer-managed entries in line with current attestations.
///
/// - qualifying role, no entry or an invalid managed entry: claimed
/// - qualifying role, entry not managed by the indexer: skipped
/// - valid managed entry for a role that no longer qualifies: retracted
#[tracing::instrument(skip(evaluator, actor), fields(account_id = %actor.account_id))]
pub async fn resync(
    evaluator: &AttestationEvaluator,
    actor: &Actor,
    community_id: Uuid,
) -> EngineResult<SyncReport> {
    let store = evaluator.store();
    let candidates = store.list_indexer_roles(community_id).await?;
    let qualifying = evaluator.refresh(actor, community_id).await?;
    let qualifying_ids: HashSet<Uuid> = qualifying.iter().map(|r| r.id).collect();

    let mut report = SyncReport::default();
    let membership = store.find_membership(actor.account_id, community_id).await?;

    for role in &qualifying {
        let existing = match &membership {
            Some(m) => store.find_ledger_entry(m.id, role.id).await?,
            None => None,
        };

        match existing {
            Some(entry) if !entry.is_managed_by_indexer => report.skipped.push(role.id),
            Some(entry) if entry.is_valid => {}
            _ => report
                .claimed
                .push(record(store, actor.account_id, role, true).await?),
        }
    }

    if let Some(membership) = &membership {
        for role in candidates.iter().filter(|r| !qualifying_ids.contains(&r.id)) {
            let Some(entry) = store.find_ledger_entry(membership.id, role.id).await? else {
                continue;
            };
            if !(entry.is_valid && entry.is_managed_by_indexer) {
                continue;
            }

            let retracted = store
                .set_ledger_flags(membership.id, role.id, false, true)
                .await?;
            store.remove_membership_role(membership.id, role.id).await?;
            report.retracted.extend(retracted);
        }
    }

    debug!(
        claimed = report.claimed.len(),
        retracted = report.retracted.len(),
        skipped = report.skipped.len(),
        "Membership resynced"
    );
    Ok(report)
}
