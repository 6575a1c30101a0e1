//! Attaching and removing attestation rules.

use tracing::info;
use uuid::Uuid;

use super::rules::{AttestationRule, RuleKind};
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::permissions::get_community_role;
use crate::store::{constraint, Store, StoreError};

/// Attach a rule to an editable role and make the role indexer-managed.
///
/// A role carries at most one rule; a second one is rejected.
#[tracing::instrument(skip(store))]
pub async fn create_rule(
    store: &dyn Store,
    community_id: Uuid,
    role_id: Uuid,
    rule: RuleKind,
) -> EngineResult<AttestationRule> {
    rule.validate()?;

    let role = get_community_role(store, community_id, role_id).await?;
    if !role.editable {
        return Err(EngineError::NotEditable {
            kind: "role",
            id: role_id,
        });
    }

    let created = store
        .insert_rule(community_id, role_id, rule)
        .await
        .map_err(|e| match e {
            e if e.is_conflict_on(constraint::RULE_ROLE) => {
                ValidationError::RuleAlreadyAttached(role_id).into()
            }
            StoreError::MissingReference(_) => ValidationError::UnknownRole(role_id).into(),
            other => EngineError::from(other),
        })?;

    info!(
        rule_id = %created.id,
        role_id = %role_id,
        rule_type = created.rule_type().as_str(),
        "Attestation rule attached"
    );
    Ok(created)
}

/// The rule attached to a role, if any.
pub async fn rule_for_role(store: &dyn Store, role_id: Uuid) -> EngineResult<Option<AttestationRule>> {
    Ok(store.find_rule_for_role(role_id).await?)
}

/// Delete a rule and clear its role's reference to it.
///
/// The role stays indexer-managed; without a rule nobody qualifies for it.
#[tracing::instrument(skip(store))]
pub async fn delete_rule(store: &dyn Store, rule_id: Uuid) -> EngineResult<()> {
    if !store.delete_rule(rule_id).await? {
        return Err(ValidationError::UnknownRule(rule_id).into());
    }
    info!(rule_id = %rule_id, "Attestation rule deleted");
    Ok(())
}
