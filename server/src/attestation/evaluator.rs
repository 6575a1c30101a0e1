//! Rule evaluation.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use super::identity::{HttpIdentityResolver, IdentityResolver};
use super::oracle::{HttpTokenOracle, TokenOracle};
use super::rules::RuleKind;
use super::webhook::WebhookVerifier;
use super::AttestationError;
use crate::config::Config;
use crate::permissions::{Actor, Role};
use crate::store::{Store, StoreResult};

/// Upper bound for each kind of outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttestationTimeouts {
    pub oracle: Duration,
    pub webhook: Duration,
    pub identity: Duration,
}

impl Default for AttestationTimeouts {
    fn default() -> Self {
        Self {
            oracle: Duration::from_secs(10),
            webhook: Duration::from_secs(5),
            identity: Duration::from_secs(5),
        }
    }
}

/// Decides whether actors currently qualify for indexer-managed roles.
///
/// Stateless between calls; every decision is made on demand.
#[derive(Clone)]
pub struct AttestationEvaluator {
    store: Arc<dyn Store>,
    oracle: Option<Arc<dyn TokenOracle>>,
    identity: Option<Arc<dyn IdentityResolver>>,
    webhook: WebhookVerifier,
    timeouts: AttestationTimeouts,
}

impl AttestationEvaluator {
    /// Evaluator without token oracle or identity resolver. NFT and FARCASTER
    /// rules never pass until those are attached.
    pub fn new(
        store: Arc<dyn Store>,
        timeouts: AttestationTimeouts,
        allow_private_callbacks: bool,
    ) -> Result<Self, AttestationError> {
        Ok(Self {
            store,
            oracle: None,
            identity: None,
            webhook: WebhookVerifier::new(timeouts.webhook, allow_private_callbacks)?,
            timeouts,
        })
    }

    /// Build from configuration, wiring the HTTP collaborators that are configured.
    pub fn from_config(store: Arc<dyn Store>, config: &Config) -> Result<Self, AttestationError> {
        let timeouts = config.attestation_timeouts();
        let mut evaluator = Self::new(store, timeouts, config.allow_private_callbacks)?;

        if let Some(url) = &config.token_oracle_url {
            evaluator = evaluator.with_token_oracle(Arc::new(HttpTokenOracle::new(url, timeouts.oracle)?));
        }
        if let Some(url) = &config.identity_resolver_url {
            evaluator = evaluator
                .with_identity_resolver(Arc::new(HttpIdentityResolver::new(url, timeouts.identity)?));
        }
        Ok(evaluator)
    }

    #[must_use]
    pub fn with_token_oracle(mut self, oracle: Arc<dyn TokenOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    #[must_use]
    pub fn with_identity_resolver(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = Some(identity);
        self
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Whether `actor` currently qualifies for `role`.
    ///
    /// Roles administered by hand and roles without a rule never qualify.
    /// Every failure along the way is logged and counts as "no".
    #[tracing::instrument(skip(self, role), fields(role_id = %role.id))]
    pub async fn can_claim(&self, role: &Role, actor: &Actor) -> bool {
        if !role.is_managed_by_indexer {
            return false;
        }

        let rule = match self.store.find_rule_for_role(role.id).await {
            Ok(Some(rule)) => rule,
            Ok(None) => {
                debug!("Role has no attestation rule");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load attestation rule");
                return false;
            }
        };

        match self.evaluate(&rule.rule, actor).await {
            Ok(qualifies) => {
                debug!(rule_type = rule.rule_type().as_str(), qualifies, "Rule evaluated");
                qualifies
            }
            Err(e) => {
                warn!(
                    rule_id = %rule.id,
                    rule_type = rule.rule_type().as_str(),
                    address = %actor.address,
                    error = %e,
                    "Attestation check failed, treating as not qualified"
                );
                false
            }
        }
    }

    async fn evaluate(&self, rule: &RuleKind, actor: &Actor) -> Result<bool, AttestationError> {
        match rule {
            RuleKind::Nft {
                contract_address,
                chain_id,
            } => {
                let oracle = self
                    .oracle
                    .as_ref()
                    .ok_or(AttestationError::NotConfigured("token oracle"))?;
                tokio::time::timeout(
                    self.timeouts.oracle,
                    oracle.is_holder(&actor.address, contract_address, *chain_id),
                )
                .await
                .map_err(|_| AttestationError::Timeout("token oracle"))?
            }
            RuleKind::Allowlist { addresses } => Ok(allowlist_contains(addresses, &actor.address)),
            RuleKind::Api { uri } => {
                tokio::time::timeout(self.timeouts.webhook, self.webhook.verify(uri, &actor.address))
                    .await
                    .map_err(|_| AttestationError::Timeout("callback"))?
            }
            RuleKind::Public => Ok(true),
            RuleKind::Farcaster => {
                let identity = self
                    .identity
                    .as_ref()
                    .ok_or(AttestationError::NotConfigured("identity resolver"))?;
                let profile = tokio::time::timeout(
                    self.timeouts.identity,
                    identity.resolve_by_address(&actor.address),
                )
                .await
                .map_err(|_| AttestationError::Timeout("identity resolver"))??;
                Ok(profile.is_some())
            }
        }
    }

    /// Indexer-managed, editable roles of a community the actor qualifies for.
    ///
    /// All roles are evaluated concurrently. Does not touch the ledger; the
    /// order of the result is unspecified.
    #[tracing::instrument(skip(self, actor), fields(account_id = %actor.account_id))]
    pub async fn refresh(&self, actor: &Actor, community_id: Uuid) -> StoreResult<Vec<Role>> {
        let candidates = self.store.list_indexer_roles(community_id).await?;

        let checks = candidates.iter().map(|role| async move {
            let qualifies = self.can_claim(role, actor).await;
            (role, qualifies)
        });
        let qualifying: Vec<Role> = join_all(checks)
            .await
            .into_iter()
            .filter_map(|(role, qualifies)| qualifies.then(|| role.clone()))
            .collect();

        debug!(
            candidates = candidates.len(),
            qualifying = qualifying.len(),
            "Refreshed qualifying roles"
        );
        Ok(qualifying)
    }
}

fn allowlist_contains(addresses: &[String], address: &str) -> bool {
    let address = address.trim();
    !address.is_empty()
        && addresses
            .iter()
            .any(|listed| listed.trim().eq_ignore_ascii_case(address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_is_case_insensitive() {
        let list = vec!["0xAAA".to_string(), " 0xCcC ".to_string()];
        assert!(allowlist_contains(&list, "0xaaa"));
        assert!(allowlist_contains(&list, "0XAAA"));
        assert!(allowlist_contains(&list, "0xccc"));
        assert!(!allowlist_contains(&list, "0xBBB"));
        assert!(!allowlist_contains(&[String::new()], ""));
    }

    #[test]
    fn test_default_timeouts_are_bounded() {
        let timeouts = AttestationTimeouts::default();
        assert!(timeouts.oracle <= Duration::from_secs(15));
        assert!(timeouts.webhook <= Duration::from_secs(15));
        assert!(timeouts.identity <= Duration::from_secs(15));
    }
}
