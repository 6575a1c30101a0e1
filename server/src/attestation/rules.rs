//! Attestation rule types.
//!
//! The set of rule types is closed: every evaluator matches on [`RuleKind`]
//! exhaustively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Stored discriminant of a rule, mirrors the [`RuleKind`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "indexer_rule_type", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleType {
    Nft,
    Allowlist,
    Api,
    Public,
    Farcaster,
}

impl RuleType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nft => "NFT",
            Self::Allowlist => "ALLOWLIST",
            Self::Api => "API",
            Self::Public => "PUBLIC",
            Self::Farcaster => "FARCASTER",
        }
    }
}

/// Condition an actor must meet to hold an indexer-managed role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum RuleKind {
    /// Actor holds at least one token of a contract.
    Nft {
        contract_address: String,
        chain_id: i64,
    },
    /// Actor address is on a static list, compared case-insensitively.
    Allowlist { addresses: Vec<String> },
    /// Callback answers `{"success": true}` for the actor address.
    Api { uri: String },
    /// Everyone qualifies.
    Public,
    /// Actor address resolves to a linked social identity.
    Farcaster,
}

impl RuleKind {
    #[must_use]
    pub const fn rule_type(&self) -> RuleType {
        match self {
            Self::Nft { .. } => RuleType::Nft,
            Self::Allowlist { .. } => RuleType::Allowlist,
            Self::Api { .. } => RuleType::Api,
            Self::Public => RuleType::Public,
            Self::Farcaster => RuleType::Farcaster,
        }
    }

    /// Check the payload before it is stored.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Nft {
                contract_address, ..
            } => {
                if contract_address.trim().is_empty() {
                    return Err(ValidationError::InvalidRule(
                        "NFT rule needs a contract address".into(),
                    ));
                }
            }
            Self::Allowlist { addresses } => {
                if addresses.iter().all(|a| a.trim().is_empty()) {
                    return Err(ValidationError::InvalidRule(
                        "ALLOWLIST rule needs at least one address".into(),
                    ));
                }
            }
            Self::Api { uri } => {
                let parsed = reqwest::Url::parse(uri)
                    .map_err(|e| ValidationError::InvalidRule(format!("invalid callback URI: {e}")))?;
                if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
                    return Err(ValidationError::InvalidRule(
                        "callback URI must be an absolute http(s) URL".into(),
                    ));
                }
            }
            Self::Public | Self::Farcaster => {}
        }
        Ok(())
    }
}

/// Rule attached to exactly one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRule {
    pub id: Uuid,
    pub community_id: Uuid,
    pub role_id: Uuid,
    pub rule: RuleKind,
    pub created_at: DateTime<Utc>,
}

impl AttestationRule {
    #[must_use]
    pub const fn rule_type(&self) -> RuleType {
        self.rule.rule_type()
    }
}
