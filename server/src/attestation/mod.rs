//! Attestation evaluation for indexer-managed roles.
//!
//! An attestation rule decides whether an actor currently qualifies for a
//! role. Evaluation always fails closed: a timeout, transport failure or
//! malformed answer from an external service means "does not qualify".

mod evaluator;
mod identity;
mod oracle;
mod registry;
mod rules;
pub mod ssrf;
mod webhook;

pub use evaluator::{AttestationEvaluator, AttestationTimeouts};
pub use identity::{HttpIdentityResolver, IdentityResolver, Profile};
pub use oracle::{HttpTokenOracle, TokenOracle};
pub use registry::{create_rule, delete_rule, rule_for_role};
pub use rules::{AttestationRule, RuleKind, RuleType};
pub use webhook::WebhookVerifier;

/// Failure talking to an attestation collaborator.
///
/// Never leaves the evaluator; it is logged and turned into `false`.
#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("callback target refused: {0}")]
    Blocked(String),

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl From<reqwest::Error> for AttestationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout("HTTP request")
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
