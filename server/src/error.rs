//! Engine error types.
//!
//! Capability checks never produce "not found" errors; they degrade to `false`.
//! Administrative mutations surface these errors to the caller as-is.

use uuid::Uuid;

use crate::store::StoreError;

/// Rejected input or dangling reference.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("bit position {0} is outside 0..=62")]
    BitPositionOutOfRange(i16),

    #[error("bit position {0} is already used in this community")]
    BitPositionTaken(i16),

    #[error("all 63 permission positions are in use")]
    PositionSpaceExhausted,

    #[error("permission identifier '{0}' already exists in this community")]
    DuplicateIdentifier(String),

    #[error("no free slug found for '{0}'")]
    SlugExhausted(String),

    #[error("unknown permission {0}")]
    UnknownPermission(Uuid),

    #[error("unknown role {0}")]
    UnknownRole(Uuid),

    #[error("unknown attestation rule {0}")]
    UnknownRule(Uuid),

    #[error("unknown membership {0}")]
    UnknownMembership(Uuid),

    #[error("membership {membership_id} holds no ledger entry for role {role_id}")]
    UnknownLedgerEntry { membership_id: Uuid, role_id: Uuid },

    #[error("role {0} already has an attestation rule")]
    RuleAlreadyAttached(Uuid),

    #[error("invalid attestation rule: {0}")]
    InvalidRule(String),

    #[error("{0}")]
    Field(String),
}

/// Errors from engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} {id} is not editable")]
    NotEditable { kind: &'static str, id: Uuid },

    #[error("Attestation does not allow claiming role {role_id}")]
    AttestationDenied { role_id: Uuid },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;
