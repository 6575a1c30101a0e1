//! Membership ledger.
//!
//! Records which account holds which role in which community. Entries are
//! soft-revoked (`is_valid = false`) rather than deleted.

mod ledger;
mod models;

pub use ledger::{claim, grant, resync, revoke};
pub use models::{LedgerEntry, Membership, SyncReport};
