//! Rolegate Server
//!
//! Role resolution and dynamic membership for token-gated communities:
//! per-community permission bitmasks, channel overwrites, and roles whose
//! membership follows external attestations.

pub mod api;
pub mod attestation;
pub mod config;
pub mod db;
pub mod error;
pub mod membership;
pub mod permissions;
pub mod store;
