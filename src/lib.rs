//! Deterministic escrow and payment ledger for milestone-based project funding
//!
//! This crate implements the accounting core that holds project funds between
//! a client and a contractor and releases them against milestone payments:
//! - Keyed escrow and payment stores with a strict status state machine
//! - Multi-party authorization (client, contractor, admin) per transition
//! - Monetary invariants enforced on every path (released never exceeds total)
//! - An append-only event log for audit ordering

pub mod auth_context;
pub mod collaborators;
pub mod error;
pub mod escrow_manager;
pub mod models;
pub mod node;

use error::LedgerError;

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
