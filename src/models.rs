//! Core data models for the escrow ledger
//!
//! This module contains the escrow and payment records, their status state
//! machines, and the audit event record. Records are value types keyed by
//! opaque string identifiers; the stores that own them live in
//! [`crate::escrow_manager`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Escrow state machine enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// Funds held, payments may be added and released
    Active,
    /// A party raised a dispute; frozen until admin resolution
    Disputed,
    /// Escrow closed, immutable history
    Closed,
}

impl EscrowStatus {
    /// Check if this is a terminal state (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if this state allows adding or releasing payments
    pub fn can_transact(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if this state allows raising a dispute
    pub fn can_dispute(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Payment status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Allocated against a milestone, funds not yet released
    Pending,
    /// Funds released to the contractor
    Released,
}

impl PaymentStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released)
    }
}

/// Escrow record holding the agreed fund amount between client and contractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escrow {
    pub id: String,
    /// Reference to an external project record, not validated here
    pub project_id: String,

    // Parties, immutable after creation
    pub client: String,
    pub contractor: String,

    // Amounts; released_amount never exceeds total_amount
    pub total_amount: u64,
    pub released_amount: u64,

    pub status: EscrowStatus,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Escrow {
    /// Create a new active escrow with nothing released yet
    pub fn new(
        id: String,
        project_id: String,
        client: String,
        contractor: String,
        total_amount: u64,
    ) -> Self {
        Self {
            id,
            project_id,
            client,
            contractor,
            total_amount,
            released_amount: 0,
            status: EscrowStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            disputed_at: None,
            closed_at: None,
        }
    }

    /// Check if the caller is the escrow's client
    pub fn is_client(&self, caller: &str) -> bool {
        self.client == caller
    }

    /// Check if the caller is the escrow's contractor
    pub fn is_contractor(&self, caller: &str) -> bool {
        self.contractor == caller
    }

    /// Funds still held in escrow
    pub fn remaining_amount(&self) -> u64 {
        self.total_amount - self.released_amount
    }
}

/// Payment record, a sub-allocation of an escrow's funds tied to one milestone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub escrow_id: String,

    /// Opaque reference into the external milestone registry
    pub milestone_id: String,
    /// Optional reference into the external inspection log
    pub inspection_id: Option<String>,

    /// Fixed at creation
    pub amount: u64,

    pub status: PaymentStatus,
    /// Ordering token stamped once at release time, for audit ordering
    pub release_marker: Option<u64>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Create a new pending payment
    pub fn new(
        id: String,
        escrow_id: String,
        milestone_id: String,
        inspection_id: Option<String>,
        amount: u64,
    ) -> Self {
        Self {
            id,
            escrow_id,
            milestone_id,
            inspection_id,
            amount,
            status: PaymentStatus::Pending,
            release_marker: None,
            created_at: Utc::now(),
            released_at: None,
        }
    }
}

/// Ledger event for the audit trail
///
/// Events are append-only observations; transition logic never reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub id: Uuid,
    pub event_type: String,

    // References
    pub escrow_id: Option<String>,
    pub payment_id: Option<String>,

    // Actor
    pub actor: Option<String>,

    // Event data
    pub amount: Option<u64>,
    pub metadata: Option<serde_json::Value>,

    // Timestamp (immutable)
    pub created_at: DateTime<Utc>,
}

impl LedgerEvent {
    /// Create a new audit event stamped with the current time
    pub fn new(
        event_type: String,
        escrow_id: Option<String>,
        payment_id: Option<String>,
        actor: Option<String>,
        amount: Option<u64>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            escrow_id,
            payment_id,
            actor,
            amount,
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_escrow_starts_active_and_unreleased() {
        let escrow = Escrow::new(
            "e1".to_string(),
            "p1".to_string(),
            "client".to_string(),
            "contractor".to_string(),
            100_000,
        );

        assert_eq!(escrow.status, EscrowStatus::Active);
        assert_eq!(escrow.released_amount, 0);
        assert_eq!(escrow.remaining_amount(), 100_000);
        assert!(escrow.is_client("client"));
        assert!(escrow.is_contractor("contractor"));
        assert!(!escrow.is_client("contractor"));
    }

    #[test]
    fn test_status_predicates() {
        assert!(EscrowStatus::Active.can_transact());
        assert!(EscrowStatus::Active.can_dispute());
        assert!(!EscrowStatus::Disputed.can_transact());
        assert!(!EscrowStatus::Closed.can_transact());
        assert!(EscrowStatus::Closed.is_terminal());
        assert!(!EscrowStatus::Disputed.is_terminal());

        assert!(PaymentStatus::Released.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
    }

    #[test]
    fn test_new_payment_is_pending_and_unmarked() {
        let payment = Payment::new(
            "pay1".to_string(),
            "e1".to_string(),
            "m1".to_string(),
            None,
            20_000,
        );

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.release_marker.is_none());
        assert!(payment.released_at.is_none());
    }
}
