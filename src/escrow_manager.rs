//! Escrow Manager - the escrow/payment state machine
//!
//! This module owns the two keyed stores (escrow-by-id and
//! payment-by-(escrow, payment) pair) and implements every state transition
//! with its authorization and monetary invariants. Lock order is escrows
//! first, then payments; `release_payment` holds both write guards across
//! its dual mutation so no reader can observe the stores out of step.

use crate::{
    LedgerResult,
    auth_context::AuthContext,
    collaborators::{ContractorSource, InspectionSource, MilestoneSource},
    error::LedgerError,
    models::{Escrow, EscrowStatus, LedgerEvent, Payment, PaymentStatus},
};
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Configuration for the escrow manager
///
/// The gating flags default to off, which matches the behavior of a ledger
/// that releases on client approval alone; turning them on makes the
/// corresponding external fact a hard precondition.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EscrowManagerConfig {
    /// Require a verified milestone fact before releasing a payment
    pub require_verified_milestone: bool,
    /// Require a passed inspection fact before releasing a payment
    pub require_passed_inspection: bool,
    /// Require a verified contractor fact when creating an escrow
    pub require_verified_contractor: bool,
}

/// Escrow creation request
#[derive(Debug, Clone)]
pub struct CreateEscrowRequest {
    pub escrow_id: String,
    pub project_id: String,
    pub contractor: String,
    pub total_amount: u64,
}

/// Payment creation request
#[derive(Debug, Clone)]
pub struct AddPaymentRequest {
    pub escrow_id: String,
    pub payment_id: String,
    pub milestone_id: String,
    pub inspection_id: Option<String>,
    pub amount: u64,
}

/// Re-verification report for an escrow's derived-sum invariant
#[derive(Debug, Clone, serde::Serialize)]
pub struct EscrowAudit {
    pub escrow_id: String,
    pub status: EscrowStatus,
    pub total_amount: u64,
    pub released_amount: u64,
    /// Sum of `amount` over this escrow's Released payments
    pub released_sum: u64,
    pub pending_payments: usize,
    pub released_payments: usize,
    /// True when `released_amount` equals `released_sum`
    pub consistent: bool,
}

/// Main escrow manager owning both stores and the audit log
pub struct EscrowManager {
    config: EscrowManagerConfig,
    /// Escrow store (in production, this would be a database table)
    escrows: Arc<RwLock<HashMap<String, Escrow>>>,
    /// Payment store, keyed by (escrow id, payment id)
    payments: Arc<RwLock<HashMap<(String, String), Payment>>>,
    /// Append-only audit trail
    events: Arc<RwLock<Vec<LedgerEvent>>>,
    /// Monotone sequence stamped on payments at release time
    release_seq: AtomicU64,
    /// Authorization context for admin checks
    auth: Arc<AuthContext>,
    /// Milestone verification facts
    milestones: Arc<dyn MilestoneSource>,
    /// Inspection outcome facts
    inspections: Arc<dyn InspectionSource>,
    /// Contractor verification facts
    contractors: Arc<dyn ContractorSource>,
}

impl EscrowManager {
    /// Create a new escrow manager
    pub fn new(
        config: EscrowManagerConfig,
        auth: Arc<AuthContext>,
        milestones: Arc<dyn MilestoneSource>,
        inspections: Arc<dyn InspectionSource>,
        contractors: Arc<dyn ContractorSource>,
    ) -> Self {
        Self {
            config,
            escrows: Arc::new(RwLock::new(HashMap::new())),
            payments: Arc::new(RwLock::new(HashMap::new())),
            events: Arc::new(RwLock::new(Vec::new())),
            release_seq: AtomicU64::new(0),
            auth,
            milestones,
            inspections,
            contractors,
        }
    }

    /// Create a new escrow with the caller as client
    pub async fn create_escrow(
        &self,
        caller: &str,
        request: CreateEscrowRequest,
    ) -> LedgerResult<Escrow> {
        info!("Creating escrow: {}", request.escrow_id);

        self.validate_create_escrow_request(caller, &request)?;

        if self.config.require_verified_contractor {
            let fact = self.contractors.get_contractor(&request.contractor).await;
            if !fact.is_some_and(|f| f.is_verified) {
                return Err(LedgerError::invalid_argument(format!(
                    "contractor {} is not verified",
                    request.contractor
                )));
            }
        }

        let escrow = {
            let mut escrows = self.escrows.write().await;
            if escrows.contains_key(&request.escrow_id) {
                return Err(LedgerError::already_exists(format!(
                    "escrow {} already exists",
                    request.escrow_id
                )));
            }

            let escrow = Escrow::new(
                request.escrow_id.clone(),
                request.project_id,
                caller.to_string(),
                request.contractor,
                request.total_amount,
            );
            escrows.insert(escrow.id.clone(), escrow.clone());
            escrow
        };

        self.record_event(
            "escrow.created",
            Some(escrow.id.clone()),
            None,
            Some(caller.to_string()),
            Some(escrow.total_amount),
            Some(serde_json::json!({
                "project_id": escrow.project_id,
                "contractor": escrow.contractor,
            })),
        )
        .await;

        info!("Created escrow: {}", escrow.id);

        Ok(escrow)
    }

    /// Get an escrow by id; pure read, no authorization required
    pub async fn get_escrow(&self, escrow_id: &str) -> Option<Escrow> {
        self.escrows.read().await.get(escrow_id).cloned()
    }

    /// Close an active escrow
    ///
    /// Requires the caller to be the escrow's client or the admin. Closed is
    /// terminal; no transition out of it exists.
    pub async fn close_escrow(&self, caller: &str, escrow_id: &str) -> LedgerResult<Escrow> {
        info!("Closing escrow: {}", escrow_id);

        let escrow = {
            let mut escrows = self.escrows.write().await;
            let escrow = escrows
                .get_mut(escrow_id)
                .ok_or_else(|| LedgerError::not_found(format!("escrow {} not found", escrow_id)))?;

            if !escrow.is_client(caller) && !self.auth.is_admin(caller).await {
                return Err(LedgerError::unauthorized(
                    "only the client or admin can close an escrow",
                ));
            }

            if escrow.status != EscrowStatus::Active {
                return Err(LedgerError::invalid_state(format!(
                    "escrow {} is {:?}, only Active escrows can be closed",
                    escrow_id, escrow.status
                )));
            }

            escrow.status = EscrowStatus::Closed;
            escrow.closed_at = Some(Utc::now());
            escrow.updated_at = Utc::now();
            escrow.clone()
        };

        self.record_event(
            "escrow.closed",
            Some(escrow.id.clone()),
            None,
            Some(caller.to_string()),
            None,
            None,
        )
        .await;

        info!("Closed escrow: {}", escrow_id);

        Ok(escrow)
    }

    /// Raise a dispute on an active escrow
    ///
    /// Disputes are raised only by the parties involved; the client or the
    /// contractor qualifies, the admin alone does not.
    pub async fn dispute_escrow(&self, caller: &str, escrow_id: &str) -> LedgerResult<Escrow> {
        info!("Disputing escrow: {}", escrow_id);

        let escrow = {
            let mut escrows = self.escrows.write().await;
            let escrow = escrows
                .get_mut(escrow_id)
                .ok_or_else(|| LedgerError::not_found(format!("escrow {} not found", escrow_id)))?;

            if !escrow.is_client(caller) && !escrow.is_contractor(caller) {
                return Err(LedgerError::unauthorized(
                    "only the client or contractor can raise a dispute",
                ));
            }

            if !escrow.status.can_dispute() {
                return Err(LedgerError::invalid_state(format!(
                    "escrow {} is {:?}, only Active escrows can be disputed",
                    escrow_id, escrow.status
                )));
            }

            escrow.status = EscrowStatus::Disputed;
            escrow.disputed_at = Some(Utc::now());
            escrow.updated_at = Utc::now();
            escrow.clone()
        };

        warn!("Escrow {} disputed by {}", escrow_id, caller);

        self.record_event(
            "escrow.disputed",
            Some(escrow.id.clone()),
            None,
            Some(caller.to_string()),
            None,
            None,
        )
        .await;

        Ok(escrow)
    }

    /// Resolve a disputed escrow to an admin-chosen status
    ///
    /// Admin only. The target status must be Active (resume) or Closed
    /// (terminate); resolving back into Disputed is rejected.
    pub async fn resolve_dispute(
        &self,
        caller: &str,
        escrow_id: &str,
        new_status: EscrowStatus,
    ) -> LedgerResult<Escrow> {
        info!("Resolving dispute on escrow: {}", escrow_id);

        if new_status == EscrowStatus::Disputed {
            return Err(LedgerError::invalid_argument(
                "a dispute cannot be resolved to Disputed",
            ));
        }

        if !self.auth.is_admin(caller).await {
            return Err(LedgerError::unauthorized(
                "only the admin can resolve a dispute",
            ));
        }

        let escrow = {
            let mut escrows = self.escrows.write().await;
            let escrow = escrows
                .get_mut(escrow_id)
                .ok_or_else(|| LedgerError::not_found(format!("escrow {} not found", escrow_id)))?;

            if escrow.status != EscrowStatus::Disputed {
                return Err(LedgerError::invalid_state(format!(
                    "escrow {} is {:?}, only Disputed escrows can be resolved",
                    escrow_id, escrow.status
                )));
            }

            escrow.status = new_status;
            if new_status == EscrowStatus::Closed {
                escrow.closed_at = Some(Utc::now());
            }
            escrow.updated_at = Utc::now();
            escrow.clone()
        };

        self.record_event(
            "escrow.dispute_resolved",
            Some(escrow.id.clone()),
            None,
            Some(caller.to_string()),
            None,
            Some(serde_json::json!({ "new_status": new_status })),
        )
        .await;

        info!("Resolved dispute on escrow {} to {:?}", escrow_id, new_status);

        Ok(escrow)
    }

    /// Add a pending payment to an active escrow
    ///
    /// Requires the caller to be the escrow's client or the admin. Duplicate
    /// (escrow, payment) keys are rejected to keep replayed submissions from
    /// double-funding a milestone.
    pub async fn add_payment(
        &self,
        caller: &str,
        request: AddPaymentRequest,
    ) -> LedgerResult<Payment> {
        info!(
            "Adding payment {} to escrow {}",
            request.payment_id, request.escrow_id
        );

        self.validate_add_payment_request(&request)?;

        let payment = {
            let escrows = self.escrows.read().await;
            let escrow = escrows.get(&request.escrow_id).ok_or_else(|| {
                LedgerError::not_found(format!("escrow {} not found", request.escrow_id))
            })?;

            if !escrow.is_client(caller) && !self.auth.is_admin(caller).await {
                return Err(LedgerError::unauthorized(
                    "only the client or admin can add a payment",
                ));
            }

            if !escrow.status.can_transact() {
                return Err(LedgerError::invalid_state(format!(
                    "escrow {} is {:?}, payments require an Active escrow",
                    request.escrow_id, escrow.status
                )));
            }

            let key = (request.escrow_id.clone(), request.payment_id.clone());
            let mut payments = self.payments.write().await;
            if payments.contains_key(&key) {
                return Err(LedgerError::already_exists(format!(
                    "payment {} already exists on escrow {}",
                    request.payment_id, request.escrow_id
                )));
            }

            let payment = Payment::new(
                request.payment_id,
                request.escrow_id,
                request.milestone_id,
                request.inspection_id,
                request.amount,
            );
            payments.insert(key, payment.clone());
            payment
        };

        self.record_event(
            "payment.added",
            Some(payment.escrow_id.clone()),
            Some(payment.id.clone()),
            Some(caller.to_string()),
            Some(payment.amount),
            Some(serde_json::json!({ "milestone_id": payment.milestone_id })),
        )
        .await;

        info!("Added payment {} to escrow {}", payment.id, payment.escrow_id);

        Ok(payment)
    }

    /// Get a payment by key; pure read, no authorization required
    pub async fn get_payment(&self, escrow_id: &str, payment_id: &str) -> Option<Payment> {
        self.payments
            .read()
            .await
            .get(&(escrow_id.to_string(), payment_id.to_string()))
            .cloned()
    }

    /// Release a pending payment to the contractor
    ///
    /// Requires the caller to be the escrow's client or the admin, the
    /// escrow Active, and the payment Pending. Sets the payment Released,
    /// stamps its release marker, and increases the escrow's released amount
    /// in the same critical section. A second release attempt fails
    /// `InvalidState` rather than double-counting.
    pub async fn release_payment(
        &self,
        caller: &str,
        escrow_id: &str,
        payment_id: &str,
    ) -> LedgerResult<Payment> {
        info!("Releasing payment {} on escrow {}", payment_id, escrow_id);

        let (payment, released_amount) = {
            let mut escrows = self.escrows.write().await;
            let mut payments = self.payments.write().await;

            let escrow = escrows
                .get_mut(escrow_id)
                .ok_or_else(|| LedgerError::not_found(format!("escrow {} not found", escrow_id)))?;

            if !escrow.is_client(caller) && !self.auth.is_admin(caller).await {
                return Err(LedgerError::unauthorized(
                    "only the client or admin can release a payment",
                ));
            }

            if !escrow.status.can_transact() {
                return Err(LedgerError::invalid_state(format!(
                    "escrow {} is {:?}, releases require an Active escrow",
                    escrow_id, escrow.status
                )));
            }

            let payment = payments
                .get_mut(&(escrow_id.to_string(), payment_id.to_string()))
                .ok_or_else(|| {
                    LedgerError::not_found(format!(
                        "payment {} not found on escrow {}",
                        payment_id, escrow_id
                    ))
                })?;

            if payment.status != PaymentStatus::Pending {
                return Err(LedgerError::invalid_state(format!(
                    "payment {} is {:?}, only Pending payments can be released",
                    payment_id, payment.status
                )));
            }

            let new_released = escrow
                .released_amount
                .checked_add(payment.amount)
                .filter(|total| *total <= escrow.total_amount)
                .ok_or_else(|| {
                    LedgerError::insufficient_funds(format!(
                        "releasing {} would exceed escrow total {} (already released {})",
                        payment.amount, escrow.total_amount, escrow.released_amount
                    ))
                })?;

            self.check_release_facts(escrow, payment).await?;

            let marker = self.release_seq.fetch_add(1, Ordering::SeqCst) + 1;
            payment.status = PaymentStatus::Released;
            payment.release_marker = Some(marker);
            payment.released_at = Some(Utc::now());

            escrow.released_amount = new_released;
            escrow.updated_at = Utc::now();

            (payment.clone(), escrow.released_amount)
        };

        self.record_event(
            "payment.released",
            Some(payment.escrow_id.clone()),
            Some(payment.id.clone()),
            Some(caller.to_string()),
            Some(payment.amount),
            Some(serde_json::json!({
                "release_marker": payment.release_marker,
                "released_amount": released_amount,
            })),
        )
        .await;

        info!(
            "Released payment {} on escrow {} (marker {:?})",
            payment.id, payment.escrow_id, payment.release_marker
        );

        Ok(payment)
    }

    /// Re-verify the derived-sum invariant for one escrow
    pub async fn audit_escrow(&self, escrow_id: &str) -> LedgerResult<EscrowAudit> {
        let escrows = self.escrows.read().await;
        let payments = self.payments.read().await;

        let escrow = escrows
            .get(escrow_id)
            .ok_or_else(|| LedgerError::not_found(format!("escrow {} not found", escrow_id)))?;

        let mut released_sum = 0u64;
        let mut pending_payments = 0usize;
        let mut released_payments = 0usize;
        for payment in payments.values().filter(|p| p.escrow_id == escrow_id) {
            match payment.status {
                PaymentStatus::Released => {
                    released_sum += payment.amount;
                    released_payments += 1;
                }
                PaymentStatus::Pending => pending_payments += 1,
            }
        }

        Ok(EscrowAudit {
            escrow_id: escrow.id.clone(),
            status: escrow.status,
            total_amount: escrow.total_amount,
            released_amount: escrow.released_amount,
            released_sum,
            pending_payments,
            released_payments,
            consistent: escrow.released_amount == released_sum,
        })
    }

    /// Get all escrows where the principal is a party
    pub async fn get_escrows_for_principal(&self, principal: &str) -> Vec<Escrow> {
        let mut escrows: Vec<Escrow> = self
            .escrows
            .read()
            .await
            .values()
            .filter(|e| e.is_client(principal) || e.is_contractor(principal))
            .cloned()
            .collect();
        escrows.sort_by(|a, b| a.id.cmp(&b.id));
        escrows
    }

    /// Get all payments belonging to an escrow, oldest first
    pub async fn get_payments_for_escrow(&self, escrow_id: &str) -> Vec<Payment> {
        let mut payments: Vec<Payment> = self
            .payments
            .read()
            .await
            .values()
            .filter(|p| p.escrow_id == escrow_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        payments
    }

    /// Get the full audit trail, in append order
    pub async fn get_events(&self) -> Vec<LedgerEvent> {
        self.events.read().await.clone()
    }

    /// Get audit events for an escrow, in append order
    pub async fn get_escrow_events(&self, escrow_id: &str) -> Vec<LedgerEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|event| event.escrow_id.as_deref() == Some(escrow_id))
            .cloned()
            .collect()
    }

    /// Record an admin handover on the audit trail
    pub async fn record_admin_transfer(&self, previous: &str, new_admin: &str) {
        self.record_event(
            "admin.transferred",
            None,
            None,
            Some(previous.to_string()),
            None,
            Some(serde_json::json!({ "new_admin": new_admin })),
        )
        .await;
    }

    /// Check external facts gating a release, per configuration
    async fn check_release_facts(&self, escrow: &Escrow, payment: &Payment) -> LedgerResult<()> {
        if self.config.require_verified_milestone {
            let fact = self
                .milestones
                .get_milestone(&escrow.project_id, &payment.milestone_id)
                .await;
            if !fact.is_some_and(|f| f.verified) {
                return Err(LedgerError::invalid_state(format!(
                    "milestone {} is not verified for project {}",
                    payment.milestone_id, escrow.project_id
                )));
            }
        }

        if self.config.require_passed_inspection {
            let inspection_id = payment.inspection_id.as_deref().ok_or_else(|| {
                LedgerError::invalid_state(format!(
                    "payment {} carries no inspection reference",
                    payment.id
                ))
            })?;
            let fact = self
                .inspections
                .get_inspection(&escrow.project_id, inspection_id)
                .await;
            if !fact.is_some_and(|f| f.passed) {
                return Err(LedgerError::invalid_state(format!(
                    "inspection {} has not passed for project {}",
                    inspection_id, escrow.project_id
                )));
            }
        }

        Ok(())
    }

    /// Append an audit event
    async fn record_event(
        &self,
        event_type: &str,
        escrow_id: Option<String>,
        payment_id: Option<String>,
        actor: Option<String>,
        amount: Option<u64>,
        metadata: Option<serde_json::Value>,
    ) {
        let event = LedgerEvent::new(
            event_type.to_string(),
            escrow_id,
            payment_id,
            actor,
            amount,
            metadata,
        );
        self.events.write().await.push(event);
    }

    /// Validate escrow creation inputs
    fn validate_create_escrow_request(
        &self,
        caller: &str,
        request: &CreateEscrowRequest,
    ) -> LedgerResult<()> {
        if caller.trim().is_empty() {
            return Err(LedgerError::invalid_argument("caller cannot be empty"));
        }

        if request.escrow_id.trim().is_empty() {
            return Err(LedgerError::invalid_argument("escrow id cannot be empty"));
        }

        if request.project_id.trim().is_empty() {
            return Err(LedgerError::invalid_argument("project id cannot be empty"));
        }

        if request.contractor.trim().is_empty() {
            return Err(LedgerError::invalid_argument("contractor cannot be empty"));
        }

        Ok(())
    }

    /// Validate payment creation inputs
    fn validate_add_payment_request(&self, request: &AddPaymentRequest) -> LedgerResult<()> {
        if request.escrow_id.trim().is_empty() {
            return Err(LedgerError::invalid_argument("escrow id cannot be empty"));
        }

        if request.payment_id.trim().is_empty() {
            return Err(LedgerError::invalid_argument("payment id cannot be empty"));
        }

        if request.milestone_id.trim().is_empty() {
            return Err(LedgerError::invalid_argument(
                "milestone id cannot be empty",
            ));
        }

        Ok(())
    }
}
