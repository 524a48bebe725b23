//! Main Escrow Node - high-level API for the escrow ledger
//!
//! This module wires the authorization context, the escrow manager, and the
//! external fact sources behind one constructor and a delegating API, so a
//! host embeds a single handle.

use crate::{
    LedgerResult,
    auth_context::AuthContext,
    collaborators::{
        ContractorSource, InspectionSource, MemoryContractors, MemoryInspections,
        MemoryMilestones, MilestoneSource,
    },
    escrow_manager::{
        AddPaymentRequest, CreateEscrowRequest, EscrowAudit, EscrowManager, EscrowManagerConfig,
    },
    models::{Escrow, EscrowStatus, LedgerEvent, Payment},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Configuration for the escrow node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscrowNodeConfig {
    /// Escrow manager configuration
    pub manager: EscrowManagerConfig,
}

impl EscrowNodeConfig {
    /// Load configuration from the environment on top of defaults
    ///
    /// Variables use the `ESCROW` prefix with `__` as the section separator,
    /// e.g. `ESCROW__MANAGER__REQUIRE_VERIFIED_MILESTONE=true`.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(
                config::Environment::with_prefix("ESCROW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Bundle of in-memory fact sources for tests and standalone embedding
#[derive(Clone, Default)]
pub struct MemorySources {
    pub milestones: MemoryMilestones,
    pub inspections: MemoryInspections,
    pub contractors: MemoryContractors,
}

/// Main escrow node coordinating all components
pub struct EscrowNode {
    /// Authorization context holding the admin principal
    auth: Arc<AuthContext>,
    /// Escrow/payment state machine
    manager: Arc<EscrowManager>,
}

impl EscrowNode {
    /// Create a new node with the deployer as initial admin
    pub fn new(
        config: EscrowNodeConfig,
        initial_admin: &str,
        milestones: Arc<dyn MilestoneSource>,
        inspections: Arc<dyn InspectionSource>,
        contractors: Arc<dyn ContractorSource>,
    ) -> Self {
        info!("Initializing escrow node (admin: {})", initial_admin);

        let auth = Arc::new(AuthContext::new(initial_admin));
        let manager = Arc::new(EscrowManager::new(
            config.manager,
            auth.clone(),
            milestones,
            inspections,
            contractors,
        ));

        Self { auth, manager }
    }

    /// Create a node backed by in-memory fact sources
    ///
    /// Returns the sources alongside the node so the embedder can feed facts.
    pub fn with_memory_sources(
        config: EscrowNodeConfig,
        initial_admin: &str,
    ) -> (Self, MemorySources) {
        let sources = MemorySources::default();
        let node = Self::new(
            config,
            initial_admin,
            Arc::new(sources.milestones.clone()),
            Arc::new(sources.inspections.clone()),
            Arc::new(sources.contractors.clone()),
        );
        (node, sources)
    }

    /// Get the current admin principal
    pub async fn admin(&self) -> String {
        self.auth.admin().await
    }

    /// Transfer admin rights to a new principal
    pub async fn transfer_admin(&self, caller: &str, new_admin: &str) -> LedgerResult<()> {
        let previous = self.auth.admin().await;
        self.auth.transfer_admin(caller, new_admin).await?;
        self.manager.record_admin_transfer(&previous, new_admin).await;
        Ok(())
    }

    /// Create a new escrow with the caller as client
    pub async fn create_escrow(
        &self,
        caller: &str,
        request: CreateEscrowRequest,
    ) -> LedgerResult<Escrow> {
        self.manager.create_escrow(caller, request).await
    }

    /// Get an escrow by id
    pub async fn get_escrow(&self, escrow_id: &str) -> Option<Escrow> {
        self.manager.get_escrow(escrow_id).await
    }

    /// Close an active escrow
    pub async fn close_escrow(&self, caller: &str, escrow_id: &str) -> LedgerResult<Escrow> {
        self.manager.close_escrow(caller, escrow_id).await
    }

    /// Raise a dispute on an active escrow
    pub async fn dispute_escrow(&self, caller: &str, escrow_id: &str) -> LedgerResult<Escrow> {
        self.manager.dispute_escrow(caller, escrow_id).await
    }

    /// Resolve a disputed escrow to an admin-chosen status
    pub async fn resolve_dispute(
        &self,
        caller: &str,
        escrow_id: &str,
        new_status: EscrowStatus,
    ) -> LedgerResult<Escrow> {
        self.manager.resolve_dispute(caller, escrow_id, new_status).await
    }

    /// Add a pending payment to an active escrow
    pub async fn add_payment(
        &self,
        caller: &str,
        request: AddPaymentRequest,
    ) -> LedgerResult<Payment> {
        self.manager.add_payment(caller, request).await
    }

    /// Get a payment by key
    pub async fn get_payment(&self, escrow_id: &str, payment_id: &str) -> Option<Payment> {
        self.manager.get_payment(escrow_id, payment_id).await
    }

    /// Release a pending payment to the contractor
    pub async fn release_payment(
        &self,
        caller: &str,
        escrow_id: &str,
        payment_id: &str,
    ) -> LedgerResult<Payment> {
        self.manager.release_payment(caller, escrow_id, payment_id).await
    }

    /// Re-verify the derived-sum invariant for one escrow
    pub async fn audit_escrow(&self, escrow_id: &str) -> LedgerResult<EscrowAudit> {
        self.manager.audit_escrow(escrow_id).await
    }

    /// Get all escrows where the principal is a party
    pub async fn get_escrows_for_principal(&self, principal: &str) -> Vec<Escrow> {
        self.manager.get_escrows_for_principal(principal).await
    }

    /// Get all payments belonging to an escrow
    pub async fn get_payments_for_escrow(&self, escrow_id: &str) -> Vec<Payment> {
        self.manager.get_payments_for_escrow(escrow_id).await
    }

    /// Get the full audit trail
    pub async fn get_events(&self) -> Vec<LedgerEvent> {
        self.manager.get_events().await
    }

    /// Get audit events for an escrow
    pub async fn get_escrow_events(&self, escrow_id: &str) -> Vec<LedgerEvent> {
        self.manager.get_escrow_events(escrow_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EscrowNodeConfig::default();
        assert!(!config.manager.require_verified_milestone);
        assert!(!config.manager.require_passed_inspection);
        assert!(!config.manager.require_verified_contractor);
    }

    #[test]
    fn test_config_from_env_without_overrides() {
        let config = EscrowNodeConfig::from_env().unwrap();
        assert!(!config.manager.require_verified_milestone);
    }

    #[tokio::test]
    async fn test_transfer_admin_records_event_and_hands_over_rights() {
        let (node, _sources) =
            EscrowNode::with_memory_sources(EscrowNodeConfig::default(), "deployer");

        node.create_escrow(
            "c1",
            CreateEscrowRequest {
                escrow_id: "e1".to_string(),
                project_id: "p1".to_string(),
                contractor: "c2".to_string(),
                total_amount: 10_000,
            },
        )
        .await
        .unwrap();

        node.transfer_admin("deployer", "ops").await.unwrap();
        assert_eq!(node.admin().await, "ops");

        let events = node.get_events().await;
        assert!(events.iter().any(|e| e.event_type == "admin.transferred"));

        // New admin holds override rights now
        let closed = node.close_escrow("ops", "e1").await.unwrap();
        assert_eq!(closed.status, EscrowStatus::Closed);
    }
}
