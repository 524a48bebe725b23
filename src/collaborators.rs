//! External collaborator fact sources
//!
//! The ledger core consults three external registries read-only: milestone
//! verification, inspection results, and contractor verification. Each is a
//! trait seam so the host can wire its own backing store; the in-memory
//! implementations here back tests and standalone embedding.

use crate::{LedgerResult, error::LedgerError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

/// Maximum contractor rating accepted by the directory
pub const MAX_CONTRACTOR_RATING: u8 = 5;

/// Milestone completion/verification facts
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MilestoneFact {
    pub completed: bool,
    pub verified: bool,
    pub payment_percentage: u8,
}

/// Inspection outcome facts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionFact {
    pub status: String,
    pub passed: bool,
}

/// Contractor legitimacy facts
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ContractorFact {
    pub is_verified: bool,
    pub rating: u8,
}

/// Source of milestone facts, keyed by (project, milestone)
#[async_trait]
pub trait MilestoneSource: Send + Sync {
    async fn get_milestone(&self, project_id: &str, milestone_id: &str) -> Option<MilestoneFact>;
}

/// Source of inspection facts, keyed by (project, inspection)
#[async_trait]
pub trait InspectionSource: Send + Sync {
    async fn get_inspection(
        &self,
        project_id: &str,
        inspection_id: &str,
    ) -> Option<InspectionFact>;
}

/// Source of contractor facts, keyed by contractor principal
#[async_trait]
pub trait ContractorSource: Send + Sync {
    async fn get_contractor(&self, contractor_id: &str) -> Option<ContractorFact>;
}

/// In-memory milestone registry (in production, this would be the milestone module's store)
#[derive(Clone, Default)]
pub struct MemoryMilestones {
    inner: Arc<RwLock<HashMap<(String, String), MilestoneFact>>>,
}

impl MemoryMilestones {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or overwrite a milestone fact
    pub async fn set_milestone(&self, project_id: &str, milestone_id: &str, fact: MilestoneFact) {
        self.inner
            .write()
            .await
            .insert((project_id.to_string(), milestone_id.to_string()), fact);
    }
}

#[async_trait]
impl MilestoneSource for MemoryMilestones {
    async fn get_milestone(&self, project_id: &str, milestone_id: &str) -> Option<MilestoneFact> {
        self.inner
            .read()
            .await
            .get(&(project_id.to_string(), milestone_id.to_string()))
            .copied()
    }
}

/// In-memory inspection log
#[derive(Clone, Default)]
pub struct MemoryInspections {
    inner: Arc<RwLock<HashMap<(String, String), InspectionFact>>>,
}

impl MemoryInspections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or overwrite an inspection outcome
    pub async fn set_inspection(&self, project_id: &str, inspection_id: &str, fact: InspectionFact) {
        self.inner
            .write()
            .await
            .insert((project_id.to_string(), inspection_id.to_string()), fact);
    }
}

#[async_trait]
impl InspectionSource for MemoryInspections {
    async fn get_inspection(
        &self,
        project_id: &str,
        inspection_id: &str,
    ) -> Option<InspectionFact> {
        self.inner
            .read()
            .await
            .get(&(project_id.to_string(), inspection_id.to_string()))
            .cloned()
    }
}

/// In-memory contractor directory
#[derive(Clone, Default)]
pub struct MemoryContractors {
    inner: Arc<RwLock<HashMap<String, ContractorFact>>>,
}

impl MemoryContractors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contractor with its verification status and rating
    ///
    /// Ratings run 0 to [`MAX_CONTRACTOR_RATING`].
    pub async fn register(
        &self,
        contractor_id: &str,
        is_verified: bool,
        rating: u8,
    ) -> LedgerResult<()> {
        if contractor_id.trim().is_empty() {
            return Err(LedgerError::invalid_argument(
                "contractor id cannot be empty",
            ));
        }

        if rating > MAX_CONTRACTOR_RATING {
            return Err(LedgerError::invalid_argument(format!(
                "rating {} exceeds maximum {}",
                rating, MAX_CONTRACTOR_RATING
            )));
        }

        self.inner.write().await.insert(
            contractor_id.to_string(),
            ContractorFact {
                is_verified,
                rating,
            },
        );

        Ok(())
    }
}

#[async_trait]
impl ContractorSource for MemoryContractors {
    async fn get_contractor(&self, contractor_id: &str) -> Option<ContractorFact> {
        self.inner.read().await.get(contractor_id).copied()
    }
}
