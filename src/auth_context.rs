//! Authorization context - resolves the admin principal
//!
//! Holds the one piece of process-wide authorization state: the current
//! admin principal, initialized to the deployer identity and mutable only
//! through [`AuthContext::transfer_admin`]. Per-escrow party predicates
//! live on the escrow record itself since they compare against its fields.

use crate::{LedgerResult, error::LedgerError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Process-wide authorization context
pub struct AuthContext {
    /// Current admin principal; exactly one writer at a time
    admin: Arc<RwLock<String>>,
}

impl AuthContext {
    /// Create a new context with the deployer as initial admin
    pub fn new<S: Into<String>>(initial_admin: S) -> Self {
        Self {
            admin: Arc::new(RwLock::new(initial_admin.into())),
        }
    }

    /// Get the current admin principal
    pub async fn admin(&self) -> String {
        self.admin.read().await.clone()
    }

    /// Check if the caller is the current admin
    pub async fn is_admin(&self, caller: &str) -> bool {
        *self.admin.read().await == caller
    }

    /// Transfer admin rights to a new principal
    ///
    /// Fails `Unauthorized` unless the caller is the current admin.
    pub async fn transfer_admin(&self, caller: &str, new_admin: &str) -> LedgerResult<()> {
        if new_admin.trim().is_empty() {
            return Err(LedgerError::invalid_argument(
                "new admin principal cannot be empty",
            ));
        }

        let mut admin = self.admin.write().await;
        if *admin != caller {
            return Err(LedgerError::unauthorized(
                "only the current admin can transfer admin rights",
            ));
        }

        info!("Transferring admin from {} to {}", *admin, new_admin);
        *admin = new_admin.to_string();

        Ok(())
    }
}
