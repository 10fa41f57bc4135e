//! Claims committed on-chain whose local write failed.
//!
//! The ledger accepted the commitment, so the claim exists whether or not we
//! store it. Entries here carry everything needed to persist the claim later
//! without touching the ledger again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use subsidy_core::Claim;

use crate::error::{ReconcileError, Result};
use crate::store::ClaimStore;

/// A claim waiting to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingClaim {
    /// The fully built claim, including ledger identifiers
    pub claim: Claim,
    /// Last persistence error
    pub last_error: String,
    /// Persistence attempts so far
    pub attempts: u32,
    pub parked_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
}

/// Queue of claims awaiting local persistence.
#[derive(Clone, Default)]
pub struct PendingReconciliations {
    entries: Arc<RwLock<VecDeque<PendingClaim>>>,
}

impl PendingReconciliations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a claim after a failed write. Re-parking the same on-chain id
    /// updates the existing entry.
    pub async fn park(&self, claim: Claim, error: &ReconcileError) {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries
            .iter_mut()
            .find(|e| e.claim.onchain_claim_id == claim.onchain_claim_id)
        {
            existing.attempts += 1;
            existing.last_error = error.to_string();
            existing.last_attempt_at = now;
            return;
        }

        entries.push_back(PendingClaim {
            claim,
            last_error: error.to_string(),
            attempts: 1,
            parked_at: now,
            last_attempt_at: now,
        });
    }

    /// Snapshot of the queue, oldest first.
    pub async fn list(&self) -> Vec<PendingClaim> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Retry persisting one parked claim.
    ///
    /// Succeeds without writing when the claim is already stored. On failure
    /// the entry stays queued and `OffChainPending` is returned again.
    pub async fn resolve(&self, onchain_claim_id: &str, claims: &dyn ClaimStore) -> Result<Claim> {
        let pending = self
            .entries
            .read()
            .await
            .iter()
            .find(|e| e.claim.onchain_claim_id == onchain_claim_id)
            .cloned()
            .ok_or_else(|| ReconcileError::not_found("Pending claim", onchain_claim_id))?;

        if let Some(stored) = claims.find_by_onchain_id(onchain_claim_id).await? {
            self.remove(onchain_claim_id).await;
            info!(onchain_claim_id, claim_id = %stored.id, "Pending claim was already persisted");
            return Ok(stored);
        }

        match claims.insert_claim(pending.claim.clone()).await {
            Ok(()) => {
                self.remove(onchain_claim_id).await;
                info!(
                    onchain_claim_id,
                    claim_id = %pending.claim.id,
                    attempts = pending.attempts + 1,
                    "Pending claim persisted"
                );
                Ok(pending.claim)
            }
            Err(e) => {
                // A concurrent resolve may have stored it between our lookup and insert.
                if let Ok(Some(stored)) = claims.find_by_onchain_id(onchain_claim_id).await {
                    self.remove(onchain_claim_id).await;
                    info!(onchain_claim_id, claim_id = %stored.id, "Pending claim persisted concurrently");
                    return Ok(stored);
                }
                warn!(onchain_claim_id, error = %e, "Pending claim still not persisted");
                self.park(pending.claim.clone(), &e).await;
                Err(ReconcileError::OffChainPending {
                    onchain_claim_id: onchain_claim_id.to_string(),
                    tx_hash: pending.claim.onchain_tx_hash,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn remove(&self, onchain_claim_id: &str) {
        self.entries
            .write()
            .await
            .retain(|e| e.claim.onchain_claim_id != onchain_claim_id);
    }
}
