//! Mock ledger for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use subsidy_core::MetadataHash;

use crate::traits::*;

/// In-process ledger for tests.
///
/// Assigns sequential claim ids, remembers commitments, and can be scripted
/// to fail or stall.
pub struct MockLedger {
    ledger_id: String,
    available: AtomicBool,
    latency: RwLock<Option<Duration>>,
    failures: Mutex<VecDeque<LedgerError>>,
    commitments: RwLock<HashMap<String, MetadataHash>>,
    next_id: AtomicU64,
    submit_count: AtomicU32,
    enroll_count: AtomicU32,
}

impl MockLedger {
    /// Create a new mock ledger.
    pub fn new(ledger_id: impl Into<String>) -> Self {
        Self {
            ledger_id: ledger_id.into(),
            available: AtomicBool::new(true),
            latency: RwLock::new(None),
            failures: Mutex::new(VecDeque::new()),
            commitments: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            submit_count: AtomicU32::new(0),
            enroll_count: AtomicU32::new(0),
        }
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Delay every call by `latency` before it takes effect.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    /// Fail the next call with `error`. Queued failures are consumed in order.
    pub async fn fail_next(&self, error: LedgerError) {
        self.failures.lock().await.push_back(error);
    }

    /// Overwrite a stored commitment, as if the chain disagreed.
    pub async fn tamper_commitment(&self, onchain_claim_id: &str, hash: MetadataHash) {
        self.commitments
            .write()
            .await
            .insert(onchain_claim_id.to_string(), hash);
    }

    /// Number of claim commitments that reached the ledger.
    pub fn submit_count(&self) -> u32 {
        self.submit_count.load(Ordering::SeqCst)
    }

    /// Number of enrollments that reached the ledger.
    pub fn enroll_count(&self) -> u32 {
        self.enroll_count.load(Ordering::SeqCst)
    }

    async fn before_call(&self) -> Result<(), LedgerError> {
        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("Mock ledger disabled".to_string()));
        }

        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }
        Ok(())
    }

    fn next_tx_hash(&self, seq: u64) -> String {
        format!("0x{:064x}", seq)
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new("mock-ledger")
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn id(&self) -> &str {
        &self.ledger_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn enroll_in_program(&self, program_onchain_id: &str) -> Result<String, LedgerError> {
        self.before_call().await?;

        if program_onchain_id.is_empty() {
            return Err(LedgerError::Rejected {
                reason: "unknown program".to_string(),
            });
        }

        self.enroll_count.fetch_add(1, Ordering::SeqCst);
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_tx_hash(seq))
    }

    async fn submit_claim(
        &self,
        program_onchain_id: &str,
        metadata_hash: &MetadataHash,
    ) -> Result<ClaimReceipt, LedgerError> {
        self.before_call().await?;

        if program_onchain_id.is_empty() {
            return Err(LedgerError::Rejected {
                reason: "unknown program".to_string(),
            });
        }

        self.submit_count.fetch_add(1, Ordering::SeqCst);
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let claim_id = seq.to_string();

        self.commitments
            .write()
            .await
            .insert(claim_id.clone(), metadata_hash.clone());

        Ok(ClaimReceipt {
            claim_id,
            tx_hash: self.next_tx_hash(seq),
        })
    }

    async fn claim_commitment(
        &self,
        onchain_claim_id: &str,
    ) -> Result<Option<MetadataHash>, LedgerError> {
        self.before_call().await?;
        Ok(self.commitments.read().await.get(onchain_claim_id).cloned())
    }
}
