//! Bounded ledger calls.
//!
//! Wraps a [`LedgerClient`] with a per-attempt timeout and a fixed-delay
//! retry for retryable failures. A call that times out may still land
//! on-chain; retries are opt-in through `max_attempts`.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use subsidy_core::MetadataHash;
use subsidy_ledger::{ClaimReceipt, LedgerClient, LedgerError};

use crate::config::LedgerConfig;

/// Ledger client with timeout and retry policy applied.
#[derive(Clone)]
pub struct LedgerGateway {
    client: Arc<dyn LedgerClient>,
    config: LedgerConfig,
}

impl LedgerGateway {
    pub fn new(client: Arc<dyn LedgerClient>, config: LedgerConfig) -> Self {
        Self { client, config }
    }

    pub fn ledger_id(&self) -> &str {
        self.client.id()
    }

    pub async fn enroll_in_program(&self, program_onchain_id: &str) -> Result<String, LedgerError> {
        self.call("enroll_in_program", || self.client.enroll_in_program(program_onchain_id))
            .await
    }

    pub async fn submit_claim(
        &self,
        program_onchain_id: &str,
        metadata_hash: &MetadataHash,
    ) -> Result<ClaimReceipt, LedgerError> {
        self.call("submit_claim", || {
            self.client.submit_claim(program_onchain_id, metadata_hash)
        })
        .await
    }

    pub async fn claim_commitment(&self, onchain_claim_id: &str) -> Result<Option<MetadataHash>, LedgerError> {
        self.call("claim_commitment", || self.client.claim_commitment(onchain_claim_id))
            .await
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let timeout = self.config.timeout();

        let mut tries = 0;
        loop {
            tries += 1;
            let outcome = match tokio::time::timeout(timeout, attempt()).await {
                Ok(result) => result,
                Err(_) => Err(LedgerError::Timeout {
                    after_ms: self.config.timeout_ms,
                }),
            };

            match outcome {
                Ok(value) => {
                    debug!(ledger = %self.client.id(), operation, attempt = tries, "Ledger call succeeded");
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && tries < max_attempts => {
                    warn!(
                        ledger = %self.client.id(),
                        operation,
                        attempt = tries,
                        max_attempts,
                        error = %e,
                        "Ledger call failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(e) => {
                    warn!(ledger = %self.client.id(), operation, attempt = tries, error = %e, "Ledger call failed");
                    return Err(e);
                }
            }
        }
    }
}
