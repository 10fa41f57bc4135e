//! Core trait for ledger clients.
//!
//! This module defines the `LedgerClient` trait - the contract the
//! reconciler relies on when talking to the claim smart contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use subsidy_core::MetadataHash;

/// Error types for ledger operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// No response within the allowed time
    #[error("Ledger call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Transport failure before a response was received
    #[error("Network error: {0}")]
    Network(String),

    /// Ledger or relayer temporarily unavailable
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// The transaction was rejected (reverted, bad input)
    #[error("Transaction rejected: {reason}")]
    Rejected { reason: String },

    /// Response could not be understood
    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),
}

impl LedgerError {
    /// Whether resubmitting the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Network(_) | Self::Unavailable(_)
        )
    }
}

/// Identifiers returned by the ledger for a claim commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimReceipt {
    /// Claim id assigned by the contract
    pub claim_id: String,
    /// Transaction hash
    pub tx_hash: String,
}

/// Client for the external claim ledger.
///
/// Identifiers are returned exactly as the ledger produced them and must be
/// stored verbatim.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Identifier for logs (network name, contract address).
    fn id(&self) -> &str;

    /// Check if the ledger is currently reachable.
    async fn is_available(&self) -> bool;

    /// Record a farmer's enrollment in an anchored program. Returns the tx hash.
    async fn enroll_in_program(&self, program_onchain_id: &str) -> Result<String, LedgerError>;

    /// Commit a claim's metadata hash under a program.
    async fn submit_claim(
        &self,
        program_onchain_id: &str,
        metadata_hash: &MetadataHash,
    ) -> Result<ClaimReceipt, LedgerError>;

    /// Read back the commitment stored for a claim, if the ledger exposes it.
    async fn claim_commitment(
        &self,
        onchain_claim_id: &str,
    ) -> Result<Option<MetadataHash>, LedgerError>;
}
