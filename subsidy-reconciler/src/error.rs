//! Error taxonomy for the reconciliation engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use subsidy_core::{CapKind, DomainError, IneligibilityReason, MetadataHash, ProgramStatus};
use subsidy_ledger::LedgerError;

/// Coarse error classification for callers mapping errors to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input; resubmitting unchanged will fail again
    Client,
    /// Request conflicts with current state
    Conflict,
    /// Transient; the same call may succeed later
    Retryable,
    /// Internal failure needing operator attention
    Server,
}

/// Error types for the reconciliation engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconcileError {
    /// Malformed input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The farmer has no farm satisfying the program's rules
    #[error("Farmer is not eligible: {}", join_reasons(.reasons))]
    Ineligible {
        /// Farm the reasons were evaluated for
        farm_id: Option<String>,
        reasons: Vec<IneligibilityReason>,
    },

    /// Program is not open for this operation
    #[error("Program {program_id} is {status}, expected ACTIVE")]
    ProgramNotActive {
        program_id: String,
        status: ProgramStatus,
    },

    /// Forbidden status transition
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    /// Amount over a payout limit
    #[error("Amount {amount} exceeds {kind} limit of {limit}")]
    CapExceeded {
        amount: Decimal,
        limit: Decimal,
        kind: CapKind,
    },

    /// Ledger call failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Stored metadata hash does not match the recomputed one
    #[error("Integrity mismatch for claim {claim_id}: stored {expected}, recomputed {actual}")]
    Integrity {
        claim_id: String,
        expected: MetadataHash,
        actual: MetadataHash,
    },

    /// Committed on-chain but not persisted locally; parked for reconciliation
    #[error("Claim {onchain_claim_id} (tx {tx_hash}) committed on-chain but not persisted: {reason}")]
    OffChainPending {
        onchain_claim_id: String,
        tx_hash: String,
        reason: String,
    },

    /// Metadata hash could not be computed
    #[error("Commitment error: {0}")]
    Commitment(String),

    /// Storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Evidence store failure
    #[error("Evidence error: {0}")]
    Evidence(String),
}

fn join_reasons(reasons: &[IneligibilityReason]) -> String {
    reasons
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ReconcileError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Classify for response mapping.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_)
            | Self::NotFound { .. }
            | Self::Ineligible { .. }
            | Self::CapExceeded { .. } => ErrorCategory::Client,
            Self::ProgramNotActive { .. } | Self::IllegalTransition { .. } => ErrorCategory::Conflict,
            Self::Ledger(e) if e.is_retryable() => ErrorCategory::Retryable,
            Self::Ledger(LedgerError::Rejected { .. }) => ErrorCategory::Conflict,
            Self::Ledger(_)
            | Self::Integrity { .. }
            | Self::OffChainPending { .. }
            | Self::Commitment(_)
            | Self::Storage(_)
            | Self::Evidence(_) => ErrorCategory::Server,
        }
    }

    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Retryable
    }
}

impl From<DomainError> for ReconcileError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => Self::Validation(msg),
            DomainError::IllegalTransition { from, to } => Self::IllegalTransition { from, to },
            DomainError::CapExceeded {
                amount,
                limit,
                kind,
            } => Self::CapExceeded {
                amount,
                limit,
                kind,
            },
            DomainError::Commitment(msg) => Self::Commitment(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_keep_their_meaning() {
        let err: ReconcileError = DomainError::IllegalTransition {
            from: "ACTIVE".into(),
            to: "DRAFT".into(),
        }
        .into();
        assert!(matches!(err, ReconcileError::IllegalTransition { .. }));
        assert_eq!(err.category(), ErrorCategory::Conflict);

        let err: ReconcileError = DomainError::CapExceeded {
            amount: Decimal::new(20_000, 0),
            limit: Decimal::new(15_000, 0),
            kind: CapKind::MaxCap,
        }
        .into();
        assert_eq!(err.to_string(), "Amount 20000 exceeds max_cap limit of 15000");
        assert_eq!(err.category(), ErrorCategory::Client);
    }

    #[test]
    fn test_ledger_categories() {
        let timeout: ReconcileError = LedgerError::Timeout { after_ms: 100 }.into();
        assert!(timeout.is_retryable());

        let revert: ReconcileError = LedgerError::Rejected {
            reason: "revert".into(),
        }
        .into();
        assert!(!revert.is_retryable());
        assert_eq!(revert.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn test_ineligible_message_lists_reasons() {
        let err = ReconcileError::Ineligible {
            farm_id: Some("farm-1".into()),
            reasons: vec![
                IneligibilityReason::FarmTooLarge { size: 60.0, max: 50.0 },
                IneligibilityReason::MissingDocuments {
                    missing: vec!["lease".into()],
                },
            ],
        };
        let message = err.to_string();
        assert!(message.contains("exceeds the maximum of 50"));
        assert!(message.contains("Missing land documents: lease"));
    }
}
