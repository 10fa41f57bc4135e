//! Domain errors raised by the pure rule layer.

use rust_decimal::Decimal;

/// Which payout limit a claim amount ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapKind {
    /// The program's maximum cap
    MaxCap,
    /// The program's fixed per-claim amount
    PerClaim,
    /// Cumulative approved/disbursed total for the farmer under the program
    Cumulative,
}

impl CapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxCap => "max_cap",
            Self::PerClaim => "per_claim",
            Self::Cumulative => "cumulative",
        }
    }
}

impl std::fmt::Display for CapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types for program and claim rules.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    /// Malformed input (empty name, start >= end, bad size bounds)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Forbidden program or claim status transition
    #[error("Illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    /// Amount over a payout limit
    #[error("Amount {amount} exceeds {kind} limit of {limit}")]
    CapExceeded {
        amount: Decimal,
        limit: Decimal,
        kind: CapKind,
    },

    /// Metadata hash could not be produced or parsed
    #[error("Commitment error: {0}")]
    Commitment(String),
}

impl DomainError {
    pub(crate) fn illegal(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
