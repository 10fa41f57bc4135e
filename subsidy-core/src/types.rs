//! Core types for subsidy programs, farms, enrollments and claims.
//!
//! Programs and claims are mirrored on the external ledger; the `onchain_*`
//! fields hold the identifiers the ledger returned, stored verbatim.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::commitment::MetadataHash;
use crate::error::{CapKind, DomainError};

/// Lifecycle status of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgramStatus {
    /// Being drafted by the agency, not open for claims
    Draft,
    /// Open for enrollment and claims
    Active,
    /// Closed permanently
    Archived,
}

impl ProgramStatus {
    /// Get string representation for logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Active => "ACTIVE",
            Self::Archived => "ARCHIVED",
        }
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Archived)
    }
}

impl Default for ProgramStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl std::fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a subsidy program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramType {
    /// Drought relief
    Drought,
    /// Flood relief
    Flood,
    /// Crop loss compensation
    CropLoss,
    /// Manually administered scheme
    Manual,
}

/// Constraints a farm must satisfy to claim under a program.
///
/// Every list is optional in effect: an empty list imposes no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    /// Minimum farm size (inclusive)
    pub min_farm_size: Option<f64>,
    /// Maximum farm size (inclusive)
    pub max_farm_size: Option<f64>,
    /// Allowed states
    #[serde(default)]
    pub states: Vec<String>,
    /// Allowed districts
    #[serde(default)]
    pub districts: Vec<String>,
    /// Allowed crop categories; at least one must be grown
    #[serde(default)]
    pub crop_types: Vec<String>,
    /// Land documents that must all be attached to the farm
    #[serde(default)]
    pub land_document_types: Vec<String>,
}

/// Monetary limits for claims under a program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRule {
    /// Fixed amount paid per claim, when the program pays a flat rate
    pub per_claim_amount: Option<Decimal>,
    /// Upper bound on a claim (and on the cumulative total when enabled)
    pub max_cap: Decimal,
}

impl PayoutRule {
    /// Create a rule with only a maximum cap.
    pub fn capped(max_cap: Decimal) -> Self {
        Self {
            per_claim_amount: None,
            max_cap,
        }
    }

    /// Set the per-claim amount.
    pub fn with_per_claim_amount(mut self, amount: Decimal) -> Self {
        self.per_claim_amount = Some(amount);
        self
    }

    /// Check a single claim amount against the cap and the per-claim amount.
    pub fn check_claim_amount(&self, amount: Decimal) -> Result<(), DomainError> {
        if amount > self.max_cap {
            return Err(DomainError::CapExceeded {
                amount,
                limit: self.max_cap,
                kind: CapKind::MaxCap,
            });
        }
        if let Some(per_claim) = self.per_claim_amount {
            if amount > per_claim {
                return Err(DomainError::CapExceeded {
                    amount,
                    limit: per_claim,
                    kind: CapKind::PerClaim,
                });
            }
        }
        Ok(())
    }

    /// Check that approving `amount` keeps the running total within the cap.
    pub fn check_cumulative(&self, already_committed: Decimal, amount: Decimal) -> Result<(), DomainError> {
        let total = already_committed + amount;
        if total > self.max_cap {
            return Err(DomainError::CapExceeded {
                amount: total,
                limit: self.max_cap,
                kind: CapKind::Cumulative,
            });
        }
        Ok(())
    }
}

/// A subsidy program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Internal identifier
    pub id: String,
    /// Ledger anchor id, unset until anchored
    pub onchain_id: Option<String>,
    /// Human-readable name
    pub name: String,
    /// Description shown to farmers
    pub description: String,
    /// Program category
    pub program_type: ProgramType,
    /// When the program opens
    pub start_date: DateTime<Utc>,
    /// When the program closes; strictly after `start_date`
    pub end_date: DateTime<Utc>,
    /// Lifecycle status
    pub status: ProgramStatus,
    /// Agency user who created the program
    pub creator_id: String,
    /// Eligibility constraints
    pub eligibility: Option<Eligibility>,
    /// Payout limits
    pub payout_rule: Option<PayoutRule>,
    /// When the program was created
    pub created_at: DateTime<Utc>,
    /// When the program was last modified
    pub updated_at: DateTime<Utc>,
}

impl Program {
    /// Build a program from a definition.
    ///
    /// Does not validate; see [`crate::validation::validate_definition`].
    pub fn from_definition(definition: ProgramDefinition) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            onchain_id: definition.onchain_id,
            name: definition.name,
            description: definition.description,
            program_type: definition.program_type,
            start_date: definition.start_date,
            end_date: definition.end_date,
            status: definition.status.unwrap_or_default(),
            creator_id: definition.creator_id,
            eligibility: definition.eligibility,
            payout_rule: definition.payout_rule,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether new claims may be submitted.
    pub fn accepts_claims(&self) -> bool {
        self.status == ProgramStatus::Active
    }
}

/// Input for creating a program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub program_type: ProgramType,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Initial status; DRAFT when omitted
    #[serde(default)]
    pub status: Option<ProgramStatus>,
    #[serde(default)]
    pub onchain_id: Option<String>,
    pub creator_id: String,
    #[serde(default)]
    pub eligibility: Option<Eligibility>,
    #[serde(default)]
    pub payout_rule: Option<PayoutRule>,
}

/// Partial update of a program's descriptive and rule fields.
///
/// Status and anchor id are changed through the lifecycle operation only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub program_type: Option<ProgramType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub eligibility: Option<Eligibility>,
    pub payout_rule: Option<PayoutRule>,
}

/// Verification state of a farm record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FarmVerification {
    Pending,
    Verified,
    Rejected,
}

/// A farm as seen by this engine. Owned by the farm registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Farm {
    /// Farm identifier
    pub id: String,
    /// Owning farmer
    pub farmer_id: String,
    /// Size in hectares
    pub size: f64,
    /// State or province
    pub state: String,
    /// District
    pub district: String,
    /// Crop categories grown
    #[serde(default)]
    pub crop_categories: Vec<String>,
    /// Types of land documents attached
    #[serde(default)]
    pub land_document_types: Vec<String>,
    /// Verification status
    pub verification: FarmVerification,
}

impl Farm {
    pub fn is_verified(&self) -> bool {
        self.verification == FarmVerification::Verified
    }
}

/// Farmer membership in a program. One row per (farmer, program).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub farmer_id: String,
    pub program_id: String,
    /// Time of the most recent enroll call
    pub enrolled_at: DateTime<Utc>,
    /// Ledger transaction that recorded the enrollment, if anchored
    pub onchain_tx_hash: Option<String>,
}

/// Claim status. Advances monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    /// Committed on-chain, awaiting review
    Pending,
    /// Approved by the agency
    Approved,
    /// Rejected by the agency (terminal)
    Rejected,
    /// Paid out (terminal)
    Disbursed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Disbursed => "DISBURSED",
        }
    }

    /// Whether this status counts against a cumulative cap
    pub fn consumes_cap(&self) -> bool {
        matches!(self, Self::Approved | Self::Disbursed)
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a claim is raised against, beyond its program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimContext {
    /// Plain program claim
    Program,
    /// Claim triggered by a recorded weather event
    WeatherEvent { weather_event_id: String },
    /// Claim under an insurance policy
    Policy { policy_id: String },
}

impl Default for ClaimContext {
    fn default() -> Self {
        Self::Program
    }
}

impl ClaimContext {
    /// Canonical program reference folded into the metadata payload.
    pub fn program_reference(&self, program_id: Option<&str>) -> String {
        let program = program_id.unwrap_or("");
        match self {
            Self::Program => format!("program:{program}"),
            Self::WeatherEvent { weather_event_id } => {
                format!("program:{program}#weather:{weather_event_id}")
            }
            Self::Policy { policy_id } => format!("program:{program}#policy:{policy_id}"),
        }
    }

    pub fn weather_event_id(&self) -> Option<&str> {
        match self {
            Self::WeatherEvent { weather_event_id } => Some(weather_event_id),
            _ => None,
        }
    }

    pub fn policy_id(&self) -> Option<&str> {
        match self {
            Self::Policy { policy_id } => Some(policy_id),
            _ => None,
        }
    }
}

/// A subsidy claim, linked to its on-chain commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Off-chain identifier
    pub id: String,
    /// Claiming farmer
    pub farmer_id: String,
    /// Program claimed against
    pub program_id: Option<String>,
    /// Weather event or policy context
    pub context: ClaimContext,
    /// Requested amount in ledger denomination
    pub amount: Decimal,
    /// Farmer's remarks, part of the committed payload
    pub remarks: String,
    /// Current status
    pub status: ClaimStatus,
    /// Claim id assigned by the ledger
    pub onchain_claim_id: String,
    /// Transaction that recorded the commitment
    pub onchain_tx_hash: String,
    /// Hash of the canonical metadata payload
    pub metadata_hash: MetadataHash,
    /// Submission timestamp committed in the payload (ms since epoch)
    pub submitted_at_ms: i64,
    /// Why the claim was rejected
    pub rejection_reason: Option<String>,
    /// Reference of the current evidence artifact
    pub evidence_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Claim {
    /// Rebuild the canonical metadata payload this claim committed to.
    pub fn metadata(&self) -> crate::commitment::ClaimMetadata {
        crate::commitment::ClaimMetadata::new(
            self.amount,
            self.remarks.clone(),
            self.context.program_reference(self.program_id.as_deref()),
            self.submitted_at_ms,
        )
    }
}
