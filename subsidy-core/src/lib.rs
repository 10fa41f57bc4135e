//! Program, eligibility and claim-commitment rules for agricultural subsidies.
//!
//! This crate holds the pure, I/O-free half of the reconciliation engine:
//!
//! - **Programs**: agency-defined subsidy schemes with a DRAFT → ACTIVE → ARCHIVED lifecycle
//! - **Eligibility**: farm-size, location, crop and land-document constraints
//! - **Claims**: farmer payout requests bound to an on-chain commitment
//!
//! # Key Components
//!
//! - [`EligibilityEvaluator`]: Evaluates a farm against a program's eligibility rules
//! - [`ProgramLifecycle`]: Program status state machine with anchor-id side channel
//! - [`ClaimLifecycle`]: Monotonic claim status advancement
//! - [`ClaimCommitment`]: Builds and verifies the metadata hash stored on-chain
//!
//! # Example
//!
//! ```ignore
//! use subsidy_core::{ClaimCommitment, ClaimMetadata, HashAlgorithm};
//!
//! let commitment = ClaimCommitment::new(HashAlgorithm::Keccak256);
//! let payload = ClaimMetadata::new(amount, "Flood damage", "program:42", submitted_at_ms);
//! let hash = commitment.build_metadata_hash(&payload)?;
//! assert!(commitment.verify(&payload, &hash));
//! ```

pub mod commitment;
pub mod eligibility;
pub mod error;
pub mod lifecycle;
pub mod types;
pub mod validation;

// Re-export main types
pub use commitment::{
    ClaimCommitment, ClaimMetadata, CommitmentHasher, HashAlgorithm, Keccak256Hasher, MetadataHash,
    Sha256Hasher,
};
pub use eligibility::{EligibilityEvaluator, IneligibilityReason};
pub use error::{CapKind, DomainError};
pub use lifecycle::{ClaimAdvance, ClaimLifecycle, ProgramLifecycle, StatusChange};
pub use types::*;
