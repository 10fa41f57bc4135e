//! Claim commitment: the metadata hash binding an off-chain claim to its
//! on-chain record.
//!
//! The payload is serialized to compact JSON with a fixed field order and a
//! normalized decimal amount, so the hash can be re-derived bit-for-bit for
//! audit. The digest algorithm must match what the ledger contract stores and
//! is therefore pluggable.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha3::{Digest, Keccak256};

use crate::error::DomainError;

/// Digest algorithms understood by ledger contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// EVM-compatible keccak-256
    Keccak256,
    /// SHA-256
    Sha256,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Keccak256
    }
}

/// Strategy producing a 32-byte digest.
pub trait CommitmentHasher: Send + Sync {
    /// Which algorithm this hasher implements.
    fn algorithm(&self) -> HashAlgorithm;

    /// Digest raw bytes.
    fn digest(&self, data: &[u8]) -> [u8; 32];
}

/// Keccak-256, as used by EVM contracts.
pub struct Keccak256Hasher;

impl CommitmentHasher for Keccak256Hasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Keccak256
    }

    fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = Keccak256::new();
        hasher.update(data);
        hasher.finalize().into()
    }
}

/// SHA-256.
pub struct Sha256Hasher;

impl CommitmentHasher for Sha256Hasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }

    fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }
}

impl HashAlgorithm {
    /// Instantiate the hasher for this algorithm.
    pub fn hasher(&self) -> Arc<dyn CommitmentHasher> {
        match self {
            Self::Keccak256 => Arc::new(Keccak256Hasher),
            Self::Sha256 => Arc::new(Sha256Hasher),
        }
    }
}

/// A `0x`-prefixed, lowercase, 32-byte hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MetadataHash(String);

impl MetadataHash {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// Parse a hex digest, with or without `0x`, any case.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = hex::decode(digits)
            .map_err(|e| DomainError::Commitment(format!("invalid metadata hash '{value}': {e}")))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            DomainError::Commitment(format!(
                "metadata hash must be 32 bytes, got {}",
                b.len()
            ))
        })?;

        Ok(Self::from_bytes(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MetadataHash {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MetadataHash> for String {
    fn from(hash: MetadataHash) -> Self {
        hash.0
    }
}

impl std::fmt::Display for MetadataHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical claim metadata committed on-chain.
///
/// Field order here is the serialization order; do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimMetadata {
    /// Normalized decimal string ("20000", not "20000.00")
    pub amount: String,
    pub remarks: String,
    pub program_reference: String,
    pub submission_timestamp_millis: i64,
}

impl ClaimMetadata {
    pub fn new(
        amount: Decimal,
        remarks: impl Into<String>,
        program_reference: impl Into<String>,
        submission_timestamp_millis: i64,
    ) -> Self {
        Self {
            amount: amount.normalize().to_string(),
            remarks: remarks.into(),
            program_reference: program_reference.into(),
            submission_timestamp_millis,
        }
    }

    /// Deterministic byte encoding that gets hashed.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, DomainError> {
        serde_json::to_vec(self).map_err(|e| DomainError::Commitment(e.to_string()))
    }
}

/// Builds and verifies claim metadata hashes.
#[derive(Clone)]
pub struct ClaimCommitment {
    hasher: Arc<dyn CommitmentHasher>,
}

impl ClaimCommitment {
    /// Create with one of the built-in algorithms.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            hasher: algorithm.hasher(),
        }
    }

    /// Create with a custom hasher.
    pub fn with_hasher(hasher: Arc<dyn CommitmentHasher>) -> Self {
        Self { hasher }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.hasher.algorithm()
    }

    /// Hash the canonical encoding of a payload.
    pub fn build_metadata_hash(&self, payload: &ClaimMetadata) -> Result<MetadataHash, DomainError> {
        let bytes = payload.canonical_bytes()?;
        Ok(MetadataHash::from_bytes(self.hasher.digest(&bytes)))
    }

    /// Whether `hash` commits to `payload`.
    pub fn verify(&self, payload: &ClaimMetadata, hash: &MetadataHash) -> bool {
        match self.build_metadata_hash(payload) {
            Ok(expected) => expected == *hash,
            Err(e) => {
                tracing::warn!(error = %e, "Could not rebuild metadata hash");
                false
            }
        }
    }
}

impl Default for ClaimCommitment {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

impl std::fmt::Debug for ClaimCommitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimCommitment")
            .field("algorithm", &self.algorithm())
            .finish()
    }
}
