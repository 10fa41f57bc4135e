//! Claim evidence artifacts.
//!
//! Evidence is a side artifact: it never feeds the metadata commitment and a
//! failed upload never fails a claim that is already on-chain.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EvidenceConfig;
use crate::error::{ReconcileError, Result};

/// An uploaded evidence file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl EvidenceFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Check size and type against the configured limits.
    pub fn validate(&self, config: &EvidenceConfig) -> Result<()> {
        if self.bytes.is_empty() {
            return Err(ReconcileError::Validation("evidence file is empty".to_string()));
        }
        if self.bytes.len() > config.max_bytes {
            return Err(ReconcileError::Validation(format!(
                "evidence file is {} bytes, limit is {}",
                self.bytes.len(),
                config.max_bytes
            )));
        }
        let content_type = self.content_type.trim().to_ascii_lowercase();
        if !config
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&content_type))
        {
            return Err(ReconcileError::Validation(format!(
                "evidence content type '{}' is not accepted",
                self.content_type
            )));
        }
        Ok(())
    }
}

/// Metadata of a stored artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvidence {
    pub reference: String,
    pub claim_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size: usize,
    pub stored_at: DateTime<Utc>,
}

/// Blob storage for evidence.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Store a file for a claim and return its reference.
    async fn put(&self, claim_id: &str, file: EvidenceFile) -> Result<String>;

    /// Release a stored artifact. Unknown references are not an error.
    async fn release(&self, reference: &str) -> Result<()>;

    async fn describe(&self, reference: &str) -> Result<Option<StoredEvidence>>;
}

/// In-memory evidence store.
#[derive(Default)]
pub struct MemoryEvidenceStore {
    artifacts: DashMap<String, (StoredEvidence, Vec<u8>)>,
}

impl MemoryEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Raw bytes of an artifact.
    pub fn contents(&self, reference: &str) -> Option<Vec<u8>> {
        self.artifacts.get(reference).map(|a| a.1.clone())
    }
}

#[async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    async fn put(&self, claim_id: &str, file: EvidenceFile) -> Result<String> {
        let reference = format!(
            "evidence/{}/{}-{}",
            claim_id,
            uuid::Uuid::new_v4(),
            sanitize_file_name(&file.file_name)
        );
        let meta = StoredEvidence {
            reference: reference.clone(),
            claim_id: claim_id.to_string(),
            file_name: file.file_name,
            content_type: file.content_type,
            size: file.bytes.len(),
            stored_at: Utc::now(),
        };
        debug!(claim_id, reference = %reference, size = meta.size, "Evidence stored");
        self.artifacts.insert(reference.clone(), (meta, file.bytes));
        Ok(reference)
    }

    async fn release(&self, reference: &str) -> Result<()> {
        self.artifacts.remove(reference);
        Ok(())
    }

    async fn describe(&self, reference: &str) -> Result<Option<StoredEvidence>> {
        Ok(self.artifacts.get(reference).map(|a| a.0.clone()))
    }
}

/// Keep names path-safe.
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "evidence".to_string(),
        trimmed => trimmed.to_string(),
    }
}
