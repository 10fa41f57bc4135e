//! Integrity reconciliation between stored claims and their commitments.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use subsidy_core::{Claim, ClaimCommitment, MetadataHash};

use crate::config::AuditConfig;
use crate::error::{ReconcileError, Result};
use crate::gateway::LedgerGateway;
use crate::store::{ClaimFilter, ClaimStore};

/// What an audit found wrong with one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingKind {
    /// Stored fields no longer hash to the stored commitment
    LocalMismatch {
        stored: MetadataHash,
        recomputed: MetadataHash,
    },
    /// The ledger holds a different commitment
    LedgerMismatch {
        stored: MetadataHash,
        onchain: MetadataHash,
    },
    /// The ledger does not know the claim id
    MissingOnLedger,
    /// The ledger could not be asked
    LedgerUnreachable { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityFinding {
    pub claim_id: String,
    pub onchain_claim_id: String,
    pub kind: FindingKind,
}

/// Result of a full audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub checked: usize,
    pub findings: Vec<IntegrityFinding>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Recomputes commitments and compares them with what was stored and what
/// the ledger holds.
pub struct AuditPass {
    claims: Arc<dyn ClaimStore>,
    ledger: LedgerGateway,
    commitment: ClaimCommitment,
    config: AuditConfig,
}

impl AuditPass {
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        ledger: LedgerGateway,
        commitment: ClaimCommitment,
        config: AuditConfig,
    ) -> Self {
        Self {
            claims,
            ledger,
            commitment,
            config,
        }
    }

    /// Check one claim's stored hash against its stored fields.
    pub async fn verify_claim(&self, claim_id: &str) -> Result<Claim> {
        let claim = self
            .claims
            .get_claim(claim_id)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Claim", claim_id))?;

        let recomputed = self.recompute(&claim)?;
        if recomputed != claim.metadata_hash {
            warn!(claim_id, stored = %claim.metadata_hash, recomputed = %recomputed, "Claim integrity mismatch");
            return Err(ReconcileError::Integrity {
                claim_id: claim.id,
                expected: claim.metadata_hash,
                actual: recomputed,
            });
        }
        Ok(claim)
    }

    /// Audit every claim matching `filter`. Never fails on a finding.
    pub async fn audit_claims(&self, filter: &ClaimFilter) -> Result<AuditReport> {
        let started_at = Utc::now();
        let start = std::time::Instant::now();
        let claims = self.claims.scan_claims(filter).await?;

        let mut findings = Vec::new();
        for claim in &claims {
            let recomputed = self.recompute(claim)?;
            if recomputed != claim.metadata_hash {
                findings.push(IntegrityFinding {
                    claim_id: claim.id.clone(),
                    onchain_claim_id: claim.onchain_claim_id.clone(),
                    kind: FindingKind::LocalMismatch {
                        stored: claim.metadata_hash.clone(),
                        recomputed,
                    },
                });
            }
        }

        if self.config.check_ledger {
            let ledger_findings: Vec<Option<IntegrityFinding>> = stream::iter(claims.iter())
                .map(|claim| self.compare_with_ledger(claim))
                .buffer_unordered(self.config.parallel_limit.max(1))
                .collect()
                .await;
            findings.extend(ledger_findings.into_iter().flatten());
        }

        for finding in &findings {
            error!(
                claim_id = %finding.claim_id,
                onchain_claim_id = %finding.onchain_claim_id,
                finding = ?finding.kind,
                "Audit finding"
            );
        }
        info!(checked = claims.len(), findings = findings.len(), "Claim audit finished");

        Ok(AuditReport {
            checked: claims.len(),
            findings,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn recompute(&self, claim: &Claim) -> Result<MetadataHash> {
        Ok(self.commitment.build_metadata_hash(&claim.metadata())?)
    }

    async fn compare_with_ledger(&self, claim: &Claim) -> Option<IntegrityFinding> {
        let kind = match self.ledger.claim_commitment(&claim.onchain_claim_id).await {
            Ok(Some(onchain)) if onchain == claim.metadata_hash => {
                debug!(claim_id = %claim.id, "Ledger commitment matches");
                return None;
            }
            Ok(Some(onchain)) => FindingKind::LedgerMismatch {
                stored: claim.metadata_hash.clone(),
                onchain,
            },
            Ok(None) => FindingKind::MissingOnLedger,
            Err(e) => FindingKind::LedgerUnreachable { error: e.to_string() },
        };

        Some(IntegrityFinding {
            claim_id: claim.id.clone(),
            onchain_claim_id: claim.onchain_claim_id.clone(),
            kind,
        })
    }
}
