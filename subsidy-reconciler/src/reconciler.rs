//! Claim submission and lifecycle.
//!
//! A claim is only ever stored after the ledger has committed its metadata
//! hash, and it is stored with the identifiers the ledger returned. The
//! submission pipeline runs strictly in order:
//!
//! 1. Validate the request and the program (ACTIVE, payout rule, caps, anchor)
//! 2. Find an eligible verified farm
//! 3. Enroll the farmer (idempotent)
//! 4. Build the canonical metadata payload and its hash
//! 5. Commit the hash on the ledger (bounded by the configured timeout)
//! 6. Persist the claim; on failure park it for reconciliation
//! 7. Attach evidence; failures become warnings
//!
//! No later step runs if an earlier one failed.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use subsidy_core::validation::validate_claim_amount;
use subsidy_core::{
    Claim, ClaimAdvance, ClaimCommitment, ClaimContext, ClaimLifecycle, ClaimMetadata, ClaimStatus,
    EligibilityEvaluator, Enrollment, Farm, IneligibilityReason, Program,
};

use crate::config::ReconcilerConfig;
use crate::enrollment::EnrollmentRegistry;
use crate::error::{ReconcileError, Result};
use crate::evidence::{EvidenceFile, EvidenceStore};
use crate::gateway::LedgerGateway;
use crate::notification::{NotificationDispatcher, NotificationEvent, NotificationKind};
use crate::pending::{PendingClaim, PendingReconciliations};
use crate::store::{ClaimFilter, ClaimStore, FarmDirectory, Page, Pagination, ProgramStore, Stores};

/// A farmer's request to claim under a program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub farmer_id: String,
    pub program_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub remarks: String,
    #[serde(default)]
    pub context: ClaimContext,
    #[serde(default)]
    pub evidence: Option<EvidenceFile>,
}

impl ClaimRequest {
    pub fn new(
        farmer_id: impl Into<String>,
        program_id: impl Into<String>,
        amount: Decimal,
        remarks: impl Into<String>,
    ) -> Self {
        Self {
            farmer_id: farmer_id.into(),
            program_id: program_id.into(),
            amount,
            remarks: remarks.into(),
            context: ClaimContext::Program,
            evidence: None,
        }
    }

    pub fn with_context(mut self, context: ClaimContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_evidence(mut self, file: EvidenceFile) -> Self {
        self.evidence = Some(file);
        self
    }
}

/// A stored claim plus anything that went wrong after it was committed.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimSubmission {
    pub claim: Claim,
    /// The farm that satisfied eligibility
    pub farm_id: String,
    pub warnings: Vec<String>,
}

/// Result of an enrollment request.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentReceipt {
    pub enrollment: Enrollment,
    pub newly_enrolled: bool,
    pub warnings: Vec<String>,
}

/// Orchestrates claims between the ledger and local storage.
pub struct ClaimReconciler {
    config: ReconcilerConfig,
    programs: Arc<dyn ProgramStore>,
    claims: Arc<dyn ClaimStore>,
    farms: Arc<dyn FarmDirectory>,
    registry: EnrollmentRegistry,
    ledger: LedgerGateway,
    commitment: ClaimCommitment,
    evidence: Arc<dyn EvidenceStore>,
    pending: PendingReconciliations,
    notifier: NotificationDispatcher,
}

impl ClaimReconciler {
    pub fn new(
        config: ReconcilerConfig,
        stores: &Stores,
        ledger: LedgerGateway,
        evidence: Arc<dyn EvidenceStore>,
        notifier: NotificationDispatcher,
    ) -> Self {
        let registry = EnrollmentRegistry::new(
            stores.enrollments.clone(),
            stores.farms.clone(),
            notifier.clone(),
        );
        let commitment = ClaimCommitment::new(config.commitment.algorithm);

        Self {
            config,
            programs: stores.programs.clone(),
            claims: stores.claims.clone(),
            farms: stores.farms.clone(),
            registry,
            ledger,
            commitment,
            evidence,
            pending: PendingReconciliations::new(),
            notifier,
        }
    }

    pub fn commitment(&self) -> &ClaimCommitment {
        &self.commitment
    }

    pub fn registry(&self) -> &EnrollmentRegistry {
        &self.registry
    }

    /// Submit a claim. See the module docs for the pipeline.
    pub async fn submit_claim(&self, request: ClaimRequest) -> Result<ClaimSubmission> {
        validate_claim_amount(request.amount)?;
        if let Some(file) = &request.evidence {
            file.validate(&self.config.evidence)?;
        }

        let program = self.load_program(&request.program_id).await?;
        if !program.accepts_claims() {
            return Err(ReconcileError::ProgramNotActive {
                program_id: program.id,
                status: program.status,
            });
        }
        let rule = program.payout_rule.as_ref().ok_or_else(|| {
            ReconcileError::Validation(format!("program {} has no payout rule", program.id))
        })?;
        rule.check_claim_amount(request.amount)?;
        let program_anchor = program.onchain_id.clone().ok_or_else(|| {
            ReconcileError::Validation(format!("program {} is not anchored on the ledger", program.id))
        })?;

        let farm = self.eligible_farm(&request.farmer_id, &program).await?;
        debug!(farmer_id = %request.farmer_id, farm_id = %farm.id, program_id = %program.id, "Eligibility passed");

        let enrollment = self.enroll_and_anchor(&request.farmer_id, &program).await?;
        let mut warnings = enrollment.warnings;

        let submitted_at_ms = Utc::now().timestamp_millis();
        let payload = ClaimMetadata::new(
            request.amount,
            request.remarks.clone(),
            request.context.program_reference(Some(&program.id)),
            submitted_at_ms,
        );
        let metadata_hash = self.commitment.build_metadata_hash(&payload)?;
        debug!(farmer_id = %request.farmer_id, hash = %metadata_hash, "Metadata hash built");

        let receipt = self.ledger.submit_claim(&program_anchor, &metadata_hash).await?;
        info!(
            ledger = %self.ledger.ledger_id(),
            onchain_claim_id = %receipt.claim_id,
            tx_hash = %receipt.tx_hash,
            "Claim committed on-chain"
        );

        let claim = Claim {
            id: uuid::Uuid::new_v4().to_string(),
            farmer_id: request.farmer_id,
            program_id: Some(program.id.clone()),
            context: request.context,
            amount: request.amount,
            remarks: request.remarks,
            status: ClaimStatus::Pending,
            onchain_claim_id: receipt.claim_id,
            onchain_tx_hash: receipt.tx_hash,
            metadata_hash,
            submitted_at_ms,
            rejection_reason: None,
            evidence_ref: None,
            created_at: Utc::now(),
            approved_at: None,
            paid_at: None,
        };

        if let Err(e) = self.claims.insert_claim(claim.clone()).await {
            error!(
                onchain_claim_id = %claim.onchain_claim_id,
                tx_hash = %claim.onchain_tx_hash,
                error = %e,
                "Claim committed on-chain but not persisted, parking for reconciliation"
            );
            let failure = ReconcileError::OffChainPending {
                onchain_claim_id: claim.onchain_claim_id.clone(),
                tx_hash: claim.onchain_tx_hash.clone(),
                reason: e.to_string(),
            };
            self.pending.park(claim, &e).await;
            return Err(failure);
        }

        info!(
            claim_id = %claim.id,
            farmer_id = %claim.farmer_id,
            program_id = %program.id,
            amount = %claim.amount,
            "Claim submitted"
        );

        let claim = match request.evidence {
            Some(file) => match self.store_evidence(&claim, file).await {
                Ok(updated) => updated,
                Err(e) => {
                    warn!(claim_id = %claim.id, error = %e, "Evidence attach failed");
                    warnings.push(format!("evidence was not attached: {e}"));
                    claim
                }
            },
            None => claim,
        };

        Ok(ClaimSubmission {
            claim,
            farm_id: farm.id,
            warnings,
        })
    }

    /// Advance a claim's status. Requests for the current status are no-ops.
    ///
    /// Rejecting requires a non-empty reason.
    pub async fn advance_claim_status(
        &self,
        claim_id: &str,
        target: ClaimStatus,
        reason: Option<String>,
    ) -> Result<Claim> {
        let current = self.get_claim(claim_id).await?;
        if ClaimLifecycle::advance(current.status, target)? == ClaimAdvance::NoOp {
            debug!(claim_id, status = %current.status, "Claim already in requested status");
            return Ok(current);
        }

        let reason = match target {
            ClaimStatus::Rejected => Some(
                reason
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| ReconcileError::Validation("a rejection reason is required".to_string()))?,
            ),
            _ => None,
        };

        let cap = if target == ClaimStatus::Approved && self.config.caps.enforce_cumulative_cap {
            self.cumulative_cap(&current).await?
        } else {
            None
        };

        let (before, after) = self
            .claims
            .mutate_claim(
                claim_id,
                Box::new(move |claim: &mut Claim| {
                    // Re-resolve against the stored row; it may have moved since it was read.
                    if let ClaimAdvance::Apply(next) = ClaimLifecycle::advance(claim.status, target)? {
                        let now = Utc::now();
                        claim.status = next;
                        match next {
                            ClaimStatus::Approved => claim.approved_at = Some(now),
                            ClaimStatus::Disbursed => claim.paid_at = Some(now),
                            ClaimStatus::Rejected => claim.rejection_reason = reason,
                            ClaimStatus::Pending => {}
                        }
                    }
                    Ok(())
                }),
                cap,
            )
            .await?;

        if before.status != after.status {
            info!(
                claim_id,
                from = %before.status,
                to = %after.status,
                amount = %after.amount,
                "Claim status advanced"
            );
            self.notifier.emit(NotificationEvent::new(
                after.farmer_id.clone(),
                NotificationKind::ClaimStatusChanged {
                    claim_id: after.id.clone(),
                    program_id: after.program_id.clone(),
                    status: after.status,
                },
            ));
        }

        Ok(after)
    }

    pub async fn approve_claim(&self, claim_id: &str) -> Result<Claim> {
        self.advance_claim_status(claim_id, ClaimStatus::Approved, None).await
    }

    pub async fn reject_claim(&self, claim_id: &str, reason: impl Into<String>) -> Result<Claim> {
        self.advance_claim_status(claim_id, ClaimStatus::Rejected, Some(reason.into()))
            .await
    }

    pub async fn disburse_claim(&self, claim_id: &str) -> Result<Claim> {
        self.advance_claim_status(claim_id, ClaimStatus::Disbursed, None).await
    }

    /// Attach or replace evidence on a PENDING claim.
    pub async fn attach_evidence(&self, claim_id: &str, file: EvidenceFile) -> Result<Claim> {
        file.validate(&self.config.evidence)?;
        let claim = self.get_claim(claim_id).await?;
        if claim.status != ClaimStatus::Pending {
            return Err(ReconcileError::Validation(format!(
                "evidence can only be attached to PENDING claims, claim {} is {}",
                claim.id, claim.status
            )));
        }
        self.store_evidence(&claim, file).await
    }

    /// Enroll a farmer in an ACTIVE program.
    pub async fn enroll_farmer(&self, farmer_id: &str, program_id: &str) -> Result<EnrollmentReceipt> {
        let program = self.load_program(program_id).await?;
        if !program.accepts_claims() {
            return Err(ReconcileError::ProgramNotActive {
                program_id: program.id,
                status: program.status,
            });
        }
        self.enroll_and_anchor(farmer_id, &program).await
    }

    pub async fn get_claim(&self, claim_id: &str) -> Result<Claim> {
        self.claims
            .get_claim(claim_id)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Claim", claim_id))
    }

    /// Filtered, paginated listing, newest first.
    pub async fn list_claims(&self, filter: &ClaimFilter, pagination: Pagination) -> Result<Page<Claim>> {
        self.claims
            .list_claims(filter, pagination.normalized(&self.config.listing))
            .await
    }

    /// Claims committed on-chain that are waiting to be stored.
    pub async fn pending_reconciliations(&self) -> Vec<PendingClaim> {
        self.pending.list().await
    }

    /// Retry storing a parked claim.
    pub async fn resolve_pending(&self, onchain_claim_id: &str) -> Result<Claim> {
        self.pending.resolve(onchain_claim_id, self.claims.as_ref()).await
    }

    async fn load_program(&self, program_id: &str) -> Result<Program> {
        self.programs
            .get_program(program_id)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Program", program_id))
    }

    /// First verified farm that satisfies the program's rules.
    ///
    /// When none does, reports the farm with the fewest unmet requirements.
    async fn eligible_farm(&self, farmer_id: &str, program: &Program) -> Result<Farm> {
        let farms = self.farms.farms_for_farmer(farmer_id).await?;
        let rules = program.eligibility.clone().unwrap_or_default();

        let mut closest: Option<(&Farm, Vec<IneligibilityReason>)> = None;
        for farm in farms.iter().filter(|f| f.is_verified()) {
            let reasons = EligibilityEvaluator::evaluate(&rules, farm);
            if reasons.is_empty() {
                return Ok(farm.clone());
            }
            if closest.as_ref().map_or(true, |(_, best)| reasons.len() < best.len()) {
                closest = Some((farm, reasons));
            }
        }

        let (farm_id, reasons) = match closest {
            Some((farm, reasons)) => (Some(farm.id.clone()), reasons),
            None => (None, vec![IneligibilityReason::NoVerifiedFarm]),
        };
        debug!(farmer_id, program_id = %program.id, reasons = reasons.len(), "Farmer not eligible");
        Err(ReconcileError::Ineligible { farm_id, reasons })
    }

    /// Off-chain upsert, then best-effort ledger enrollment for unanchored rows.
    async fn enroll_and_anchor(&self, farmer_id: &str, program: &Program) -> Result<EnrollmentReceipt> {
        let outcome = self.registry.enroll(farmer_id, program).await?;
        let mut receipt = EnrollmentReceipt {
            enrollment: outcome.enrollment,
            newly_enrolled: outcome.newly_enrolled,
            warnings: Vec::new(),
        };

        // Anchor any row still missing a tx hash, so a failed or late anchor is retried.
        let anchor = match (&program.onchain_id, &receipt.enrollment.onchain_tx_hash) {
            (Some(anchor), None) => anchor,
            _ => return Ok(receipt),
        };

        match self.ledger.enroll_in_program(anchor).await {
            Ok(tx_hash) => match self.registry.record_anchor(farmer_id, &program.id, &tx_hash).await {
                Ok(()) => {
                    debug!(farmer_id, program_id = %program.id, tx_hash = %tx_hash, "Enrollment anchored");
                    receipt.enrollment.onchain_tx_hash = Some(tx_hash);
                }
                Err(e) => {
                    warn!(farmer_id, program_id = %program.id, tx_hash = %tx_hash, error = %e, "Enrollment tx not recorded");
                    receipt
                        .warnings
                        .push(format!("ledger enrollment {tx_hash} was not recorded: {e}"));
                }
            },
            Err(e) => {
                warn!(farmer_id, program_id = %program.id, error = %e, "Ledger enrollment failed");
                receipt.warnings.push(format!("ledger enrollment failed: {e}"));
            }
        }

        Ok(receipt)
    }

    async fn cumulative_cap(&self, claim: &Claim) -> Result<Option<Decimal>> {
        let Some(program_id) = &claim.program_id else {
            return Ok(None);
        };
        let program = self.load_program(program_id).await?;
        Ok(program.payout_rule.map(|rule| rule.max_cap))
    }

    /// Store an artifact and point the claim at it, releasing the one it replaces.
    async fn store_evidence(&self, claim: &Claim, file: EvidenceFile) -> Result<Claim> {
        let reference = self.evidence.put(&claim.id, file).await?;

        let new_reference = reference.clone();
        let result = self
            .claims
            .mutate_claim(
                &claim.id,
                Box::new(move |c: &mut Claim| {
                    if c.status != ClaimStatus::Pending {
                        return Err(ReconcileError::Validation(format!(
                            "evidence can only be attached to PENDING claims, claim {} is {}",
                            c.id, c.status
                        )));
                    }
                    c.evidence_ref = Some(new_reference);
                    Ok(())
                }),
                None,
            )
            .await;

        match result {
            Ok((before, after)) => {
                if let Some(old) = before.evidence_ref.filter(|old| *old != reference) {
                    if let Err(e) = self.evidence.release(&old).await {
                        warn!(claim_id = %claim.id, reference = %old, error = %e, "Old evidence not released");
                    }
                }
                info!(claim_id = %claim.id, reference = %reference, "Evidence attached");
                Ok(after)
            }
            Err(e) => {
                if let Err(release_err) = self.evidence.release(&reference).await {
                    warn!(claim_id = %claim.id, reference = %reference, error = %release_err, "Orphaned evidence not released");
                }
                Err(e)
            }
        }
    }
}
