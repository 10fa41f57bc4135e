//! Program administration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use subsidy_core::validation::{apply_patch, validate_definition};
use subsidy_core::{
    ClaimStatus, Program, ProgramDefinition, ProgramLifecycle, ProgramPatch, ProgramStatus, StatusChange,
};

use crate::config::ListingConfig;
use crate::error::{ReconcileError, Result};
use crate::store::{ClaimFilter, ClaimStore, Page, Pagination, ProgramFilter, ProgramStore};

/// Count and total amount of claims in one status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusTotals {
    pub count: usize,
    pub amount: Decimal,
}

/// Claim totals for a program, per status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramClaimSummary {
    pub program_id: String,
    pub by_status: BTreeMap<String, StatusTotals>,
    pub total_claims: usize,
    /// Approved plus disbursed
    pub committed_amount: Decimal,
}

/// Result of a status update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramUpdate {
    pub program: Program,
    pub change: StatusChange,
}

/// Creates, updates and lists programs.
#[derive(Clone)]
pub struct ProgramService {
    programs: Arc<dyn ProgramStore>,
    claims: Arc<dyn ClaimStore>,
    listing: ListingConfig,
}

impl ProgramService {
    pub fn new(programs: Arc<dyn ProgramStore>, claims: Arc<dyn ClaimStore>, listing: ListingConfig) -> Self {
        Self {
            programs,
            claims,
            listing,
        }
    }

    /// Validate and persist a new program.
    pub async fn create_program(&self, definition: ProgramDefinition) -> Result<Program> {
        validate_definition(&definition)?;
        let program = Program::from_definition(definition);
        self.programs.insert_program(program.clone()).await?;

        info!(
            program_id = %program.id,
            name = %program.name,
            status = %program.status,
            creator = %program.creator_id,
            "Program created"
        );
        Ok(program)
    }

    pub async fn get_program(&self, id: &str) -> Result<Program> {
        self.programs
            .get_program(id)
            .await?
            .ok_or_else(|| ReconcileError::not_found("Program", id))
    }

    /// Move a program through its lifecycle, optionally recording its ledger anchor.
    ///
    /// Requests for the current status succeed without a write.
    pub async fn update_program_status(
        &self,
        id: &str,
        status: ProgramStatus,
        onchain_id: Option<String>,
    ) -> Result<ProgramUpdate> {
        let (before, after) = self
            .programs
            .mutate_program(
                id,
                Box::new(move |program: &mut Program| {
                    ProgramLifecycle::apply(program, status, onchain_id)?;
                    Ok(())
                }),
            )
            .await?;

        let change = StatusChange {
            previous: before.status,
            current: after.status,
            anchor_changed: before.onchain_id != after.onchain_id,
        };

        if change.is_noop() {
            debug!(program_id = %id, status = %after.status, "Program status unchanged");
        } else {
            info!(
                program_id = %id,
                from = %change.previous,
                to = %change.current,
                onchain_id = ?after.onchain_id,
                "Program status updated"
            );
        }

        Ok(ProgramUpdate { program: after, change })
    }

    /// Edit descriptive fields and rules. Archived programs are frozen.
    pub async fn update_program(&self, id: &str, patch: ProgramPatch) -> Result<Program> {
        let (_, after) = self
            .programs
            .mutate_program(
                id,
                Box::new(move |program: &mut Program| {
                    if program.status == ProgramStatus::Archived {
                        return Err(ReconcileError::Validation(format!(
                            "program {} is archived and cannot be modified",
                            program.id
                        )));
                    }
                    *program = apply_patch(program, patch)?;
                    Ok(())
                }),
            )
            .await?;

        info!(program_id = %id, "Program updated");
        Ok(after)
    }

    /// Filtered, paginated listing, newest first.
    pub async fn list_programs(&self, filter: &ProgramFilter, pagination: Pagination) -> Result<Page<Program>> {
        self.programs
            .list_programs(filter, pagination.normalized(&self.listing))
            .await
    }

    /// Claim counts and amounts per status.
    pub async fn program_claim_summary(&self, id: &str) -> Result<ProgramClaimSummary> {
        let program = self.get_program(id).await?;
        let claims = self.claims.scan_claims(&ClaimFilter::for_program(&program.id)).await?;

        let mut by_status: BTreeMap<String, StatusTotals> = [
            ClaimStatus::Pending,
            ClaimStatus::Approved,
            ClaimStatus::Rejected,
            ClaimStatus::Disbursed,
        ]
        .iter()
        .map(|s| (s.as_str().to_string(), StatusTotals::default()))
        .collect();

        let mut committed_amount = Decimal::ZERO;
        for claim in &claims {
            let totals = by_status.entry(claim.status.as_str().to_string()).or_default();
            totals.count += 1;
            totals.amount += claim.amount;
            if claim.status.consumes_cap() {
                committed_amount += claim.amount;
            }
        }

        Ok(ProgramClaimSummary {
            program_id: program.id,
            by_status,
            total_claims: claims.len(),
            committed_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use subsidy_core::{PayoutRule, ProgramType};

    fn service() -> ProgramService {
        let store = Arc::new(MemoryStore::new());
        ProgramService::new(store.clone(), store, ListingConfig::default())
    }

    fn definition(name: &str, program_type: ProgramType) -> ProgramDefinition {
        let start = Utc::now();
        ProgramDefinition {
            name: name.to_string(),
            description: format!("{name} description"),
            program_type,
            start_date: start,
            end_date: start + chrono::Duration::days(60),
            status: None,
            onchain_id: None,
            creator_id: "agency-1".to_string(),
            eligibility: None,
            payout_rule: Some(PayoutRule::capped(Decimal::new(15_000, 0))),
        }
    }

    #[tokio::test]
    async fn test_create_defaults_to_draft() {
        let service = service();
        let program = service
            .create_program(definition("Drought Aid", ProgramType::Drought))
            .await
            .unwrap();
        assert_eq!(program.status, ProgramStatus::Draft);
        assert_eq!(service.get_program(&program.id).await.unwrap(), program);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_dates() {
        let service = service();
        let mut d = definition("Drought Aid", ProgramType::Drought);
        d.end_date = d.start_date - chrono::Duration::days(1);
        let err = service.create_program(d).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Validation(_)));
    }

    #[tokio::test]
    async fn test_status_lifecycle() {
        let service = service();
        let program = service
            .create_program(definition("Flood Aid", ProgramType::Flood))
            .await
            .unwrap();

        let update = service
            .update_program_status(&program.id, ProgramStatus::Active, Some("42".to_string()))
            .await
            .unwrap();
        assert!(update.change.status_changed());
        assert!(update.change.anchor_changed);
        assert_eq!(update.program.onchain_id.as_deref(), Some("42"));

        let again = service
            .update_program_status(&program.id, ProgramStatus::Active, None)
            .await
            .unwrap();
        assert!(again.change.is_noop());
        assert_eq!(again.program.updated_at, update.program.updated_at);

        let err = service
            .update_program_status(&program.id, ProgramStatus::Draft, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::IllegalTransition { .. }));
        assert_eq!(
            service.get_program(&program.id).await.unwrap().status,
            ProgramStatus::Active
        );
    }

    #[tokio::test]
    async fn test_archived_program_is_frozen() {
        let service = service();
        let program = service
            .create_program(definition("Crop Aid", ProgramType::CropLoss))
            .await
            .unwrap();
        service
            .update_program_status(&program.id, ProgramStatus::Archived, None)
            .await
            .unwrap();

        let patch = ProgramPatch {
            name: Some("Renamed".to_string()),
            ..Default::default()
        };
        assert!(service.update_program(&program.id, patch).await.is_err());
        assert!(service
            .update_program_status(&program.id, ProgramStatus::Active, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_filters_and_paginates() {
        let service = service();
        for i in 0..25 {
            let program_type = if i % 5 == 0 { ProgramType::Flood } else { ProgramType::Drought };
            service
                .create_program(definition(&format!("Program {i}"), program_type))
                .await
                .unwrap();
        }

        let page = service
            .list_programs(&ProgramFilter::default(), Pagination::new(2, 0))
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.limit, 20);

        let floods = service
            .list_programs(
                &ProgramFilter {
                    program_type: Some(ProgramType::Flood),
                    ..Default::default()
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        assert_eq!(floods.total, 5);

        let search = service
            .list_programs(
                &ProgramFilter {
                    search: Some("program 1".to_string()),
                    ..Default::default()
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        // "Program 1" and "Program 10".."Program 19"
        assert_eq!(search.total, 11);
    }

    #[tokio::test]
    async fn test_unknown_program() {
        let err = service().get_program("missing").await.unwrap_err();
        assert!(matches!(err, ReconcileError::NotFound { entity: "Program", .. }));
    }
}
