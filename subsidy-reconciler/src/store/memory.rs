//! In-memory storage backed by `DashMap`.
//!
//! Implements every storage trait. Used by tests and by single-process
//! deployments that rebuild state from the ledger on start.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::debug;

use subsidy_core::{Claim, Enrollment, Farm, PayoutRule, Program};

use super::*;
use crate::error::{ReconcileError, Result};

/// In-memory store.
pub struct MemoryStore {
    programs: DashMap<String, Program>,
    enrollments: DashMap<(String, String), Enrollment>,
    claims: DashMap<String, Claim>,
    /// on-chain claim id -> claim id
    onchain_index: DashMap<String, String>,
    farms: DashMap<String, Vec<Farm>>,
    farmers: DashMap<String, FarmerProfile>,
    /// Serializes cap-checked claim mutations
    cap_guard: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            programs: DashMap::new(),
            enrollments: DashMap::new(),
            claims: DashMap::new(),
            onchain_index: DashMap::new(),
            farms: DashMap::new(),
            farmers: DashMap::new(),
            cap_guard: Mutex::new(()),
        }
    }

    /// Register a farm with the directory.
    pub fn add_farm(&self, farm: Farm) {
        self.farms.entry(farm.farmer_id.clone()).or_default().push(farm);
    }

    /// Register a farmer profile with the directory.
    pub fn add_farmer(&self, profile: FarmerProfile) {
        self.farmers.insert(profile.id.clone(), profile);
    }

    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    /// Approved + disbursed total for a farmer under a program, excluding `skip_id`.
    fn committed_total(&self, farmer_id: &str, program_id: Option<&str>, skip_id: &str) -> Decimal {
        self.claims
            .iter()
            .filter(|c| {
                c.id != skip_id
                    && c.farmer_id == farmer_id
                    && c.program_id.as_deref() == program_id
                    && c.status.consumes_cap()
            })
            .map(|c| c.amount)
            .sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgramStore for MemoryStore {
    async fn insert_program(&self, program: Program) -> Result<()> {
        match self.programs.entry(program.id.clone()) {
            Entry::Occupied(_) => Err(ReconcileError::Storage(format!(
                "program {} already exists",
                program.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(program);
                Ok(())
            }
        }
    }

    async fn get_program(&self, id: &str) -> Result<Option<Program>> {
        Ok(self.programs.get(id).map(|p| p.clone()))
    }

    async fn mutate_program(&self, id: &str, mutation: ProgramMutation) -> Result<(Program, Program)> {
        let mut stored = self
            .programs
            .get_mut(id)
            .ok_or_else(|| ReconcileError::not_found("Program", id))?;

        let before = stored.clone();
        let mut after = before.clone();
        mutation(&mut after)?;
        *stored = after.clone();
        Ok((before, after))
    }

    async fn list_programs(&self, filter: &ProgramFilter, pagination: Pagination) -> Result<Page<Program>> {
        let mut matching: Vec<Program> = self
            .programs
            .iter()
            .filter(|p| filter.matches(p))
            .map(|p| p.clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(Page::from_sorted(matching, pagination))
    }
}

#[async_trait]
impl EnrollmentStore for MemoryStore {
    async fn upsert_enrollment(
        &self,
        farmer_id: &str,
        program_id: &str,
        at: DateTime<Utc>,
    ) -> Result<EnrollmentUpsert> {
        let key = (farmer_id.to_string(), program_id.to_string());
        let (enrollment, created) = match self.enrollments.entry(key) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().enrolled_at = at;
                (existing.get().clone(), false)
            }
            Entry::Vacant(slot) => {
                let enrollment = Enrollment {
                    farmer_id: farmer_id.to_string(),
                    program_id: program_id.to_string(),
                    enrolled_at: at,
                    onchain_tx_hash: None,
                };
                slot.insert(enrollment.clone());
                (enrollment, true)
            }
        };

        debug!(farmer_id, program_id, created, "Enrollment upserted");
        Ok(EnrollmentUpsert {
            enrollment,
            created,
        })
    }

    async fn get_enrollment(&self, farmer_id: &str, program_id: &str) -> Result<Option<Enrollment>> {
        let key = (farmer_id.to_string(), program_id.to_string());
        Ok(self.enrollments.get(&key).map(|e| e.clone()))
    }

    async fn set_enrollment_tx(&self, farmer_id: &str, program_id: &str, tx_hash: &str) -> Result<()> {
        let key = (farmer_id.to_string(), program_id.to_string());
        let mut enrollment = self
            .enrollments
            .get_mut(&key)
            .ok_or_else(|| ReconcileError::not_found("Enrollment", format!("{farmer_id}/{program_id}")))?;
        enrollment.onchain_tx_hash = Some(tx_hash.to_string());
        Ok(())
    }

    async fn list_enrollments(&self, program_id: &str) -> Result<Vec<Enrollment>> {
        let mut rows: Vec<Enrollment> = self
            .enrollments
            .iter()
            .filter(|e| e.program_id == program_id)
            .map(|e| e.clone())
            .collect();
        rows.sort_by(|a, b| a.enrolled_at.cmp(&b.enrolled_at));
        Ok(rows)
    }
}

#[async_trait]
impl ClaimStore for MemoryStore {
    async fn insert_claim(&self, claim: Claim) -> Result<()> {
        if self.claims.contains_key(&claim.id) {
            return Err(ReconcileError::Storage(format!("claim {} already exists", claim.id)));
        }
        match self.onchain_index.entry(claim.onchain_claim_id.clone()) {
            Entry::Occupied(existing) => Err(ReconcileError::Storage(format!(
                "on-chain claim {} already stored as {}",
                claim.onchain_claim_id,
                existing.get()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(claim.id.clone());
                self.claims.insert(claim.id.clone(), claim);
                Ok(())
            }
        }
    }

    async fn get_claim(&self, id: &str) -> Result<Option<Claim>> {
        Ok(self.claims.get(id).map(|c| c.clone()))
    }

    async fn find_by_onchain_id(&self, onchain_claim_id: &str) -> Result<Option<Claim>> {
        let id = match self.onchain_index.get(onchain_claim_id) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        self.get_claim(&id).await
    }

    async fn mutate_claim(
        &self,
        id: &str,
        mutation: ClaimMutation,
        cumulative_cap: Option<Decimal>,
    ) -> Result<(Claim, Claim)> {
        let _guard = match cumulative_cap {
            Some(_) => Some(self.cap_guard.lock().await),
            None => None,
        };

        // Sum before taking the row lock: iterating while holding a shard
        // write guard would deadlock.
        let committed = match cumulative_cap {
            Some(_) => {
                let owner = self
                    .claims
                    .get(id)
                    .map(|c| (c.farmer_id.clone(), c.program_id.clone()));
                owner.map(|(farmer, program)| self.committed_total(&farmer, program.as_deref(), id))
            }
            None => None,
        };

        let mut stored = self
            .claims
            .get_mut(id)
            .ok_or_else(|| ReconcileError::not_found("Claim", id))?;

        let before = stored.clone();
        let mut after = before.clone();
        mutation(&mut after)?;

        if let (Some(cap), Some(committed)) = (cumulative_cap, committed) {
            if !before.status.consumes_cap() && after.status.consumes_cap() {
                PayoutRule::capped(cap).check_cumulative(committed, after.amount)?;
            }
        }

        *stored = after.clone();
        Ok((before, after))
    }

    async fn list_claims(&self, filter: &ClaimFilter, pagination: Pagination) -> Result<Page<Claim>> {
        let matching = self.scan_claims(filter).await?;
        Ok(Page::from_sorted(matching, pagination))
    }

    async fn scan_claims(&self, filter: &ClaimFilter) -> Result<Vec<Claim>> {
        let mut matching: Vec<Claim> = self
            .claims
            .iter()
            .filter(|c| filter.matches(c))
            .map(|c| c.clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }
}

#[async_trait]
impl FarmDirectory for MemoryStore {
    async fn farms_for_farmer(&self, farmer_id: &str) -> Result<Vec<Farm>> {
        Ok(self.farms.get(farmer_id).map(|f| f.clone()).unwrap_or_default())
    }

    async fn farmer_profile(&self, farmer_id: &str) -> Result<Option<FarmerProfile>> {
        Ok(self.farmers.get(farmer_id).map(|f| f.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subsidy_core::{ClaimContext, ClaimStatus, MetadataHash};

    fn claim(id: &str, onchain: &str, amount: i64, status: ClaimStatus) -> Claim {
        Claim {
            id: id.to_string(),
            farmer_id: "farmer-1".to_string(),
            program_id: Some("program-1".to_string()),
            context: ClaimContext::Program,
            amount: Decimal::new(amount, 0),
            remarks: String::new(),
            status,
            onchain_claim_id: onchain.to_string(),
            onchain_tx_hash: format!("0x{onchain}"),
            metadata_hash: MetadataHash::from_bytes([1u8; 32]),
            submitted_at_ms: 0,
            rejection_reason: None,
            evidence_ref: None,
            created_at: Utc::now(),
            approved_at: None,
            paid_at: None,
        }
    }

    fn approve() -> ClaimMutation {
        Box::new(|c: &mut Claim| {
            c.status = ClaimStatus::Approved;
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_onchain_id_is_unique() {
        let store = MemoryStore::new();
        store.insert_claim(claim("a", "1", 10, ClaimStatus::Pending)).await.unwrap();

        let dup = store.insert_claim(claim("b", "1", 10, ClaimStatus::Pending)).await;
        assert!(matches!(dup, Err(ReconcileError::Storage(_))));
        assert_eq!(store.claim_count(), 1);

        let found = store.find_by_onchain_id("1").await.unwrap().unwrap();
        assert_eq!(found.id, "a");
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_row_untouched() {
        let store = MemoryStore::new();
        store.insert_claim(claim("a", "1", 10, ClaimStatus::Pending)).await.unwrap();

        let result = store
            .mutate_claim(
                "a",
                Box::new(|c: &mut Claim| {
                    c.remarks = "changed".to_string();
                    Err(ReconcileError::Validation("nope".to_string()))
                }),
                None,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(store.get_claim("a").await.unwrap().unwrap().remarks, "");
    }

    #[tokio::test]
    async fn test_cumulative_cap_checked_on_approval() {
        let store = MemoryStore::new();
        store.insert_claim(claim("a", "1", 600, ClaimStatus::Approved)).await.unwrap();
        store.insert_claim(claim("b", "2", 300, ClaimStatus::Pending)).await.unwrap();
        store.insert_claim(claim("c", "3", 200, ClaimStatus::Pending)).await.unwrap();

        let cap = Some(Decimal::new(1000, 0));
        store.mutate_claim("b", approve(), cap).await.unwrap();

        let err = store.mutate_claim("c", approve(), cap).await.unwrap_err();
        assert!(matches!(err, ReconcileError::CapExceeded { .. }));
        assert_eq!(
            store.get_claim("c").await.unwrap().unwrap().status,
            ClaimStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_enrollment_upsert_is_per_farmer() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let first = store.upsert_enrollment("f1", "p1", now).await.unwrap();
        assert!(first.created);

        let again = store.upsert_enrollment("f1", "p1", now).await.unwrap();
        assert!(!again.created);

        let second_farmer = store.upsert_enrollment("f2", "p1", now).await.unwrap();
        assert!(second_farmer.created);

        assert_eq!(store.list_enrollments("p1").await.unwrap().len(), 2);
    }
}
