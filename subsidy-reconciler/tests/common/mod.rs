#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use subsidy_core::{
    Claim, Eligibility, Farm, FarmVerification, PayoutRule, Program, ProgramDefinition, ProgramStatus, ProgramType,
};
use subsidy_ledger::MockLedger;
use subsidy_reconciler::store::ClaimMutation;
use subsidy_reconciler::evidence::StoredEvidence;
use subsidy_reconciler::{
    ClaimFilter, ClaimStore, EvidenceFile, EvidenceStore, FarmerProfile, MemoryEvidenceStore, MemoryStore, Page, Pagination, ReconcileError,
    ReconcilerConfig, RecordingSink, Result, Stores, SubsidyEngine,
};

pub const PROGRAM_ANCHOR: &str = "42";

pub struct Harness {
    pub engine: SubsidyEngine,
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<MockLedger>,
    pub evidence: Arc<MemoryEvidenceStore>,
    pub sink: Arc<RecordingSink>,
}

pub fn harness(config: ReconcilerConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    harness_with_stores(config, store.clone(), Stores::memory(store))
}

pub fn harness_with_stores(config: ReconcilerConfig, store: Arc<MemoryStore>, stores: Stores) -> Harness {
    let evidence = Arc::new(MemoryEvidenceStore::new());
    build_harness(config, store, stores, evidence.clone(), evidence)
}

/// Harness whose evidence uploads always fail. `evidence` is the backing store.
pub fn harness_with_failing_evidence(config: ReconcilerConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let evidence = Arc::new(MemoryEvidenceStore::new());
    let failing = Arc::new(FailingEvidenceStore {
        inner: evidence.clone(),
    });
    build_harness(config, store.clone(), Stores::memory(store), evidence, failing)
}

fn build_harness(
    config: ReconcilerConfig,
    store: Arc<MemoryStore>,
    stores: Stores,
    evidence: Arc<MemoryEvidenceStore>,
    engine_evidence: Arc<dyn EvidenceStore>,
) -> Harness {
    let ledger = Arc::new(MockLedger::new("test-ledger"));
    let sink = Arc::new(RecordingSink::new());

    let engine = SubsidyEngine::new(config, stores, ledger.clone(), engine_evidence, sink.clone());

    Harness {
        engine,
        store,
        ledger,
        evidence,
        sink,
    }
}

pub fn money(units: i64) -> Decimal {
    Decimal::new(units, 0)
}

pub fn definition(eligibility: Option<Eligibility>, rule: Option<PayoutRule>) -> ProgramDefinition {
    let start = Utc::now();
    ProgramDefinition {
        name: "Kedah Flood Relief".to_string(),
        description: "Compensation for paddy lost to monsoon flooding".to_string(),
        program_type: ProgramType::Flood,
        start_date: start,
        end_date: start + chrono::Duration::days(90),
        status: None,
        onchain_id: None,
        creator_id: "agency-kedah".to_string(),
        eligibility,
        payout_rule: rule,
    }
}

/// Create a program, activate it and anchor it on the ledger.
pub async fn active_program(h: &Harness, eligibility: Option<Eligibility>, rule: PayoutRule) -> Program {
    let program = h
        .engine
        .programs
        .create_program(definition(eligibility, Some(rule)))
        .await
        .unwrap();
    h.engine
        .programs
        .update_program_status(&program.id, ProgramStatus::Active, Some(PROGRAM_ANCHOR.to_string()))
        .await
        .unwrap()
        .program
}

pub fn kedah_rules() -> Eligibility {
    Eligibility {
        min_farm_size: Some(5.0),
        max_farm_size: Some(50.0),
        states: vec!["Kedah".to_string()],
        ..Default::default()
    }
}

pub fn farm(id: &str, farmer_id: &str, size: f64, state: &str) -> Farm {
    Farm {
        id: id.to_string(),
        farmer_id: farmer_id.to_string(),
        size,
        state: state.to_string(),
        district: "Kota Setar".to_string(),
        crop_categories: vec!["Paddy".to_string()],
        land_document_types: vec!["geran".to_string()],
        verification: FarmVerification::Verified,
    }
}

/// Register a farmer with one verified 20 ha farm in Kedah.
pub fn register_farmer(h: &Harness, farmer_id: &str) {
    h.store.add_farmer(FarmerProfile {
        id: farmer_id.to_string(),
        name: format!("Farmer {farmer_id}"),
    });
    h.store.add_farm(farm(&format!("{farmer_id}-farm"), farmer_id, 20.0, "Kedah"));
}

/// Claim store that fails a scripted number of inserts.
pub struct FlakyClaimStore {
    pub inner: Arc<MemoryStore>,
    failing_inserts: AtomicU32,
}

impl FlakyClaimStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing_inserts: AtomicU32::new(0),
        }
    }

    pub fn fail_inserts(&self, count: u32) {
        self.failing_inserts.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClaimStore for FlakyClaimStore {
    async fn insert_claim(&self, claim: Claim) -> Result<()> {
        let remaining = self.failing_inserts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_inserts.store(remaining - 1, Ordering::SeqCst);
            return Err(ReconcileError::Storage("connection refused".to_string()));
        }
        self.inner.insert_claim(claim).await
    }

    async fn get_claim(&self, id: &str) -> Result<Option<Claim>> {
        self.inner.get_claim(id).await
    }

    async fn find_by_onchain_id(&self, onchain_claim_id: &str) -> Result<Option<Claim>> {
        self.inner.find_by_onchain_id(onchain_claim_id).await
    }

    async fn mutate_claim(
        &self,
        id: &str,
        mutation: ClaimMutation,
        cumulative_cap: Option<Decimal>,
    ) -> Result<(Claim, Claim)> {
        self.inner.mutate_claim(id, mutation, cumulative_cap).await
    }

    async fn list_claims(&self, filter: &ClaimFilter, pagination: Pagination) -> Result<Page<Claim>> {
        self.inner.list_claims(filter, pagination).await
    }

    async fn scan_claims(&self, filter: &ClaimFilter) -> Result<Vec<Claim>> {
        self.inner.scan_claims(filter).await
    }
}

/// Evidence store whose uploads fail.
pub struct FailingEvidenceStore {
    pub inner: Arc<MemoryEvidenceStore>,
}

#[async_trait]
impl EvidenceStore for FailingEvidenceStore {
    async fn put(&self, _claim_id: &str, _file: EvidenceFile) -> Result<String> {
        Err(ReconcileError::Evidence("bucket unavailable".to_string()))
    }

    async fn release(&self, reference: &str) -> Result<()> {
        self.inner.release(reference).await
    }

    async fn describe(&self, reference: &str) -> Result<Option<StoredEvidence>> {
        self.inner.describe(reference).await
    }
}
