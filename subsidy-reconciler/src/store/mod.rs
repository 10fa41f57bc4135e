//! Storage boundary.
//!
//! The engine owns no persistence of its own. Programs, enrollments and
//! claims live behind these traits; farms and farmer profiles are read from
//! an external directory. Every mutation that must be atomic is a single
//! trait call, so an implementation can map it to one transaction.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use subsidy_core::{Claim, ClaimStatus, Enrollment, Farm, Program, ProgramStatus, ProgramType};

use crate::config::ListingConfig;
use crate::error::Result;

pub use memory::MemoryStore;

/// A mutation applied to a copy of a program. The stored row is replaced
/// only when the mutation returns `Ok`.
pub type ProgramMutation = Box<dyn FnOnce(&mut Program) -> Result<()> + Send>;

/// A mutation applied to a copy of a claim, same contract as [`ProgramMutation`].
pub type ClaimMutation = Box<dyn FnOnce(&mut Claim) -> Result<()> + Send>;

/// Page request. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    /// Clamp to the configured bounds. A zero limit means "default".
    pub fn normalized(self, listing: &ListingConfig) -> Self {
        let limit = match self.limit {
            0 => listing.default_limit,
            n => n.min(listing.max_limit),
        };
        Self {
            page: self.page.max(1),
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.limit as usize
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 0 }
    }
}

/// One page of results. `total` counts every match, not just this page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    /// Slice an already-filtered, already-ordered result set.
    pub fn from_sorted(all: Vec<T>, pagination: Pagination) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.limit as usize)
            .collect();
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
        }
    }

    /// Number of pages needed for `total` items.
    pub fn total_pages(&self) -> usize {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(self.limit as usize)
    }
}

/// Program listing filter. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramFilter {
    pub status: Option<ProgramStatus>,
    pub program_type: Option<ProgramType>,
    pub creator_id: Option<String>,
    /// Case-insensitive substring of name or description
    pub search: Option<String>,
}

impl ProgramFilter {
    pub fn matches(&self, program: &Program) -> bool {
        if self.status.is_some_and(|s| s != program.status) {
            return false;
        }
        if self.program_type.is_some_and(|t| t != program.program_type) {
            return false;
        }
        if let Some(creator) = &self.creator_id {
            if &program.creator_id != creator {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                program.name.to_lowercase().contains(&term)
                    || program.description.to_lowercase().contains(&term)
            }
            _ => true,
        }
    }
}

/// Claim listing filter. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimFilter {
    pub farmer_id: Option<String>,
    pub program_id: Option<String>,
    pub status: Option<ClaimStatus>,
}

impl ClaimFilter {
    pub fn for_farmer(farmer_id: impl Into<String>) -> Self {
        Self {
            farmer_id: Some(farmer_id.into()),
            ..Default::default()
        }
    }

    pub fn for_program(program_id: impl Into<String>) -> Self {
        Self {
            program_id: Some(program_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, claim: &Claim) -> bool {
        if let Some(farmer) = &self.farmer_id {
            if &claim.farmer_id != farmer {
                return false;
            }
        }
        if let Some(program) = &self.program_id {
            if claim.program_id.as_ref() != Some(program) {
                return false;
            }
        }
        !self.status.is_some_and(|s| s != claim.status)
    }
}

/// Farmer identity as held by the farm registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmerProfile {
    pub id: String,
    pub name: String,
}

/// Result of an enrollment upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentUpsert {
    pub enrollment: Enrollment,
    /// Whether this call created the row
    pub created: bool,
}

/// Program persistence.
#[async_trait]
pub trait ProgramStore: Send + Sync {
    async fn insert_program(&self, program: Program) -> Result<()>;

    async fn get_program(&self, id: &str) -> Result<Option<Program>>;

    /// Atomically apply `mutation`. Returns (before, after).
    async fn mutate_program(&self, id: &str, mutation: ProgramMutation) -> Result<(Program, Program)>;

    /// Filtered listing, newest first.
    async fn list_programs(&self, filter: &ProgramFilter, pagination: Pagination) -> Result<Page<Program>>;
}

/// Enrollment persistence. At most one row per (farmer, program).
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Insert or refresh `enrolled_at` in one step.
    async fn upsert_enrollment(
        &self,
        farmer_id: &str,
        program_id: &str,
        at: DateTime<Utc>,
    ) -> Result<EnrollmentUpsert>;

    async fn get_enrollment(&self, farmer_id: &str, program_id: &str) -> Result<Option<Enrollment>>;

    /// Record the ledger transaction that anchored an enrollment.
    async fn set_enrollment_tx(&self, farmer_id: &str, program_id: &str, tx_hash: &str) -> Result<()>;

    async fn list_enrollments(&self, program_id: &str) -> Result<Vec<Enrollment>>;
}

/// Claim persistence.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Insert a claim. Fails if the on-chain claim id is already stored.
    async fn insert_claim(&self, claim: Claim) -> Result<()>;

    async fn get_claim(&self, id: &str) -> Result<Option<Claim>>;

    async fn find_by_onchain_id(&self, onchain_claim_id: &str) -> Result<Option<Claim>>;

    /// Atomically apply `mutation`. Returns (before, after).
    ///
    /// With `cumulative_cap` set, a mutation that moves the claim into a
    /// cap-consuming status is rejected with `CapExceeded` when the farmer's
    /// approved and disbursed total under the program would pass the cap.
    /// The check and the write happen together.
    async fn mutate_claim(
        &self,
        id: &str,
        mutation: ClaimMutation,
        cumulative_cap: Option<Decimal>,
    ) -> Result<(Claim, Claim)>;

    /// Filtered listing, newest first.
    async fn list_claims(&self, filter: &ClaimFilter, pagination: Pagination) -> Result<Page<Claim>>;

    /// Every claim matching `filter`, unpaginated.
    async fn scan_claims(&self, filter: &ClaimFilter) -> Result<Vec<Claim>>;
}

/// Read-only view of the farm registry.
#[async_trait]
pub trait FarmDirectory: Send + Sync {
    async fn farms_for_farmer(&self, farmer_id: &str) -> Result<Vec<Farm>>;

    async fn farmer_profile(&self, farmer_id: &str) -> Result<Option<FarmerProfile>>;
}

/// The storage handles the engine is wired with.
#[derive(Clone)]
pub struct Stores {
    pub programs: Arc<dyn ProgramStore>,
    pub enrollments: Arc<dyn EnrollmentStore>,
    pub claims: Arc<dyn ClaimStore>,
    pub farms: Arc<dyn FarmDirectory>,
}

impl Stores {
    /// Back every store with one in-memory instance.
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            programs: store.clone(),
            enrollments: store.clone(),
            claims: store.clone(),
            farms: store,
        }
    }
}
