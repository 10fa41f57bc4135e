//! Subsidy Reconciler - keeps off-chain claim records in lockstep with the ledger
//!
//! Drives the claim pipeline for agricultural subsidy programs:
//!
//! - **Programs**: creation, editing, lifecycle and listing
//! - **Enrollment**: one row per (farmer, program), creator notified once
//! - **Claims**: eligibility → enrollment → on-chain commitment → storage → evidence
//! - **Reconciliation**: parked claims, integrity audits against the ledger
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      SubsidyEngine                        │
//! │                                                           │
//! │  ┌────────────────┐  ┌─────────────────┐  ┌───────────┐  │
//! │  │ ProgramService │  │ ClaimReconciler │  │ AuditPass │  │
//! │  └───────┬────────┘  └──┬───────────┬──┘  └─────┬─────┘  │
//! │          │              │           │           │        │
//! │          │     ┌────────▼───────┐   │   ┌───────▼──────┐ │
//! │          │     │ Enrollment     │   └──►│ LedgerGateway│ │
//! │          │     │ Registry       │       └───────┬──────┘ │
//! │          │     └────────┬───────┘               │        │
//! │  ┌───────▼──────────────▼──────┐   ┌────────────▼──────┐ │
//! │  │     Stores (traits)         │   │ dyn LedgerClient  │ │
//! │  └─────────────────────────────┘   └───────────────────┘ │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod config;
pub mod engine;
pub mod enrollment;
pub mod error;
pub mod evidence;
pub mod gateway;
pub mod notification;
pub mod pending;
pub mod program;
pub mod reconciler;
pub mod store;

// Re-export main types
pub use audit::{AuditPass, AuditReport, FindingKind, IntegrityFinding};
pub use config::ReconcilerConfig;
pub use engine::SubsidyEngine;
pub use enrollment::{EnrollmentOutcome, EnrollmentRegistry};
pub use error::{ErrorCategory, ReconcileError, Result};
pub use evidence::{EvidenceFile, EvidenceStore, MemoryEvidenceStore};
pub use gateway::LedgerGateway;
pub use notification::{
    LoggingSink, NotificationDispatcher, NotificationEvent, NotificationKind, NotificationSink, RecordingSink,
};
pub use pending::{PendingClaim, PendingReconciliations};
pub use program::{ProgramClaimSummary, ProgramService, ProgramUpdate, StatusTotals};
pub use reconciler::{ClaimReconciler, ClaimRequest, ClaimSubmission, EnrollmentReceipt};
pub use store::{
    ClaimFilter, ClaimStore, EnrollmentStore, FarmDirectory, FarmerProfile, MemoryStore, Page, Pagination,
    ProgramFilter, ProgramStore, Stores,
};
