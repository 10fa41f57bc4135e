//! Ledger client for subsidy claim commitments.
//!
//! The ledger is the source of truth for payment authorization. This crate
//! defines the contract the reconciler depends on and ships two backends:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           ClaimReconciler               │
//! └────────────────┬────────────────────────┘
//!                  │ dyn LedgerClient
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌──────────────┐      ┌─────────────┐
//! │HttpLedger    │      │ MockLedger  │
//! │Client        │      │ (tests)     │
//! │(relayer)     │      │             │
//! └──────────────┘      └─────────────┘
//! ```

pub mod backend;
pub mod traits;

pub use backend::{HttpLedgerClient, MockLedger};
pub use traits::{ClaimReceipt, LedgerClient, LedgerError};
