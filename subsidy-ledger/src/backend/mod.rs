//! Ledger backends.
//!
//! - HTTP relayer fronting the claim contract
//! - Mock ledger for testing

pub mod http;
pub mod mock;

pub use http::HttpLedgerClient;
pub use mock::MockLedger;
