//! Configuration for the reconciliation engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use subsidy_core::HashAlgorithm;

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Ledger call configuration
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Metadata commitment configuration
    #[serde(default)]
    pub commitment: CommitmentConfig,
    /// Payout cap configuration
    #[serde(default)]
    pub caps: CapConfig,
    /// Notification delivery configuration
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Evidence upload configuration
    #[serde(default)]
    pub evidence: EvidenceConfig,
    /// Listing/pagination configuration
    #[serde(default)]
    pub listing: ListingConfig,
    /// Integrity audit configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

impl ReconcilerConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Ledger call configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Timeout for a single ledger call, including inclusion wait (ms)
    pub timeout_ms: u64,
    /// Attempts per call for retryable failures (1 = no automatic retry)
    pub max_attempts: u32,
    /// Delay between attempts (ms)
    pub retry_delay_ms: u64,
}

impl LedgerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_attempts: 1,
            retry_delay_ms: 1000,
        }
    }
}

/// Metadata commitment configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitmentConfig {
    /// Digest the ledger contract expects
    pub algorithm: HashAlgorithm,
}

/// Payout cap configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapConfig {
    /// Also cap the approved + disbursed total per (farmer, program)
    pub enforce_cumulative_cap: bool,
}

/// Notification delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Deliver notifications at all
    pub enabled: bool,
    /// Queue size between producers and the delivery worker
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: 1024,
        }
    }
}

/// Evidence upload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Maximum artifact size in bytes
    pub max_bytes: usize,
    /// Accepted MIME types
    pub allowed_content_types: Vec<String>,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024, // 10 MiB
            allowed_content_types: vec![
                "application/pdf".to_string(),
                "image/png".to_string(),
                "image/jpeg".to_string(),
            ],
        }
    }
}

/// Pagination limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Page size when none is requested
    pub default_limit: u32,
    /// Largest page size honored
    pub max_limit: u32,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// Integrity audit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Also compare against the commitment stored on the ledger
    pub check_ledger: bool,
    /// Concurrent ledger lookups
    pub parallel_limit: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            check_ledger: true,
            parallel_limit: 8,
        }
    }
}
