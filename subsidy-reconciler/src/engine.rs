//! SubsidyEngine - wires the program, claim and audit services together.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use subsidy_ledger::LedgerClient;

use crate::audit::AuditPass;
use crate::config::ReconcilerConfig;
use crate::evidence::EvidenceStore;
use crate::gateway::LedgerGateway;
use crate::notification::{NotificationDispatcher, NotificationSink};
use crate::program::ProgramService;
use crate::reconciler::ClaimReconciler;
use crate::store::Stores;

/// The reconciliation engine.
///
/// Owns the notification worker; call [`SubsidyEngine::shutdown`] to drain it.
pub struct SubsidyEngine {
    /// Program administration
    pub programs: ProgramService,
    /// Enrollment, claim submission and status lifecycle
    pub claims: ClaimReconciler,
    /// Integrity checks
    pub audit: AuditPass,
    worker: Option<JoinHandle<()>>,
}

impl SubsidyEngine {
    /// Build the engine. Must be called within a Tokio runtime.
    pub fn new(
        config: ReconcilerConfig,
        stores: Stores,
        ledger: Arc<dyn LedgerClient>,
        evidence: Arc<dyn EvidenceStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let (notifier, worker) = NotificationDispatcher::spawn(sink, &config.notifications);
        let gateway = LedgerGateway::new(ledger, config.ledger.clone());

        let programs = ProgramService::new(
            stores.programs.clone(),
            stores.claims.clone(),
            config.listing.clone(),
        );
        let claims = ClaimReconciler::new(config.clone(), &stores, gateway.clone(), evidence, notifier);
        let audit = AuditPass::new(
            stores.claims.clone(),
            gateway.clone(),
            claims.commitment().clone(),
            config.audit.clone(),
        );

        info!(
            ledger = %gateway.ledger_id(),
            algorithm = ?config.commitment.algorithm,
            cumulative_cap = config.caps.enforce_cumulative_cap,
            "Subsidy engine ready"
        );

        Self {
            programs,
            claims,
            audit,
            worker,
        }
    }

    /// Stop accepting work and wait for queued notifications to be delivered.
    pub async fn shutdown(self) {
        let SubsidyEngine {
            programs,
            claims,
            audit,
            worker,
        } = self;
        drop(programs);
        drop(claims);
        drop(audit);

        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Notification worker ended abnormally");
            }
        }
        info!("Subsidy engine stopped");
    }
}
