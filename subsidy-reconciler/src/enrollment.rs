//! Idempotent farmer enrollment.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use subsidy_core::{Enrollment, Program};

use crate::error::Result;
use crate::notification::{NotificationDispatcher, NotificationEvent, NotificationKind};
use crate::store::{EnrollmentStore, FarmDirectory};

/// Outcome of an enroll call.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentOutcome {
    pub enrollment: Enrollment,
    /// The (farmer, program) row did not exist before this call
    pub newly_enrolled: bool,
}

/// Keeps exactly one enrollment per (farmer, program).
///
/// Re-enrolling refreshes `enrolled_at`. The program creator is notified
/// only when the row is first created.
#[derive(Clone)]
pub struct EnrollmentRegistry {
    store: Arc<dyn EnrollmentStore>,
    directory: Arc<dyn FarmDirectory>,
    notifier: NotificationDispatcher,
}

impl EnrollmentRegistry {
    pub fn new(
        store: Arc<dyn EnrollmentStore>,
        directory: Arc<dyn FarmDirectory>,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    /// Enroll a farmer now.
    pub async fn enroll(&self, farmer_id: &str, program: &Program) -> Result<EnrollmentOutcome> {
        self.enroll_at(farmer_id, program, Utc::now()).await
    }

    /// Enroll a farmer with an explicit timestamp.
    pub async fn enroll_at(
        &self,
        farmer_id: &str,
        program: &Program,
        at: DateTime<Utc>,
    ) -> Result<EnrollmentOutcome> {
        let upsert = self.store.upsert_enrollment(farmer_id, &program.id, at).await?;

        if upsert.created {
            info!(farmer_id, program_id = %program.id, "Farmer enrolled");
            self.notify_creator(farmer_id, program).await;
        }

        Ok(EnrollmentOutcome {
            enrollment: upsert.enrollment,
            newly_enrolled: upsert.created,
        })
    }

    /// Record the ledger transaction for an enrollment.
    pub async fn record_anchor(&self, farmer_id: &str, program_id: &str, tx_hash: &str) -> Result<()> {
        self.store.set_enrollment_tx(farmer_id, program_id, tx_hash).await
    }

    pub async fn get(&self, farmer_id: &str, program_id: &str) -> Result<Option<Enrollment>> {
        self.store.get_enrollment(farmer_id, program_id).await
    }

    pub async fn list_for_program(&self, program_id: &str) -> Result<Vec<Enrollment>> {
        self.store.list_enrollments(program_id).await
    }

    async fn notify_creator(&self, farmer_id: &str, program: &Program) {
        // The profile only decorates the message.
        let farmer_name = match self.directory.farmer_profile(farmer_id).await {
            Ok(profile) => profile.map(|p| p.name),
            Err(e) => {
                warn!(farmer_id, error = %e, "Farmer profile lookup failed");
                None
            }
        };

        self.notifier.emit(NotificationEvent::new(
            program.creator_id.clone(),
            NotificationKind::FarmerEnrolled {
                farmer_id: farmer_id.to_string(),
                farmer_name,
                program_id: program.id.clone(),
                program_name: program.name.clone(),
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::notification::RecordingSink;
    use crate::store::{FarmerProfile, MemoryStore};
    use std::time::Duration;
    use subsidy_core::{ProgramDefinition, ProgramType};

    fn program() -> Program {
        let start = Utc::now();
        Program::from_definition(ProgramDefinition {
            name: "Flood Relief".to_string(),
            description: String::new(),
            program_type: ProgramType::Flood,
            start_date: start,
            end_date: start + chrono::Duration::days(30),
            status: None,
            onchain_id: None,
            creator_id: "agency-1".to_string(),
            eligibility: None,
            payout_rule: None,
        })
    }

    #[tokio::test]
    async fn test_enroll_twice_keeps_one_row_and_one_notification() {
        let store = Arc::new(MemoryStore::new());
        store.add_farmer(FarmerProfile {
            id: "farmer-1".to_string(),
            name: "Aminah".to_string(),
        });
        let sink = Arc::new(RecordingSink::new());
        let (notifier, handle) = NotificationDispatcher::spawn(sink.clone(), &NotificationConfig::default());
        let registry = EnrollmentRegistry::new(store.clone(), store.clone(), notifier);
        let program = program();

        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(5);

        let first = registry.enroll_at("farmer-1", &program, t1).await.unwrap();
        assert!(first.newly_enrolled);

        let second = registry.enroll_at("farmer-1", &program, t2).await.unwrap();
        assert!(!second.newly_enrolled);
        assert_eq!(second.enrollment.enrolled_at, t2);

        let rows = registry.list_for_program(&program.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].enrolled_at, t2);

        drop(registry);
        tokio::time::timeout(Duration::from_secs(1), handle.unwrap())
            .await
            .unwrap()
            .unwrap();

        let events = sink.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].recipient_id, "agency-1");
        assert_eq!(events[0].title(), "Aminah enrolled in Flood Relief");
    }
}
