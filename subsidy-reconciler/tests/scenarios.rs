//! End-to-end claim scenarios against the in-memory stores and mock ledger.

mod common;

use std::time::Duration;

use subsidy_core::{
    CapKind, Claim, ClaimContext, ClaimMetadata, ClaimStatus, IneligibilityReason, MetadataHash, PayoutRule,
};
use subsidy_ledger::{LedgerClient, LedgerError};
use subsidy_reconciler::{
    ClaimFilter, ClaimRequest, ClaimStore, EnrollmentStore, EvidenceFile, FindingKind, NotificationKind, ReconcileError,
    ReconcilerConfig,
};

use common::*;

#[tokio::test]
async fn oversized_farm_is_rejected_before_the_ledger() {
    let h = harness(ReconcilerConfig::default());
    let program = active_program(&h, Some(kedah_rules()), PayoutRule::capped(money(15_000))).await;
    h.store.add_farm(farm("big-farm", "farmer-1", 60.0, "Kedah"));

    let err = h
        .engine
        .claims
        .submit_claim(ClaimRequest::new("farmer-1", &program.id, money(1_000), "Flooded"))
        .await
        .unwrap_err();

    match err {
        ReconcileError::Ineligible { farm_id, reasons } => {
            assert_eq!(farm_id.as_deref(), Some("big-farm"));
            assert_eq!(reasons, vec![IneligibilityReason::FarmTooLarge { size: 60.0, max: 50.0 }]);
        }
        other => panic!("expected Ineligible, got {other:?}"),
    }
    assert_eq!(h.ledger.submit_count(), 0);
    assert_eq!(h.store.claim_count(), 0);
    assert!(h.store.get_enrollment("farmer-1", &program.id).await.unwrap().is_none());
}

#[tokio::test]
async fn farmer_without_verified_farm_is_ineligible() {
    let h = harness(ReconcilerConfig::default());
    let program = active_program(&h, None, PayoutRule::capped(money(15_000))).await;
    let mut pending_farm = farm("f", "farmer-1", 10.0, "Kedah");
    pending_farm.verification = subsidy_core::FarmVerification::Pending;
    h.store.add_farm(pending_farm);

    let err = h
        .engine
        .claims
        .submit_claim(ClaimRequest::new("farmer-1", &program.id, money(100), ""))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::Ineligible { farm_id: None, ref reasons } if reasons == &vec![IneligibilityReason::NoVerifiedFarm]
    ));
}

#[tokio::test]
async fn claim_over_max_cap_never_reaches_the_ledger() {
    let h = harness(ReconcilerConfig::default());
    let program = active_program(&h, None, PayoutRule::capped(money(15_000))).await;
    register_farmer(&h, "farmer-1");

    let err = h
        .engine
        .claims
        .submit_claim(ClaimRequest::new("farmer-1", &program.id, money(20_000), "Whole harvest lost"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::CapExceeded {
            kind: CapKind::MaxCap,
            ..
        }
    ));
    assert_eq!(h.ledger.submit_count(), 0);
    assert_eq!(h.store.claim_count(), 0);
}

#[tokio::test]
async fn per_claim_amount_limits_claims() {
    let h = harness(ReconcilerConfig::default());
    let rule = PayoutRule::capped(money(15_000)).with_per_claim_amount(money(5_000));
    let program = active_program(&h, None, rule).await;
    register_farmer(&h, "farmer-1");

    let err = h
        .engine
        .claims
        .submit_claim(ClaimRequest::new("farmer-1", &program.id, money(6_000), ""))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::CapExceeded {
            kind: CapKind::PerClaim,
            ..
        }
    ));
}

#[tokio::test]
async fn repeated_enrollment_keeps_one_row_and_notifies_once() {
    let h = harness(ReconcilerConfig::default());
    let program = active_program(&h, None, PayoutRule::capped(money(15_000))).await;
    register_farmer(&h, "farmer-1");

    let first = h.engine.claims.enroll_farmer("farmer-1", &program.id).await.unwrap();
    assert!(first.newly_enrolled);
    assert!(first.warnings.is_empty());
    assert!(first.enrollment.onchain_tx_hash.is_some());

    let second = h.engine.claims.enroll_farmer("farmer-1", &program.id).await.unwrap();
    assert!(!second.newly_enrolled);
    assert!(second.enrollment.enrolled_at >= first.enrollment.enrolled_at);

    let rows = h.store.list_enrollments(&program.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].enrolled_at, second.enrollment.enrolled_at);
    assert_eq!(h.ledger.enroll_count(), 1);

    let sink = h.sink.clone();
    h.engine.shutdown().await;

    let enrolled: Vec<_> = sink
        .events()
        .await
        .into_iter()
        .filter(|e| matches!(e.kind, NotificationKind::FarmerEnrolled { .. }))
        .collect();
    assert_eq!(enrolled.len(), 1);
    assert_eq!(enrolled[0].recipient_id, "agency-kedah");
    assert_eq!(enrolled[0].title(), "Farmer farmer-1 enrolled in Kedah Flood Relief");
}

#[tokio::test]
async fn ledger_enrollment_failure_is_a_warning() {
    let h = harness(ReconcilerConfig::default());
    let program = active_program(&h, None, PayoutRule::capped(money(15_000))).await;
    h.ledger
        .fail_next(LedgerError::Unavailable("relayer down".to_string()))
        .await;

    let receipt = h.engine.claims.enroll_farmer("farmer-1", &program.id).await.unwrap();
    assert!(receipt.newly_enrolled);
    assert_eq!(receipt.warnings.len(), 1);
    assert!(receipt.enrollment.onchain_tx_hash.is_none());
}

#[tokio::test]
async fn enrollment_is_anchored_once_the_ledger_recovers() {
    let h = harness(ReconcilerConfig::default());
    let program = active_program(&h, None, PayoutRule::capped(money(15_000))).await;
    h.ledger
        .fail_next(LedgerError::Unavailable("relayer down".to_string()))
        .await;

    let first = h.engine.claims.enroll_farmer("farmer-1", &program.id).await.unwrap();
    assert_eq!(first.warnings.len(), 1);
    assert!(first.enrollment.onchain_tx_hash.is_none());

    let second = h.engine.claims.enroll_farmer("farmer-1", &program.id).await.unwrap();
    assert!(!second.newly_enrolled);
    assert!(second.warnings.is_empty());
    assert!(second.enrollment.onchain_tx_hash.is_some());
    assert_eq!(h.ledger.enroll_count(), 1);

    let stored = h.store.get_enrollment("farmer-1", &program.id).await.unwrap().unwrap();
    assert_eq!(stored.onchain_tx_hash, second.enrollment.onchain_tx_hash);

    // Anchored rows are left alone.
    h.engine.claims.enroll_farmer("farmer-1", &program.id).await.unwrap();
    assert_eq!(h.ledger.enroll_count(), 1);

    // The creator hears about the farmer once.
    h.engine.shutdown().await;
    let enrolled = h
        .sink
        .events()
        .await
        .into_iter()
        .filter(|e| matches!(e.kind, NotificationKind::FarmerEnrolled { .. }))
        .count();
    assert_eq!(enrolled, 1);
}

#[tokio::test]
async fn evidence_failure_after_storage_is_a_warning() {
    let h = harness_with_failing_evidence(ReconcilerConfig::default());
    let program = active_program(&h, Some(kedah_rules()), PayoutRule::capped(money(15_000))).await;
    register_farmer(&h, "farmer-1");

    let request = ClaimRequest::new("farmer-1", &program.id, money(4_000), "Fields under water").with_evidence(
        EvidenceFile::new("damage.jpg", "image/jpeg", vec![0xff, 0xd8, 0xff]),
    );
    let submission = h.engine.claims.submit_claim(request).await.unwrap();

    assert_eq!(submission.warnings.len(), 1);
    assert!(submission.warnings[0].contains("evidence was not attached"));
    assert!(submission.claim.evidence_ref.is_none());

    let stored = h.engine.claims.get_claim(&submission.claim.id).await.unwrap();
    assert_eq!(stored.status, ClaimStatus::Pending);
    assert!(stored.evidence_ref.is_none());
    assert_eq!(h.store.claim_count(), 1);
    assert_eq!(h.ledger.submit_count(), 1);
    assert!(h.evidence.is_empty());
}

#[tokio::test]
async fn successful_submission_links_ledger_identifiers() {
    let h = harness(ReconcilerConfig::default());
    let program = active_program(&h, Some(kedah_rules()), PayoutRule::capped(money(15_000))).await;
    register_farmer(&h, "farmer-1");

    let request = ClaimRequest::new("farmer-1", &program.id, money(12_500), "Paddy lost to flooding").with_context(
        ClaimContext::WeatherEvent {
            weather_event_id: "storm-7".to_string(),
        },
    );
    let submission = h.engine.claims.submit_claim(request).await.unwrap();
    let claim = submission.claim;

    assert_eq!(submission.farm_id, "farmer-1-farm");
    assert!(submission.warnings.is_empty());
    assert_eq!(claim.status, ClaimStatus::Pending);
    assert_eq!(h.ledger.submit_count(), 1);

    // Stored verbatim and matching what the ledger committed.
    let onchain = h.ledger.claim_commitment(&claim.onchain_claim_id).await.unwrap();
    assert_eq!(onchain, Some(claim.metadata_hash.clone()));

    let payload = ClaimMetadata::new(
        claim.amount,
        "Paddy lost to flooding",
        format!("program:{}#weather:storm-7", program.id),
        claim.submitted_at_ms,
    );
    assert_eq!(
        h.engine.claims.commitment().build_metadata_hash(&payload).unwrap(),
        claim.metadata_hash
    );

    let stored = h.engine.claims.get_claim(&claim.id).await.unwrap();
    assert_eq!(stored, claim);
    assert!(h.store.get_enrollment("farmer-1", &program.id).await.unwrap().is_some());
}

#[tokio::test]
async fn tampered_amount_fails_verification() {
    let h = harness(ReconcilerConfig::default());
    let program = active_program(&h, None, PayoutRule::capped(money(15_000))).await;
    register_farmer(&h, "farmer-1");

    let claim = h
        .engine
        .claims
        .submit_claim(ClaimRequest::new("farmer-1", &program.id, money(1_000), "Flooded"))
        .await
        .unwrap()
        .claim;
    tokio_test::assert_ok!(h.engine.audit.verify_claim(&claim.id).await);

    h.store
        .mutate_claim(
            &claim.id,
            Box::new(|c: &mut Claim| {
                c.amount = money(9_000);
                Ok(())
            }),
            None,
        )
        .await
        .unwrap();

    let err = h.engine.audit.verify_claim(&claim.id).await.unwrap_err();
    match err {
        ReconcileError::Integrity {
            claim_id, expected, ..
        } => {
            assert_eq!(claim_id, claim.id);
            assert_eq!(expected, claim.metadata_hash);
        }
        other => panic!("expected Integrity, got {other:?}"),
    }

    let report = h.engine.audit.audit_claims(&ClaimFilter::default()).await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.findings.len(), 1);
    assert!(matches!(report.findings[0].kind, FindingKind::LocalMismatch { .. }));
}

#[tokio::test]
async fn audit_detects_ledger_divergence() {
    let h = harness(ReconcilerConfig::default());
    let program = active_program(&h, None, PayoutRule::capped(money(15_000))).await;
    register_farmer(&h, "farmer-1");
    register_farmer(&h, "farmer-2");

    let clean = h
        .engine
        .claims
        .submit_claim(ClaimRequest::new("farmer-1", &program.id, money(100), ""))
        .await
        .unwrap()
        .claim;
    let diverged = h
        .engine
        .claims
        .submit_claim(ClaimRequest::new("farmer-2", &program.id, money(200), ""))
        .await
        .unwrap()
        .claim;

    h.ledger
        .tamper_commitment(&diverged.onchain_claim_id, MetadataHash::from_bytes([0xee; 32]))
        .await;

    let report = h.engine.audit.audit_claims(&ClaimFilter::default()).await.unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].claim_id, diverged.id);
    assert!(matches!(report.findings[0].kind, FindingKind::LedgerMismatch { .. }));
    assert!(report.findings.iter().all(|f| f.claim_id != clean.id));
}

#[tokio::test]
async fn ledger_timeout_creates_no_claim_and_retry_creates_one() {
    let mut config = ReconcilerConfig::default();
    config.ledger.timeout_ms = 50;
    let h = harness(config);
    let program = active_program(&h, None, PayoutRule::capped(money(15_000))).await;
    register_farmer(&h, "farmer-1");

    h.ledger.set_latency(Some(Duration::from_millis(500))).await;
    let request = ClaimRequest::new("farmer-1", &program.id, money(3_000), "Drought");

    let err = h.engine.claims.submit_claim(request.clone()).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Ledger(LedgerError::Timeout { after_ms: 50 })));
    assert!(err.is_retryable());
    assert_eq!(h.store.claim_count(), 0);

    h.ledger.set_latency(None).await;
    let submission = h.engine.claims.submit_claim(request).await.unwrap();
    assert_eq!(h.store.claim_count(), 1);
    assert_eq!(h.ledger.submit_count(), 1);

    let listed = h
        .engine
        .claims
        .list_claims(&ClaimFilter::for_farmer("farmer-1"), Default::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 1);
    assert_eq!(listed.items[0].id, submission.claim.id);
}

#[tokio::test]
async fn inactive_or_unanchored_programs_refuse_claims() {
    let h = harness(ReconcilerConfig::default());
    register_farmer(&h, "farmer-1");

    let draft = h
        .engine
        .programs
        .create_program(definition(None, Some(PayoutRule::capped(money(15_000)))))
        .await
        .unwrap();
    let err = h
        .engine
        .claims
        .submit_claim(ClaimRequest::new("farmer-1", &draft.id, money(100), ""))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::ProgramNotActive { .. }));

    h.engine
        .programs
        .update_program_status(&draft.id, subsidy_core::ProgramStatus::Active, None)
        .await
        .unwrap();
    let err = h
        .engine
        .claims
        .submit_claim(ClaimRequest::new("farmer-1", &draft.id, money(100), ""))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Validation(_)));
    assert_eq!(h.ledger.submit_count(), 0);

    let err = h
        .engine
        .claims
        .submit_claim(ClaimRequest::new("farmer-1", "missing", money(100), ""))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound { entity: "Program", .. }));
}
