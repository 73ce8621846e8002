use std::sync::Arc;
use std::time::{Duration, Instant};

use super::common::*;
use crate::coordination::domain::{DecisionType, FinalDecision, MlStatus, ResultId, RuleStatus};
use crate::coordination::explanation::Justification;
use crate::coordination::ledger::{InMemoryLedgerStore, LedgerStore};
use crate::coordination::resolver::decision_matrix;

fn only_record(store: &InMemoryLedgerStore) -> crate::coordination::domain::DecisionRecord {
    let mut records = store.all().expect("store readable");
    assert_eq!(records.len(), 1, "exactly one ledger row per attempt");
    records.remove(0)
}

fn error_reason(record: &crate::coordination::domain::DecisionRecord) -> String {
    match Justification::decode(&record.explanation) {
        Some(Justification::Error { reason, .. }) => reason,
        other => panic!("expected error justification, got {other:?}"),
    }
}

#[tokio::test]
async fn agreement_is_approved_and_linked_to_every_result() {
    let (coordinator, store) = agreeing_coordinator(RuleStatus::Pass, MlStatus::Accepted, false);

    let outcome = coordinator.process(request()).await;
    let resolved = outcome.result.expect("coordination succeeds");
    assert_eq!(resolved.final_decision, FinalDecision::Approved);

    let record = only_record(&store);
    assert_eq!(Some(record.id.clone()), outcome.decision_id);
    assert_eq!(record.kind, DecisionType::Auto);
    assert_eq!(record.final_decision, FinalDecision::Approved);
    assert_eq!(record.rule_result_id, Some(ResultId("rule-1".to_string())));
    assert_eq!(record.ml_result_id, Some(ResultId("ml-1".to_string())));
    assert_eq!(record.fairness_result_id, Some(ResultId("audit-1".to_string())));
    assert_eq!(
        Justification::decode(&record.explanation),
        Some(resolved.justification)
    );
}

#[tokio::test]
async fn every_matrix_row_resolves_through_the_engine() {
    for (rule, ml, biased, expected) in decision_matrix() {
        let (coordinator, store) = agreeing_coordinator(rule, ml, biased);
        let outcome = coordinator.process(request()).await;

        let resolved = outcome.result.expect("coordination succeeds");
        assert_eq!(
            resolved.final_decision, expected,
            "rule={rule:?} ml={ml:?} biased={biased}"
        );
        assert_eq!(only_record(&store).final_decision, expected);
    }
}

#[tokio::test]
async fn rule_failure_fails_fast_and_records_error() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let coordinator = build_coordinator(
        evaluators(
            FailingRule::unreachable(),
            DelayedMl::new(MlStatus::Accepted, Duration::from_secs(3)),
            StubAuditor { biased: false },
        ),
        store.clone(),
        Duration::from_secs(5),
    );

    let started = Instant::now();
    let outcome = coordinator.process(request()).await;
    assert!(started.elapsed() < Duration::from_secs(1));

    let err = outcome.result.expect_err("rule failure surfaces");
    assert_eq!(err.reason(), "rule service error");

    let record = only_record(&store);
    assert_eq!(record.final_decision, FinalDecision::Error);
    assert_eq!(error_reason(&record), "rule service error");
    assert!(record.rule_result_id.is_none());
    assert!(record.ml_result_id.is_none());
}

#[tokio::test]
async fn ml_failure_is_reported_as_ml_service_error() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let coordinator = build_coordinator(
        evaluators(
            DelayedRule::new(RuleStatus::Pass, Duration::from_millis(200)),
            FailingMl::protocol(),
            StubAuditor { biased: false },
        ),
        store.clone(),
        Duration::from_secs(2),
    );

    let err = coordinator
        .process(request())
        .await
        .result
        .expect_err("ml failure surfaces");
    assert_eq!(err.reason(), "ml service error");
    assert_eq!(error_reason(&only_record(&store)), "ml service error");
}

#[tokio::test]
async fn crashed_evaluator_is_recorded_as_exception() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let coordinator = build_coordinator(
        evaluators(
            PanickingRule,
            DelayedMl::new(MlStatus::Accepted, Duration::from_millis(20)),
            StubAuditor { biased: false },
        ),
        store.clone(),
        Duration::from_secs(2),
    );

    let outcome = coordinator.process(request()).await;
    let err = outcome.result.expect_err("panic surfaces as an error");
    assert_eq!(err.reason(), "exception");

    let record = only_record(&store);
    assert_eq!(Some(record.id.clone()), outcome.decision_id);
    assert_eq!(record.final_decision, FinalDecision::Error);
    assert_eq!(error_reason(&record), "exception");
    assert!(record.rule_result_id.is_none());
}

#[tokio::test]
async fn hanging_evaluators_time_out_within_the_deadline() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let coordinator = build_coordinator(
        evaluators(HangingRule, HangingMl, StubAuditor { biased: false }),
        store.clone(),
        Duration::from_millis(200),
    );

    let started = Instant::now();
    let outcome = coordinator.process(request()).await;
    assert!(started.elapsed() < Duration::from_secs(1));

    let err = outcome.result.expect_err("deadline elapses");
    assert_eq!(err.reason(), "timeout_or_missing");

    let record = only_record(&store);
    assert_eq!(record.final_decision, FinalDecision::Error);
    match Justification::decode(&record.explanation) {
        Some(Justification::Error { message, .. }) => {
            assert_eq!(message, "timeout or missing response")
        }
        other => panic!("unexpected justification {other:?}"),
    }
}

#[tokio::test]
async fn fairness_timeout_records_error_with_evaluation_links() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let coordinator = build_coordinator(
        evaluators(
            DelayedRule::new(RuleStatus::Pass, Duration::from_millis(5)),
            DelayedMl::new(MlStatus::Accepted, Duration::from_millis(5)),
            FailingAuditor::timeout(),
        ),
        store.clone(),
        Duration::from_secs(2),
    );

    let err = coordinator
        .process(request())
        .await
        .result
        .expect_err("fairness failure surfaces");
    assert_eq!(err.reason(), "timeout");

    let record = only_record(&store);
    assert_eq!(record.final_decision, FinalDecision::Error);
    assert_eq!(record.rule_result_id, Some(ResultId("rule-1".to_string())));
    assert_eq!(record.ml_result_id, Some(ResultId("ml-1".to_string())));
    assert!(record.fairness_result_id.is_none());
}

#[tokio::test]
async fn unreachable_auditor_is_an_exception() {
    let store = Arc::new(InMemoryLedgerStore::new());
    let coordinator = build_coordinator(
        evaluators(
            DelayedRule::new(RuleStatus::Fail, Duration::from_millis(5)),
            DelayedMl::new(MlStatus::Rejected, Duration::from_millis(5)),
            FailingAuditor::unreachable(),
        ),
        store.clone(),
        Duration::from_secs(2),
    );

    let err = coordinator
        .process(request())
        .await
        .result
        .expect_err("fairness failure surfaces");
    assert_eq!(err.reason(), "exception");
    assert_eq!(error_reason(&only_record(&store)), "exception");
}

#[tokio::test]
async fn ledger_outage_does_not_block_the_decision() {
    let coordinator = build_coordinator(
        evaluators(
            DelayedRule::new(RuleStatus::Fail, Duration::from_millis(5)),
            DelayedMl::new(MlStatus::Rejected, Duration::from_millis(5)),
            StubAuditor { biased: false },
        ),
        Arc::new(BrokenStore),
        Duration::from_secs(2),
    );

    let outcome = coordinator.process(request()).await;
    assert!(outcome.decision_id.is_none());
    assert_eq!(
        outcome.result.expect("decision still returned").final_decision,
        FinalDecision::Rejected
    );
}

#[tokio::test]
async fn repeated_attempts_append_and_latest_governs() {
    let (coordinator, store) = agreeing_coordinator(RuleStatus::Pass, MlStatus::Rejected, false);

    coordinator.process(request()).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    coordinator.process(request()).await;

    assert_eq!(store.all().unwrap().len(), 2);
    let history = coordinator
        .ledger()
        .history(&request().borrower_id)
        .unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].created_at >= history[1].created_at);
    assert_eq!(history[0].final_decision, FinalDecision::PendingConflict);
}
