use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::response::Response;
use serde_json::Value;

use crate::config::CoordinatorConfig;
use crate::coordination::clients::{
    EvaluatorError, EvaluatorKind, EvaluatorSet, FairnessAuditor, MlEvaluator, RuleEvaluator,
};
use crate::coordination::domain::{
    BorrowerId, DecisionRecord, DocumentId, EvaluationRequest, FairnessResult, MlResult, MlStatus,
    ResultId, RuleResult, RuleStatus,
};
use crate::coordination::ledger::{DecisionLedger, InMemoryLedgerStore, LedgerError, LedgerStore};
use crate::coordination::service::DecisionCoordinator;

pub(crate) fn request() -> EvaluationRequest {
    EvaluationRequest {
        borrower_id: BorrowerId("borrower-42".to_string()),
        document_id: DocumentId("doc-7".to_string()),
    }
}

pub(crate) struct DelayedRule {
    status: RuleStatus,
    delay: Duration,
}

impl DelayedRule {
    pub(crate) fn new(status: RuleStatus, delay: Duration) -> Self {
        Self { status, delay }
    }
}

#[async_trait]
impl RuleEvaluator for DelayedRule {
    async fn evaluate_rules(
        &self,
        _request: &EvaluationRequest,
    ) -> Result<RuleResult, EvaluatorError> {
        tokio::time::sleep(self.delay).await;
        let mut reasons = BTreeMap::new();
        let outcome = match self.status {
            RuleStatus::Pass => "Passed".to_string(),
            RuleStatus::Fail => "Failed: credit_score >= 620".to_string(),
        };
        reasons.insert("minimum_credit_score".to_string(), outcome);
        Ok(RuleResult {
            status: self.status,
            reasons,
            result_id: ResultId("rule-1".to_string()),
        })
    }
}

pub(crate) struct DelayedMl {
    status: MlStatus,
    delay: Duration,
}

impl DelayedMl {
    pub(crate) fn new(status: MlStatus, delay: Duration) -> Self {
        Self { status, delay }
    }
}

#[async_trait]
impl MlEvaluator for DelayedMl {
    async fn evaluate_ml(&self, _request: &EvaluationRequest) -> Result<MlResult, EvaluatorError> {
        tokio::time::sleep(self.delay).await;
        let mut attribution = BTreeMap::new();
        attribution.insert("salary".to_string(), 0.18);
        attribution.insert("credit_score".to_string(), -0.07);
        Ok(MlResult {
            status: self.status,
            confidence: match self.status {
                MlStatus::Accepted => 0.81,
                MlStatus::Rejected => 0.23,
            },
            result_id: ResultId("ml-1".to_string()),
            feature_attribution: attribution,
        })
    }
}

pub(crate) struct FailingRule {
    error: EvaluatorError,
    delay: Duration,
}

impl FailingRule {
    pub(crate) fn unreachable() -> Self {
        Self {
            error: EvaluatorError::Unreachable {
                evaluator: EvaluatorKind::Rule,
                detail: "connection refused".to_string(),
            },
            delay: Duration::ZERO,
        }
    }

    /// Fails only once `delay` has passed.
    pub(crate) fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl RuleEvaluator for FailingRule {
    async fn evaluate_rules(
        &self,
        _request: &EvaluationRequest,
    ) -> Result<RuleResult, EvaluatorError> {
        tokio::time::sleep(self.delay).await;
        Err(self.error.clone())
    }
}

pub(crate) struct PanickingRule;

#[async_trait]
impl RuleEvaluator for PanickingRule {
    async fn evaluate_rules(
        &self,
        _request: &EvaluationRequest,
    ) -> Result<RuleResult, EvaluatorError> {
        panic!("rule evaluator crashed")
    }
}

pub(crate) struct FailingMl {
    error: EvaluatorError,
}

impl FailingMl {
    pub(crate) fn protocol() -> Self {
        Self {
            error: EvaluatorError::Protocol {
                evaluator: EvaluatorKind::Ml,
                detail: "status 500: Document not found.".to_string(),
            },
        }
    }
}

#[async_trait]
impl MlEvaluator for FailingMl {
    async fn evaluate_ml(&self, _request: &EvaluationRequest) -> Result<MlResult, EvaluatorError> {
        Err(self.error.clone())
    }
}

/// Records every call it receives and then never answers.
#[derive(Clone, Default)]
pub(crate) struct CountingMl {
    calls: Arc<AtomicUsize>,
}

impl CountingMl {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MlEvaluator for CountingMl {
    async fn evaluate_ml(&self, _request: &EvaluationRequest) -> Result<MlResult, EvaluatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

pub(crate) struct HangingRule;

#[async_trait]
impl RuleEvaluator for HangingRule {
    async fn evaluate_rules(
        &self,
        _request: &EvaluationRequest,
    ) -> Result<RuleResult, EvaluatorError> {
        std::future::pending().await
    }
}

pub(crate) struct HangingMl;

#[async_trait]
impl MlEvaluator for HangingMl {
    async fn evaluate_ml(&self, _request: &EvaluationRequest) -> Result<MlResult, EvaluatorError> {
        std::future::pending().await
    }
}

pub(crate) struct StubAuditor {
    pub(crate) biased: bool,
}

#[async_trait]
impl FairnessAuditor for StubAuditor {
    async fn audit(
        &self,
        _borrower_id: &BorrowerId,
        ml_result_id: &ResultId,
    ) -> Result<FairnessResult, EvaluatorError> {
        assert_eq!(ml_result_id, &ResultId("ml-1".to_string()));
        let mut flagged = BTreeMap::new();
        if self.biased {
            flagged.insert("salary".to_string(), "Impact: 0.41".to_string());
        }
        Ok(FairnessResult {
            is_biased: self.biased,
            flagged_features: flagged,
            result_id: ResultId("audit-1".to_string()),
            notes: None,
        })
    }
}

pub(crate) struct FailingAuditor {
    pub(crate) error: EvaluatorError,
}

impl FailingAuditor {
    pub(crate) fn timeout() -> Self {
        Self {
            error: EvaluatorError::Timeout {
                evaluator: EvaluatorKind::Fairness,
                timeout: Duration::from_secs(5),
            },
        }
    }

    pub(crate) fn unreachable() -> Self {
        Self {
            error: EvaluatorError::Unreachable {
                evaluator: EvaluatorKind::Fairness,
                detail: "dns error".to_string(),
            },
        }
    }
}

#[async_trait]
impl FairnessAuditor for FailingAuditor {
    async fn audit(
        &self,
        _borrower_id: &BorrowerId,
        _ml_result_id: &ResultId,
    ) -> Result<FairnessResult, EvaluatorError> {
        Err(self.error.clone())
    }
}

/// Store whose writes always fail, for the availability-over-durability path.
#[derive(Default)]
pub(crate) struct BrokenStore;

impl LedgerStore for BrokenStore {
    fn append(&self, _record: DecisionRecord) -> Result<(), LedgerError> {
        Err(LedgerError::Unavailable("database offline".to_string()))
    }

    fn for_borrower(&self, _borrower_id: &BorrowerId) -> Result<Vec<DecisionRecord>, LedgerError> {
        Err(LedgerError::Unavailable("database offline".to_string()))
    }

    fn all(&self) -> Result<Vec<DecisionRecord>, LedgerError> {
        Err(LedgerError::Unavailable("database offline".to_string()))
    }
}

pub(crate) fn config(join_timeout: Duration) -> CoordinatorConfig {
    CoordinatorConfig {
        call_timeout: join_timeout,
        join_timeout,
        ..CoordinatorConfig::default()
    }
}

pub(crate) fn evaluators(
    rule: impl RuleEvaluator + 'static,
    ml: impl MlEvaluator + 'static,
    auditor: impl FairnessAuditor + 'static,
) -> EvaluatorSet {
    EvaluatorSet {
        rule: Arc::new(rule),
        ml: Arc::new(ml),
        fairness: Arc::new(auditor),
    }
}

pub(crate) fn build_coordinator<S>(
    evaluators: EvaluatorSet,
    store: Arc<S>,
    join_timeout: Duration,
) -> DecisionCoordinator<S>
where
    S: LedgerStore + 'static,
{
    DecisionCoordinator::new(evaluators, DecisionLedger::new(store), &config(join_timeout))
}

pub(crate) fn agreeing_coordinator(
    rule: RuleStatus,
    ml: MlStatus,
    biased: bool,
) -> (DecisionCoordinator<InMemoryLedgerStore>, Arc<InMemoryLedgerStore>) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let coordinator = build_coordinator(
        evaluators(
            DelayedRule::new(rule, Duration::from_millis(5)),
            DelayedMl::new(ml, Duration::from_millis(5)),
            StubAuditor { biased },
        ),
        store.clone(),
        Duration::from_secs(2),
    );
    (coordinator, store)
}

pub(crate) async fn read_json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("body is json")
}
