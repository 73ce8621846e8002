use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::clients::{EvaluatorSet, HttpEvaluatorClient};
use super::domain::{DecisionId, DecisionType, EvaluationRequest, FinalDecision, ResultLinks};
use super::error::CoordinationError;
use super::explanation::Justification;
use super::fairness::FairnessGate;
use super::ledger::{DecisionLedger, LedgerEntry, LedgerStore};
use super::resolver::resolve;
use super::scheduler::JoinScheduler;
use crate::config::CoordinatorConfig;
use crate::telemetry::DECISION_OUTCOMES;

/// Resolved decision handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedDecision {
    pub final_decision: FinalDecision,
    pub justification: Justification,
}

/// Result of one coordination attempt plus the ledger row it produced, if the
/// write went through.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinationOutcome {
    pub decision_id: Option<DecisionId>,
    pub result: Result<ResolvedDecision, CoordinationError>,
}

/// Join scheduler, fairness gate, resolver and ledger composed into one engine.
pub struct DecisionCoordinator<S> {
    scheduler: JoinScheduler,
    gate: FairnessGate,
    ledger: DecisionLedger<S>,
}

impl<S> DecisionCoordinator<S>
where
    S: LedgerStore + 'static,
{
    pub fn new(
        evaluators: EvaluatorSet,
        ledger: DecisionLedger<S>,
        config: &CoordinatorConfig,
    ) -> Self {
        let scheduler = JoinScheduler::new(
            evaluators.rule,
            evaluators.ml,
            config.join_timeout,
            config.worker_pool_size,
        );
        let gate = FairnessGate::new(evaluators.fairness);

        Self {
            scheduler,
            gate,
            ledger,
        }
    }

    pub fn ledger(&self) -> &DecisionLedger<S> {
        &self.ledger
    }

    /// Shares the ledger with collaborators such as the override desk.
    pub fn shared_ledger(&self) -> DecisionLedger<S> {
        self.ledger.clone()
    }

    /// Coordinates one attempt. Exactly one ledger entry is attempted per call,
    /// after every result (or the failure that ended the attempt) is known.
    pub async fn process(&self, request: EvaluationRequest) -> CoordinationOutcome {
        info!(
            borrower_id = %request.borrower_id,
            document_id = %request.document_id,
            "coordinating decision"
        );

        let joined = match self.scheduler.join(&request).await {
            Ok(joined) => joined,
            Err(err) => return self.fail(&request, err, ResultLinks::default()),
        };

        let fairness = match self.gate.audit(&request.borrower_id, &joined).await {
            Ok(fairness) => fairness,
            Err(err) => {
                let links = ResultLinks {
                    rule_result_id: Some(joined.rule.result_id.clone()),
                    ml_result_id: Some(joined.ml.result_id.clone()),
                    fairness_result_id: None,
                };
                return self.fail(&request, err, links);
            }
        };

        let final_decision = resolve(joined.rule.status, joined.ml.status, fairness.is_biased);
        let justification = Justification::resolved(&joined.rule, &joined.ml, &fairness);

        let decision_id = self.ledger.record(LedgerEntry {
            borrower_id: request.borrower_id.clone(),
            document_id: request.document_id.clone(),
            final_decision: final_decision.clone(),
            justification: justification.clone(),
            links: ResultLinks {
                rule_result_id: Some(joined.rule.result_id),
                ml_result_id: Some(joined.ml.result_id),
                fairness_result_id: Some(fairness.result_id),
            },
            kind: DecisionType::Auto,
        });

        metrics::counter!(DECISION_OUTCOMES, "decision" => final_decision.label().to_string())
            .increment(1);
        info!(
            borrower_id = %request.borrower_id,
            final_decision = %final_decision,
            "decision resolved"
        );

        CoordinationOutcome {
            decision_id,
            result: Ok(ResolvedDecision {
                final_decision,
                justification,
            }),
        }
    }

    fn fail(
        &self,
        request: &EvaluationRequest,
        err: CoordinationError,
        links: ResultLinks,
    ) -> CoordinationOutcome {
        warn!(
            borrower_id = %request.borrower_id,
            document_id = %request.document_id,
            reason = err.reason(),
            error = %err,
            "coordination failed"
        );

        let decision_id = self.ledger.record(LedgerEntry {
            borrower_id: request.borrower_id.clone(),
            document_id: request.document_id.clone(),
            final_decision: FinalDecision::Error,
            justification: Justification::Error {
                reason: err.reason().to_string(),
                message: err.ledger_message(),
            },
            links,
            kind: DecisionType::Auto,
        });

        metrics::counter!(DECISION_OUTCOMES, "decision" => FinalDecision::Error.label().to_string())
            .increment(1);

        CoordinationOutcome {
            decision_id,
            result: Err(err),
        }
    }
}

/// Convenience for wiring a coordinator straight from configuration.
pub fn coordinator_from_config<S>(
    config: &CoordinatorConfig,
    store: Arc<S>,
) -> Result<DecisionCoordinator<S>, reqwest::Error>
where
    S: LedgerStore + 'static,
{
    let client = HttpEvaluatorClient::new(config)?;
    Ok(DecisionCoordinator::new(
        EvaluatorSet::from_client(client),
        DecisionLedger::new(store),
        config,
    ))
}
