use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use super::clients::{EvaluatorError, EvaluatorKind, MlEvaluator, RuleEvaluator};
use super::domain::{EvaluationRequest, MlResult, RuleResult};
use super::error::CoordinationError;

/// Both evaluations of one coordination attempt, available only after a clean join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedEvaluations {
    pub rule: RuleResult,
    pub ml: MlResult,
}

// `None` means the attempt was already over when the call's turn came.
type EvaluatorTask<T> = JoinHandle<Option<Result<T, EvaluatorError>>>;

/// Runs the rule and ML evaluations concurrently under one deadline.
///
/// The first evaluator error ends the join immediately, and so does the deadline.
/// Either way the attempt's worker pool is closed, so a call still queued for a
/// worker never starts. A call already in flight is detached rather than aborted;
/// its own client timeout bounds how long it keeps running, and its result is dropped.
#[derive(Clone)]
pub struct JoinScheduler {
    rule: Arc<dyn RuleEvaluator>,
    ml: Arc<dyn MlEvaluator>,
    join_timeout: Duration,
    worker_pool_size: usize,
}

impl JoinScheduler {
    pub fn new(
        rule: Arc<dyn RuleEvaluator>,
        ml: Arc<dyn MlEvaluator>,
        join_timeout: Duration,
        worker_pool_size: usize,
    ) -> Self {
        Self {
            rule,
            ml,
            join_timeout,
            worker_pool_size: worker_pool_size.max(1),
        }
    }

    pub async fn join(
        &self,
        request: &EvaluationRequest,
    ) -> Result<JoinedEvaluations, CoordinationError> {
        // per-attempt pool; attempts never wait on each other
        let pool = Arc::new(Semaphore::new(self.worker_pool_size));

        let rule_task = {
            let evaluator = Arc::clone(&self.rule);
            let request = request.clone();
            spawn_gated(Arc::clone(&pool), async move {
                evaluator.evaluate_rules(&request).await
            })
        };
        let ml_task = {
            let evaluator = Arc::clone(&self.ml);
            let request = request.clone();
            spawn_gated(Arc::clone(&pool), async move {
                evaluator.evaluate_ml(&request).await
            })
        };

        let joined = tokio::time::timeout(self.join_timeout, await_both(rule_task, ml_task)).await;
        match joined {
            Ok(Ok(joined)) => {
                debug!(
                    borrower_id = %request.borrower_id,
                    rule_result_id = %joined.rule.result_id,
                    ml_result_id = %joined.ml.result_id,
                    "rule and ml evaluations joined"
                );
                Ok(joined)
            }
            Ok(Err(err)) => {
                pool.close();
                warn!(
                    borrower_id = %request.borrower_id,
                    document_id = %request.document_id,
                    error = %err,
                    "evaluation join failed fast"
                );
                Err(err)
            }
            Err(_) => {
                pool.close();
                warn!(
                    borrower_id = %request.borrower_id,
                    document_id = %request.document_id,
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "evaluation join deadline elapsed; abandoning pending calls"
                );
                Err(CoordinationError::JoinTimeout(self.join_timeout))
            }
        }
    }
}

/// Spawns one evaluator call behind a worker permit.
///
/// A failed call closes the pool before releasing its permit, so a sibling
/// waiting for that permit gives up instead of calling out.
fn spawn_gated<T, F>(pool: Arc<Semaphore>, call: F) -> EvaluatorTask<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, EvaluatorError>> + Send + 'static,
{
    tokio::spawn(async move {
        let _permit = Arc::clone(&pool).acquire_owned().await.ok()?;
        let result = call.await;
        if result.is_err() {
            pool.close();
        }
        Some(result)
    })
}

async fn await_both(
    mut rule_task: EvaluatorTask<RuleResult>,
    mut ml_task: EvaluatorTask<MlResult>,
) -> Result<JoinedEvaluations, CoordinationError> {
    // whichever finishes first is settled first, so its error returns immediately
    tokio::select! {
        joined = &mut rule_task => {
            let rule = settle(joined, EvaluatorKind::Rule)?;
            let ml = settle(ml_task.await, EvaluatorKind::Ml)?;
            Ok(JoinedEvaluations { rule, ml })
        }
        joined = &mut ml_task => {
            let ml = settle(joined, EvaluatorKind::Ml)?;
            let rule = settle(rule_task.await, EvaluatorKind::Rule)?;
            Ok(JoinedEvaluations { rule, ml })
        }
    }
}

fn settle<T>(
    joined: Result<Option<Result<T, EvaluatorError>>, JoinError>,
    evaluator: EvaluatorKind,
) -> Result<T, CoordinationError> {
    match joined {
        Ok(Some(result)) => result.map_err(CoordinationError::from),
        Ok(None) => Err(CoordinationError::TaskFailed {
            evaluator,
            detail: "worker pool closed before the call started".to_string(),
        }),
        Err(err) => Err(CoordinationError::TaskFailed {
            evaluator,
            detail: err.to_string(),
        }),
    }
}
