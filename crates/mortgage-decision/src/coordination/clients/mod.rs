//! Typed boundaries to the three remote evaluators.
//!
//! Clients issue exactly one bounded request per call and never retry; retry policy
//! belongs to whoever re-submits the whole coordination.

mod http;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::domain::{
    BorrowerId, EvaluationRequest, FairnessResult, MlResult, ResultId, RuleResult,
};

pub use http::HttpEvaluatorClient;

/// Which remote capability a call targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvaluatorKind {
    Rule,
    Ml,
    Fairness,
}

impl EvaluatorKind {
    pub fn label(&self) -> &'static str {
        match self {
            EvaluatorKind::Rule => "rule service",
            EvaluatorKind::Ml => "ml service",
            EvaluatorKind::Fairness => "fairness auditor",
        }
    }
}

impl fmt::Display for EvaluatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failure of a single evaluator call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluatorError {
    #[error("{evaluator} unreachable: {detail}")]
    Unreachable {
        evaluator: EvaluatorKind,
        detail: String,
    },
    #[error("{evaluator} did not respond within {:.2}s", .timeout.as_secs_f64())]
    Timeout {
        evaluator: EvaluatorKind,
        timeout: Duration,
    },
    #[error("{evaluator} returned an invalid response: {detail}")]
    Protocol {
        evaluator: EvaluatorKind,
        detail: String,
    },
}

impl EvaluatorError {
    pub fn evaluator(&self) -> EvaluatorKind {
        match self {
            EvaluatorError::Unreachable { evaluator, .. }
            | EvaluatorError::Timeout { evaluator, .. }
            | EvaluatorError::Protocol { evaluator, .. } => *evaluator,
        }
    }
}

#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    async fn evaluate_rules(&self, request: &EvaluationRequest)
        -> Result<RuleResult, EvaluatorError>;
}

#[async_trait]
pub trait MlEvaluator: Send + Sync {
    async fn evaluate_ml(&self, request: &EvaluationRequest) -> Result<MlResult, EvaluatorError>;
}

#[async_trait]
pub trait FairnessAuditor: Send + Sync {
    async fn audit(
        &self,
        borrower_id: &BorrowerId,
        ml_result_id: &ResultId,
    ) -> Result<FairnessResult, EvaluatorError>;
}

/// The evaluator handles one coordinator fans out to.
#[derive(Clone)]
pub struct EvaluatorSet {
    pub rule: Arc<dyn RuleEvaluator>,
    pub ml: Arc<dyn MlEvaluator>,
    pub fairness: Arc<dyn FairnessAuditor>,
}

impl EvaluatorSet {
    /// Routes all three capabilities through one shared HTTP client.
    pub fn from_client(client: HttpEvaluatorClient) -> Self {
        let client = Arc::new(client);
        Self {
            rule: client.clone(),
            ml: client.clone(),
            fairness: client,
        }
    }
}
