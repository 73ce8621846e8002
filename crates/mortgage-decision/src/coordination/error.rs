use std::time::Duration;

use super::clients::{EvaluatorError, EvaluatorKind};

/// Why a coordination attempt produced no resolved decision.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordinationError {
    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),
    #[error("timeout or missing response after {:.2}s", .0.as_secs_f64())]
    JoinTimeout(Duration),
    #[error("{evaluator} task failed: {detail}")]
    TaskFailed {
        evaluator: EvaluatorKind,
        detail: String,
    },
}

impl CoordinationError {
    /// Discriminator returned to callers in place of internal detail.
    pub fn reason(&self) -> &'static str {
        match self {
            CoordinationError::Evaluator(err) => match (err.evaluator(), err) {
                (EvaluatorKind::Rule, _) => "rule service error",
                (EvaluatorKind::Ml, _) => "ml service error",
                (EvaluatorKind::Fairness, EvaluatorError::Timeout { .. }) => "timeout",
                (EvaluatorKind::Fairness, _) => "exception",
            },
            CoordinationError::JoinTimeout(_) => "timeout_or_missing",
            CoordinationError::TaskFailed { .. } => "exception",
        }
    }

    /// Text stored on the error ledger row.
    pub fn ledger_message(&self) -> String {
        match self {
            CoordinationError::Evaluator(err) => format!("{}: {}", self.reason(), err),
            CoordinationError::JoinTimeout(_) => "timeout or missing response".to_string(),
            CoordinationError::TaskFailed { .. } => self.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.reason(), "timeout" | "timeout_or_missing")
    }
}
