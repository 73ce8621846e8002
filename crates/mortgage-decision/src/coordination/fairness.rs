use std::sync::Arc;

use tracing::info;

use super::clients::FairnessAuditor;
use super::domain::{BorrowerId, FairnessResult};
use super::error::CoordinationError;
use super::scheduler::JoinedEvaluations;

/// Post-join bias audit keyed on the model's result.
///
/// Only reachable with both evaluations in hand; a biased verdict vetoes whatever
/// the rule engine and the model agreed on.
#[derive(Clone)]
pub struct FairnessGate {
    auditor: Arc<dyn FairnessAuditor>,
}

impl FairnessGate {
    pub fn new(auditor: Arc<dyn FairnessAuditor>) -> Self {
        Self { auditor }
    }

    pub async fn audit(
        &self,
        borrower_id: &BorrowerId,
        joined: &JoinedEvaluations,
    ) -> Result<FairnessResult, CoordinationError> {
        let result = self
            .auditor
            .audit(borrower_id, &joined.ml.result_id)
            .await?;

        info!(
            borrower_id = %borrower_id,
            ml_result_id = %joined.ml.result_id,
            is_biased = result.is_biased,
            flagged = result.flagged_features.len(),
            "fairness audit complete"
        );
        Ok(result)
    }
}
