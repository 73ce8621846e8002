use serde::Serialize;

use super::domain::{BorrowerId, DecisionRecord, DecisionType, FinalDecision};

/// Whether a borrower may upload a new document for evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionEligibility {
    pub borrower_id: BorrowerId,
    pub may_submit: bool,
    pub current_decision: Option<FinalDecision>,
    #[serde(rename = "type")]
    pub decision_type: Option<DecisionType>,
    pub reason: String,
}

/// Gates new submissions on the borrower's current decision.
///
/// Works on any latest record, including overrides that carry no evaluator ids.
pub fn submission_eligibility(
    borrower_id: &BorrowerId,
    current: Option<&DecisionRecord>,
) -> SubmissionEligibility {
    let Some(record) = current else {
        return SubmissionEligibility {
            borrower_id: borrower_id.clone(),
            may_submit: true,
            current_decision: None,
            decision_type: None,
            reason: "no prior decision".to_string(),
        };
    };

    let (may_submit, reason) = match &record.final_decision {
        FinalDecision::Rejected => (true, "previous application was rejected".to_string()),
        FinalDecision::Error => (true, "previous evaluation did not complete".to_string()),
        FinalDecision::Approved => (false, "application already approved".to_string()),
        FinalDecision::PendingConflict | FinalDecision::PendingBiased => {
            (false, "application awaiting underwriter review".to_string())
        }
        FinalDecision::Manual(status) => (false, format!("underwriter status '{status}'")),
    };

    SubmissionEligibility {
        borrower_id: borrower_id.clone(),
        may_submit,
        current_decision: Some(record.final_decision.clone()),
        decision_type: Some(record.kind),
        reason,
    }
}
