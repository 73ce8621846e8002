use super::domain::{FinalDecision, MlStatus, RuleStatus};

/// Maps the three evaluator verdicts onto a final decision.
///
/// Bias is checked first and vetoes everything else. Disagreement between the rule
/// engine and the model is never settled automatically; it goes to an underwriter.
pub fn resolve(rule: RuleStatus, ml: MlStatus, is_biased: bool) -> FinalDecision {
    if is_biased {
        return FinalDecision::PendingBiased;
    }

    match (rule, ml) {
        (RuleStatus::Pass, MlStatus::Accepted) => FinalDecision::Approved,
        (RuleStatus::Fail, MlStatus::Rejected) => FinalDecision::Rejected,
        (RuleStatus::Pass, MlStatus::Rejected) | (RuleStatus::Fail, MlStatus::Accepted) => {
            FinalDecision::PendingConflict
        }
    }
}

/// Every input combination paired with its resolution, in table order.
pub fn decision_matrix() -> Vec<(RuleStatus, MlStatus, bool, FinalDecision)> {
    let mut rows = Vec::with_capacity(8);
    for is_biased in [false, true] {
        for rule in [RuleStatus::Pass, RuleStatus::Fail] {
            for ml in [MlStatus::Accepted, MlStatus::Rejected] {
                rows.push((rule, ml, is_biased, resolve(rule, ml, is_biased)));
            }
        }
    }
    rows
}
