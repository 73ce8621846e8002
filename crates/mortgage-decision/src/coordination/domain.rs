use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the borrower whose loan application is being evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BorrowerId(pub String);

/// Identifier of the uploaded document the evaluators read parsed fields from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

/// Identifier of an appended ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub String);

impl DecisionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Identifier of a result row written by one of the remote evaluators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultId(pub String);

macro_rules! display_inner {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_inner!(BorrowerId, DocumentId, DecisionId, ResultId);

/// One coordination attempt's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRequest {
    pub borrower_id: BorrowerId,
    pub document_id: DocumentId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Pass,
    Fail,
}

impl RuleStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RuleStatus::Pass => "pass",
            RuleStatus::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MlStatus {
    Accepted,
    Rejected,
}

impl MlStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MlStatus::Accepted => "accepted",
            MlStatus::Rejected => "rejected",
        }
    }
}

/// Verdict of the configured underwriting predicates against the parsed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub status: RuleStatus,
    /// Rule name to explanation, e.g. `"Passed"` or `"Failed: credit_score >= 620"`.
    pub reasons: BTreeMap<String, String>,
    pub result_id: ResultId,
}

/// Prediction of the risk model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlResult {
    pub status: MlStatus,
    /// Probability of the accepted class, within `[0, 1]`.
    pub confidence: f64,
    pub result_id: ResultId,
    /// Signed per-feature contribution to the prediction.
    pub feature_attribution: BTreeMap<String, f64>,
}

/// Post-hoc bias check over an [`MlResult`]'s attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairnessResult {
    pub is_biased: bool,
    pub flagged_features: BTreeMap<String, String>,
    pub result_id: ResultId,
    pub notes: Option<String>,
}

/// Outcome stored on a decision record.
///
/// Overrides may carry any status an underwriter chooses, so values outside the
/// resolver's vocabulary survive as [`FinalDecision::Manual`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FinalDecision {
    Approved,
    Rejected,
    PendingConflict,
    PendingBiased,
    Error,
    Manual(String),
}

impl FinalDecision {
    pub fn label(&self) -> &str {
        match self {
            FinalDecision::Approved => "approved",
            FinalDecision::Rejected => "rejected",
            FinalDecision::PendingConflict => "pending_conflict",
            FinalDecision::PendingBiased => "pending_biased",
            FinalDecision::Error => "error",
            FinalDecision::Manual(value) => value,
        }
    }

    /// Parses a status string, folding case so `"Approved"` and `"approved"` agree.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "approved" => FinalDecision::Approved,
            "rejected" => FinalDecision::Rejected,
            "pending_conflict" => FinalDecision::PendingConflict,
            "pending_biased" => FinalDecision::PendingBiased,
            "error" => FinalDecision::Error,
            _ => FinalDecision::Manual(normalized),
        }
    }
}

impl From<String> for FinalDecision {
    fn from(value: String) -> Self {
        FinalDecision::parse(&value)
    }
}

impl From<FinalDecision> for String {
    fn from(value: FinalDecision) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for FinalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a record came from the resolver or from an underwriter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Auto,
    Override,
}

impl DecisionType {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionType::Auto => "auto",
            DecisionType::Override => "override",
        }
    }
}

/// Append-only ledger row. The latest row per borrower by `created_at` is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: DecisionId,
    #[serde(rename = "type")]
    pub kind: DecisionType,
    pub borrower_id: BorrowerId,
    pub document_id: DocumentId,
    pub final_decision: FinalDecision,
    /// JSON-serialized justification.
    pub explanation: String,
    pub rule_result_id: Option<ResultId>,
    pub ml_result_id: Option<ResultId>,
    #[serde(rename = "fairness_audit_log_id")]
    pub fairness_result_id: Option<ResultId>,
    pub created_at: DateTime<Utc>,
}

/// Evaluator result ids linked from a decision record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultLinks {
    pub rule_result_id: Option<ResultId>,
    pub ml_result_id: Option<ResultId>,
    pub fairness_result_id: Option<ResultId>,
}
