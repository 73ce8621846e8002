use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    BorrowerId, DecisionRecord, DecisionType, FairnessResult, MlResult, MlStatus, RuleResult,
    RuleStatus,
};

/// Justification persisted (as JSON) in a decision record's `explanation` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Justification {
    Resolved {
        rule_status: RuleStatus,
        rule_reasons: BTreeMap<String, String>,
        ml_status: MlStatus,
        ml_confidence: f64,
        feature_attribution: BTreeMap<String, f64>,
        is_biased: bool,
        flagged_features: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fairness_notes: Option<String>,
    },
    Error {
        reason: String,
        message: String,
    },
    Override {
        underwriter_id: String,
        message: String,
    },
}

impl Justification {
    pub fn resolved(rule: &RuleResult, ml: &MlResult, fairness: &FairnessResult) -> Self {
        Justification::Resolved {
            rule_status: rule.status,
            rule_reasons: rule.reasons.clone(),
            ml_status: ml.status,
            ml_confidence: ml.confidence,
            feature_attribution: ml.feature_attribution.clone(),
            is_biased: fairness.is_biased,
            flagged_features: fairness.flagged_features.clone(),
            fairness_notes: fairness.notes.clone(),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Justification::Resolved {
                rule_status,
                ml_status,
                is_biased,
                ..
            } => format!(
                "rules {}, model {}, bias {}",
                rule_status.label(),
                ml_status.label(),
                if *is_biased { "detected" } else { "not detected" }
            ),
            Justification::Error { message, .. } | Justification::Override { message, .. } => {
                message.clone()
            }
        }
    }

    /// Serialized form stored on the ledger.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.summary())
    }

    /// Reads a stored explanation; rows written by other tools may hold plain text.
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Passed and failed factors reported by one evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorExplanation {
    pub result: String,
    pub summary: Option<String>,
    pub passed_cases: Vec<String>,
    pub failed_cases: Vec<String>,
}

/// Underwriter-facing explanation of a borrower's current decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionExplanation {
    pub borrower_id: BorrowerId,
    pub status: String,
    #[serde(rename = "type")]
    pub kind: DecisionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_explanation: Option<FactorExplanation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ml_explanation: Option<FactorExplanation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fairness_explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub decided_at: DateTime<Utc>,
}

impl DecisionExplanation {
    pub fn from_record(record: &DecisionRecord) -> Self {
        let mut explanation = DecisionExplanation {
            borrower_id: record.borrower_id.clone(),
            status: record.final_decision.label().to_string(),
            kind: record.kind,
            rule_explanation: None,
            ml_explanation: None,
            fairness_explanation: None,
            message: None,
            decided_at: record.created_at,
        };

        match Justification::decode(&record.explanation) {
            Some(Justification::Resolved {
                rule_status,
                rule_reasons,
                ml_status,
                ml_confidence,
                feature_attribution,
                is_biased,
                flagged_features,
                fairness_notes,
            }) => {
                explanation.rule_explanation = Some(rule_factors(rule_status, &rule_reasons));
                explanation.ml_explanation =
                    Some(ml_factors(ml_status, ml_confidence, &feature_attribution));
                explanation.fairness_explanation =
                    Some(fairness_summary(is_biased, &flagged_features, fairness_notes));
            }
            Some(other) => explanation.message = Some(other.summary()),
            None => explanation.message = Some(record.explanation.clone()),
        }

        explanation
    }
}

fn rule_factors(status: RuleStatus, reasons: &BTreeMap<String, String>) -> FactorExplanation {
    let (passed, failed): (Vec<_>, Vec<_>) = reasons
        .iter()
        .partition(|(_, outcome)| outcome.trim().to_ascii_lowercase().starts_with("passed"));

    FactorExplanation {
        result: status.label().to_string(),
        summary: None,
        passed_cases: passed.into_iter().map(|(name, _)| name.clone()).collect(),
        failed_cases: failed
            .into_iter()
            .map(|(name, outcome)| format!("{name}: {outcome}"))
            .collect(),
    }
}

fn ml_factors(
    status: MlStatus,
    confidence: f64,
    attribution: &BTreeMap<String, f64>,
) -> FactorExplanation {
    let mut positive: Vec<(&String, f64)> = attribution
        .iter()
        .filter(|(_, weight)| **weight > 0.0)
        .map(|(name, weight)| (name, *weight))
        .collect();
    let mut negative: Vec<(&String, f64)> = attribution
        .iter()
        .filter(|(_, weight)| **weight < 0.0)
        .map(|(name, weight)| (name, *weight))
        .collect();

    // strongest contributors first
    positive.sort_by(|a, b| b.1.total_cmp(&a.1));
    negative.sort_by(|a, b| a.1.total_cmp(&b.1));

    FactorExplanation {
        result: status.label().to_string(),
        summary: Some(format!(
            "model predicted a confidence score of {confidence:.2}"
        )),
        passed_cases: positive.into_iter().map(|(name, _)| name.clone()).collect(),
        failed_cases: negative.into_iter().map(|(name, _)| name.clone()).collect(),
    }
}

fn fairness_summary(
    is_biased: bool,
    flagged: &BTreeMap<String, String>,
    notes: Option<String>,
) -> String {
    if !is_biased {
        return notes.unwrap_or_else(|| "No significant bias detected.".to_string());
    }

    let features = flagged
        .iter()
        .map(|(feature, impact)| format!("{feature} ({impact})"))
        .collect::<Vec<_>>()
        .join(", ");
    match notes {
        Some(notes) => format!("{notes} Flagged: {features}"),
        None => format!("Bias detected. Flagged: {features}"),
    }
}
