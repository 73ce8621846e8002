use serde::Serialize;

use super::domain::DecisionRecord;

const COLUMNS: [&str; 10] = [
    "id",
    "type",
    "borrower_id",
    "document_id",
    "final_decision",
    "explanation",
    "rule_result_id",
    "ml_result_id",
    "fairness_audit_log_id",
    "created_at",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write ledger row: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush ledger export: {0}")]
    Flush(String),
    #[error("ledger export is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Serialize)]
struct LedgerRow<'a> {
    id: &'a str,
    kind: &'static str,
    borrower_id: &'a str,
    document_id: &'a str,
    final_decision: &'a str,
    explanation: &'a str,
    rule_result_id: Option<&'a str>,
    ml_result_id: Option<&'a str>,
    fairness_audit_log_id: Option<&'a str>,
    created_at: String,
}

impl<'a> From<&'a DecisionRecord> for LedgerRow<'a> {
    fn from(record: &'a DecisionRecord) -> Self {
        Self {
            id: &record.id.0,
            kind: record.kind.label(),
            borrower_id: &record.borrower_id.0,
            document_id: &record.document_id.0,
            final_decision: record.final_decision.label(),
            explanation: &record.explanation,
            rule_result_id: record.rule_result_id.as_ref().map(|id| id.0.as_str()),
            ml_result_id: record.ml_result_id.as_ref().map(|id| id.0.as_str()),
            fairness_audit_log_id: record.fairness_result_id.as_ref().map(|id| id.0.as_str()),
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

/// Renders ledger rows as CSV, header included even when there are no rows.
pub fn ledger_csv(records: &[DecisionRecord]) -> Result<String, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(COLUMNS)?;
    for record in records {
        writer.serialize(LedgerRow::from(record))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Flush(err.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
