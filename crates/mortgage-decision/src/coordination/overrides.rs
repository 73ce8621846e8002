use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{BorrowerId, DecisionRecord, DecisionType, FinalDecision, ResultLinks};
use super::explanation::Justification;
use super::ledger::{DecisionLedger, LedgerEntry, LedgerError, LedgerStore};

/// Underwriter request to replace a borrower's current decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualDecisionUpdate {
    pub underwriter_id: String,
    pub borrower_id: BorrowerId,
    pub new_status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverrideOutcome {
    /// The current decision already carried the requested status; nothing appended.
    Unchanged { current: FinalDecision },
    Recorded(DecisionRecord),
}

#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("permission denied: '{0}' is not an authorized underwriter")]
    Unauthorized(String),
    #[error("no decision record found for borrower {0}")]
    NoDecision(BorrowerId),
    #[error("new status must not be empty")]
    EmptyStatus,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Manual override path. It sits outside the resolver: whatever status the
/// underwriter picks becomes the borrower's latest record.
pub struct UnderwriterOverrides<S> {
    ledger: DecisionLedger<S>,
    roster: HashSet<String>,
}

impl<S> UnderwriterOverrides<S>
where
    S: LedgerStore + 'static,
{
    pub fn new<I>(ledger: DecisionLedger<S>, underwriters: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            ledger,
            roster: underwriters.into_iter().collect(),
        }
    }

    pub fn is_underwriter(&self, underwriter_id: &str) -> bool {
        self.roster.contains(underwriter_id)
    }

    pub fn apply(&self, update: ManualDecisionUpdate) -> Result<OverrideOutcome, OverrideError> {
        if !self.is_underwriter(&update.underwriter_id) {
            warn!(underwriter_id = %update.underwriter_id, "override rejected: not on roster");
            return Err(OverrideError::Unauthorized(update.underwriter_id));
        }
        if update.new_status.trim().is_empty() {
            return Err(OverrideError::EmptyStatus);
        }

        let latest = self
            .ledger
            .current(&update.borrower_id)?
            .ok_or_else(|| OverrideError::NoDecision(update.borrower_id.clone()))?;

        let requested = FinalDecision::parse(&update.new_status);
        if latest.final_decision == requested {
            return Ok(OverrideOutcome::Unchanged {
                current: latest.final_decision,
            });
        }

        let message = format!("Updated by underwriter {}", update.underwriter_id);
        let record = self.ledger.append(LedgerEntry {
            borrower_id: update.borrower_id.clone(),
            document_id: latest.document_id,
            final_decision: requested,
            justification: Justification::Override {
                underwriter_id: update.underwriter_id.clone(),
                message,
            },
            links: ResultLinks::default(),
            kind: DecisionType::Override,
        })?;

        info!(
            underwriter_id = %update.underwriter_id,
            borrower_id = %update.borrower_id,
            previous = %latest.final_decision,
            final_decision = %record.final_decision,
            "underwriter override recorded"
        );
        Ok(OverrideOutcome::Recorded(record))
    }
}
