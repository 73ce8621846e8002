use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{error, info};

use super::domain::{
    BorrowerId, DecisionId, DecisionRecord, DecisionType, DocumentId, FinalDecision, ResultLinks,
};
use super::explanation::Justification;
use crate::telemetry::LEDGER_WRITE_FAILURES;

/// Storage behind the decision ledger. Implementations only ever append.
pub trait LedgerStore: Send + Sync {
    fn append(&self, record: DecisionRecord) -> Result<(), LedgerError>;
    /// Every record for the borrower, in insertion order.
    fn for_borrower(&self, borrower_id: &BorrowerId) -> Result<Vec<DecisionRecord>, LedgerError>;
    /// Every record, in insertion order.
    fn all(&self) -> Result<Vec<DecisionRecord>, LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Mutex-guarded, process-local ledger.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLedgerStore {
    records: Arc<Mutex<Vec<DecisionRecord>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Vec<DecisionRecord>>, LedgerError> {
        self.records
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger mutex poisoned".to_string()))
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn append(&self, record: DecisionRecord) -> Result<(), LedgerError> {
        self.guard()?.push(record);
        Ok(())
    }

    fn for_borrower(&self, borrower_id: &BorrowerId) -> Result<Vec<DecisionRecord>, LedgerError> {
        Ok(self
            .guard()?
            .iter()
            .filter(|record| &record.borrower_id == borrower_id)
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<DecisionRecord>, LedgerError> {
        Ok(self.guard()?.clone())
    }
}

/// A decision about to be appended.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub borrower_id: BorrowerId,
    pub document_id: DocumentId,
    pub final_decision: FinalDecision,
    pub justification: Justification,
    pub links: ResultLinks,
    pub kind: DecisionType,
}

impl LedgerEntry {
    fn into_record(self) -> DecisionRecord {
        DecisionRecord {
            id: DecisionId::generate(),
            kind: self.kind,
            borrower_id: self.borrower_id,
            document_id: self.document_id,
            final_decision: self.final_decision,
            explanation: self.justification.encode(),
            rule_result_id: self.links.rule_result_id,
            ml_result_id: self.links.ml_result_id,
            fairness_result_id: self.links.fairness_result_id,
            created_at: Utc::now(),
        }
    }
}

/// Append-only decision history keyed by borrower.
pub struct DecisionLedger<S> {
    store: Arc<S>,
}

impl<S> Clone for DecisionLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> DecisionLedger<S>
where
    S: LedgerStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Appends a coordination outcome.
    ///
    /// A failed write is logged and counted but never surfaced: the decision response
    /// still goes back to the caller, at the cost of a missing audit row.
    pub fn record(&self, entry: LedgerEntry) -> Option<DecisionId> {
        let borrower_id = entry.borrower_id.clone();
        let decision = entry.final_decision.clone();

        match self.append(entry) {
            Ok(record) => {
                info!(
                    borrower_id = %borrower_id,
                    decision_id = %record.id,
                    final_decision = %decision,
                    "decision recorded"
                );
                Some(record.id)
            }
            Err(err) => {
                metrics::counter!(LEDGER_WRITE_FAILURES).increment(1);
                error!(
                    borrower_id = %borrower_id,
                    final_decision = %decision,
                    error = %err,
                    "decision ledger write failed; audit record dropped"
                );
                None
            }
        }
    }

    /// Appends and returns the stored record, propagating storage failures.
    pub fn append(&self, entry: LedgerEntry) -> Result<DecisionRecord, LedgerError> {
        let record = entry.into_record();
        self.store.append(record.clone())?;
        Ok(record)
    }

    /// Borrower history, newest first.
    ///
    /// Records sharing a timestamp keep the later insertion in front.
    pub fn history(&self, borrower_id: &BorrowerId) -> Result<Vec<DecisionRecord>, LedgerError> {
        let mut records = self.store.for_borrower(borrower_id)?;
        records.reverse();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Latest record for the borrower, if any.
    pub fn current(&self, borrower_id: &BorrowerId) -> Result<Option<DecisionRecord>, LedgerError> {
        let history = self.history(borrower_id)?;
        Ok(current_decision(&history).cloned())
    }

    /// Whole ledger, oldest first.
    pub fn export(&self) -> Result<Vec<DecisionRecord>, LedgerError> {
        let mut records = self.store.all()?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}

/// Current status over a newest-first history.
pub fn current_decision(history: &[DecisionRecord]) -> Option<&DecisionRecord> {
    history.first()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::domain::ResultId;
    use chrono::{Duration, TimeZone};

    struct BrokenStore;

    impl LedgerStore for BrokenStore {
        fn append(&self, _record: DecisionRecord) -> Result<(), LedgerError> {
            Err(LedgerError::Unavailable("disk full".to_string()))
        }

        fn for_borrower(&self, _: &BorrowerId) -> Result<Vec<DecisionRecord>, LedgerError> {
            Err(LedgerError::Unavailable("disk full".to_string()))
        }

        fn all(&self) -> Result<Vec<DecisionRecord>, LedgerError> {
            Err(LedgerError::Unavailable("disk full".to_string()))
        }
    }

    fn borrower() -> BorrowerId {
        BorrowerId("borrower-1".to_string())
    }

    fn entry(decision: FinalDecision) -> LedgerEntry {
        LedgerEntry {
            borrower_id: borrower(),
            document_id: DocumentId("doc-1".to_string()),
            final_decision: decision,
            justification: Justification::Error {
                reason: "timeout_or_missing".to_string(),
                message: "timeout or missing response".to_string(),
            },
            links: ResultLinks::default(),
            kind: DecisionType::Auto,
        }
    }

    fn stored(
        id: &str,
        decision: FinalDecision,
        kind: DecisionType,
        minute: u32,
    ) -> DecisionRecord {
        DecisionRecord {
            id: DecisionId(id.to_string()),
            kind,
            borrower_id: borrower(),
            document_id: DocumentId("doc-1".to_string()),
            final_decision: decision,
            explanation: "{}".to_string(),
            rule_result_id: (kind == DecisionType::Auto).then(|| ResultId("r".to_string())),
            ml_result_id: (kind == DecisionType::Auto).then(|| ResultId("m".to_string())),
            fairness_result_id: (kind == DecisionType::Auto).then(|| ResultId("f".to_string())),
            created_at: Utc.with_ymd_and_hms(2025, 10, 28, 9, minute, 0).unwrap(),
        }
    }

    #[test]
    fn record_appends_and_returns_id() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let ledger = DecisionLedger::new(store.clone());

        let id = ledger.record(entry(FinalDecision::Error)).expect("recorded");
        let all = store.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].final_decision, FinalDecision::Error);
    }

    #[test]
    fn record_swallows_storage_failures() {
        let ledger = DecisionLedger::new(Arc::new(BrokenStore));
        assert!(ledger.record(entry(FinalDecision::Approved)).is_none());
        assert!(ledger.append(entry(FinalDecision::Approved)).is_err());
    }

    #[test]
    fn later_override_wins_even_without_evaluator_ids() {
        let store = Arc::new(InMemoryLedgerStore::new());
        // inserted out of timestamp order on purpose
        store
            .append(stored("late", FinalDecision::Approved, DecisionType::Override, 30))
            .unwrap();
        store
            .append(stored("early", FinalDecision::PendingConflict, DecisionType::Auto, 5))
            .unwrap();
        let ledger = DecisionLedger::new(store);

        let current = ledger.current(&borrower()).unwrap().expect("has decision");
        assert_eq!(current.id, DecisionId("late".to_string()));
        assert_eq!(current.kind, DecisionType::Override);
        assert!(current.rule_result_id.is_none());

        let history = ledger.history(&borrower()).unwrap();
        let ids: Vec<_> = history.iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["late", "early"]);
    }

    #[test]
    fn equal_timestamps_favor_later_insertion() {
        let store = Arc::new(InMemoryLedgerStore::new());
        store
            .append(stored("first", FinalDecision::Rejected, DecisionType::Auto, 10))
            .unwrap();
        store
            .append(stored("second", FinalDecision::Approved, DecisionType::Auto, 10))
            .unwrap();
        let ledger = DecisionLedger::new(store);

        let current = ledger.current(&borrower()).unwrap().unwrap();
        assert_eq!(current.id, DecisionId("second".to_string()));
    }

    #[test]
    fn export_is_oldest_first_across_borrowers() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let mut other = stored("other", FinalDecision::Rejected, DecisionType::Auto, 20);
        other.borrower_id = BorrowerId("borrower-2".to_string());
        other.created_at = other.created_at - Duration::minutes(30);
        store
            .append(stored("mine", FinalDecision::Approved, DecisionType::Auto, 20))
            .unwrap();
        store.append(other).unwrap();
        let ledger = DecisionLedger::new(store);

        let exported = ledger.export().unwrap();
        assert_eq!(exported[0].id, DecisionId("other".to_string()));
        assert_eq!(ledger.history(&borrower()).unwrap().len(), 1);
    }

    #[test]
    fn no_history_means_no_current_decision() {
        assert!(current_decision(&[]).is_none());
    }
}
