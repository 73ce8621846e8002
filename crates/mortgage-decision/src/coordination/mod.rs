//! Decision coordination engine.
//!
//! One attempt fans out to the rule and ML evaluators under a single deadline,
//! runs the fairness audit once both are in, resolves the three verdicts into a
//! final decision, and appends exactly one ledger row whatever happened on the way.

pub mod clients;
pub mod domain;
pub mod eligibility;
pub mod error;
pub mod explanation;
pub mod export;
pub mod fairness;
pub mod ledger;
pub mod overrides;
pub mod resolver;
pub mod router;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod tests;

pub use clients::{
    EvaluatorError, EvaluatorKind, EvaluatorSet, FairnessAuditor, HttpEvaluatorClient,
    MlEvaluator, RuleEvaluator,
};
pub use domain::{
    BorrowerId, DecisionId, DecisionRecord, DecisionType, DocumentId, EvaluationRequest,
    FairnessResult, FinalDecision, MlResult, MlStatus, ResultId, ResultLinks, RuleResult,
    RuleStatus,
};
pub use eligibility::{submission_eligibility, SubmissionEligibility};
pub use error::CoordinationError;
pub use explanation::{DecisionExplanation, Justification};
pub use ledger::{current_decision, DecisionLedger, InMemoryLedgerStore, LedgerError, LedgerStore};
pub use overrides::{ManualDecisionUpdate, OverrideError, OverrideOutcome, UnderwriterOverrides};
pub use resolver::{decision_matrix, resolve};
pub use router::decision_router;
pub use service::{
    coordinator_from_config, CoordinationOutcome, DecisionCoordinator, ResolvedDecision,
};
