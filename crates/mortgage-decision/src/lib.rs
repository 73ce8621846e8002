//! Underwriting decision coordination: fans out to the rule, ML and fairness
//! evaluators, resolves their verdicts, and keeps an append-only decision ledger.

pub mod config;
pub mod coordination;
pub mod error;
pub mod telemetry;
