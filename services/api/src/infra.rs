use metrics_exporter_prometheus::PrometheusHandle;
use mortgage_decision::config::AppConfig;
use mortgage_decision::coordination::{
    coordinator_from_config, decision_router, InMemoryLedgerStore, UnderwriterOverrides,
};
use mortgage_decision::error::AppError;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wires the coordinator, the shared in-process ledger and the override desk
/// into the decision router.
pub(crate) fn decision_engine(config: &AppConfig) -> Result<axum::Router, AppError> {
    let store = Arc::new(InMemoryLedgerStore::new());
    let coordinator = coordinator_from_config(&config.coordinator, store)?;

    if config.underwriters.is_empty() {
        warn!("DECISION_UNDERWRITERS is empty; manual overrides will be refused");
    }
    let overrides = UnderwriterOverrides::new(
        coordinator.shared_ledger(),
        config.underwriters.iter().cloned(),
    );

    info!(
        rule_engine = %config.coordinator.rule_engine_url,
        ml_decision = %config.coordinator.ml_decision_url,
        fairness_auditor = %config.coordinator.fairness_auditor_url,
        join_timeout_ms = config.coordinator.join_timeout.as_millis() as u64,
        worker_pool_size = config.coordinator.worker_pool_size,
        "decision engine wired"
    );

    Ok(decision_router(Arc::new(coordinator), Arc::new(overrides)))
}
