use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Counter bumped whenever a decision record could not be appended.
pub const LEDGER_WRITE_FAILURES: &str = "decision_ledger_write_failures_total";
/// Counter of finished coordination attempts, labelled by final decision.
pub const DECISION_OUTCOMES: &str = "decision_outcomes_total";

// HTTP client internals log every connection at debug.
const QUIET_TARGETS: [&str; 3] = ["hyper=warn", "hyper_util=warn", "reqwest=warn"];

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(f, "invalid log filter '{}': unable to build EnvFilter", value)
            }
            TelemetryError::Subscriber(err) => write!(f, "subscriber already installed: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Filter directives for a configured level; `RUST_LOG` still wins when set.
pub fn filter_directives(log_level: &str) -> String {
    let level = log_level.trim();
    if level.contains(',') || level.contains('=') {
        // already a full directive list
        return level.to_string();
    }
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| target.to_string()));
    directives.join(",")
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = filter_directives(&config.log_level);
            EnvFilter::try_new(&directives).map_err(|source| TelemetryError::EnvFilter {
                value: directives.clone(),
                source,
            })?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// Registers help text for the engine's counters. Call after the recorder is installed.
pub fn describe_metrics() {
    metrics::describe_counter!(
        LEDGER_WRITE_FAILURES,
        "Decision records dropped because the ledger write failed"
    );
    metrics::describe_counter!(
        DECISION_OUTCOMES,
        "Coordination attempts by final decision"
    );
}
