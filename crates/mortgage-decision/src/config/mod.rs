use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub coordinator: CoordinatorConfig,
    pub underwriters: Vec<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let coordinator = CoordinatorConfig {
            rule_engine_url: env::var("RULE_ENGINE_URL")
                .unwrap_or_else(|_| DEFAULT_RULE_ENGINE_URL.to_string()),
            ml_decision_url: env::var("ML_DECISION_URL")
                .unwrap_or_else(|_| DEFAULT_ML_DECISION_URL.to_string()),
            fairness_auditor_url: env::var("FAIRNESS_AUDITOR_URL")
                .unwrap_or_else(|_| DEFAULT_FAIRNESS_AUDITOR_URL.to_string()),
            call_timeout: seconds_from_env("EVALUATOR_TIMEOUT_SECONDS")?,
            join_timeout: seconds_from_env("DECISION_JOIN_TIMEOUT_SECONDS")?,
            worker_pool_size: env::var("DECISION_WORKER_POOL_SIZE")
                .unwrap_or_else(|_| "2".to_string())
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidPoolSize)?,
        };
        coordinator.validate()?;

        let underwriters = env::var("DECISION_UNDERWRITERS")
            .map(|raw| parse_roster(&raw))
            .unwrap_or_default();

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            coordinator,
            underwriters,
        })
    }
}

const DEFAULT_RULE_ENGINE_URL: &str = "http://rule-engine-service:8000";
const DEFAULT_ML_DECISION_URL: &str = "http://ml-decision-service:8000";
const DEFAULT_FAIRNESS_AUDITOR_URL: &str = "http://fairness-auditor-service:8000";
const DEFAULT_TIMEOUT_SECONDS: f64 = 5.0;

fn seconds_from_env(var: &'static str) -> Result<Duration, ConfigError> {
    let seconds = match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .map_err(|_| ConfigError::InvalidTimeout { var })?,
        Err(_) => DEFAULT_TIMEOUT_SECONDS,
    };

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ConfigError::InvalidTimeout { var });
    }

    Ok(Duration::from_secs_f64(seconds))
}

fn parse_roster(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Evaluator endpoints and the deadlines governing one coordination attempt.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub rule_engine_url: String,
    pub ml_decision_url: String,
    pub fairness_auditor_url: String,
    /// Bound applied by the HTTP client to every evaluator call.
    pub call_timeout: Duration,
    /// Total deadline for the rule + ML join.
    pub join_timeout: Duration,
    /// Concurrent evaluator calls allowed inside a single coordination.
    pub worker_pool_size: usize,
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }
        if self.call_timeout > self.join_timeout {
            return Err(ConfigError::CallOutlivesJoin {
                call: self.call_timeout,
                join: self.join_timeout,
            });
        }
        Ok(())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            rule_engine_url: DEFAULT_RULE_ENGINE_URL.to_string(),
            ml_decision_url: DEFAULT_ML_DECISION_URL.to_string(),
            fairness_auditor_url: DEFAULT_FAIRNESS_AUDITOR_URL.to_string(),
            call_timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECONDS),
            join_timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECONDS),
            worker_pool_size: 2,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTimeout { var: &'static str },
    InvalidPoolSize,
    CallOutlivesJoin { call: Duration, join: Duration },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTimeout { var } => {
                write!(f, "{var} must be a positive number of seconds")
            }
            ConfigError::InvalidPoolSize => {
                write!(f, "DECISION_WORKER_POOL_SIZE must be a positive integer")
            }
            ConfigError::CallOutlivesJoin { call, join } => write!(
                f,
                "evaluator timeout ({:.2}s) must not exceed the join timeout ({:.2}s)",
                call.as_secs_f64(),
                join.as_secs_f64()
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
