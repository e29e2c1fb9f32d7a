//! Service configuration.

use std::path::Path;
use std::str::FromStr;

use tollgate_core::{MeterError, ProviderRegistry};

use crate::engine::advisor::AdvisorConfig;

/// Which ledger backend to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local, lost on restart.
    Memory,
    /// `RocksDB` under `data_dir`.
    Rocksdb,
}

impl FromStr for StorageBackend {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rocksdb" => Ok(Self::Rocksdb),
            other => Err(MeterError::Configuration(format!(
                "unknown storage backend: {other}"
            ))),
        }
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to the `RocksDB` data directory (default: "/data/tollgate").
    pub data_dir: String,

    /// Ledger backend (default: memory).
    pub storage: StorageBackend,

    /// API key collectors present in `x-api-key`.
    pub service_api_key: Option<String>,

    /// Admin key for budget and subscription writes (`x-admin-key`).
    pub admin_api_key: Option<String>,

    /// JSON provider catalog; the built-in catalog is used when unset.
    pub providers_file: Option<String>,

    /// Monthly budget applied at startup when none is stored.
    pub monthly_budget_usd: Option<f64>,

    /// Webhook receiving every budget alert.
    pub alert_webhook_url: Option<String>,

    /// Secret for the `x-tollgate-signature` header.
    pub alert_webhook_secret: Option<String>,

    /// Timeout for one webhook delivery.
    pub alert_webhook_timeout_seconds: u64,

    /// Health snapshot / rollover / threshold recompute interval.
    pub health_interval_seconds: u64,

    /// Summary report interval.
    pub report_interval_seconds: u64,

    /// Trailing window of the health monitor.
    pub health_window_hours: u32,

    /// Optimization advisor thresholds.
    pub advisor: AdvisorConfig,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let advisor = AdvisorConfig {
            plan_upgrade_threshold_usd: env_or(
                "ADVISOR_PLAN_UPGRADE_THRESHOLD_USD",
                defaults.advisor.plan_upgrade_threshold_usd,
            ),
            error_rate_threshold: env_or(
                "ADVISOR_ERROR_RATE_THRESHOLD",
                defaults.advisor.error_rate_threshold,
            ),
            error_rate_min_requests: env_or(
                "ADVISOR_ERROR_RATE_MIN_REQUESTS",
                defaults.advisor.error_rate_min_requests,
            ),
            slow_response_ms: env_or("ADVISOR_SLOW_RESPONSE_MS", defaults.advisor.slow_response_ms),
            duplicate_threshold: env_or(
                "ADVISOR_DUPLICATE_THRESHOLD",
                defaults.advisor.duplicate_threshold,
            ),
            duplicate_window_minutes: env_or(
                "ADVISOR_DUPLICATE_WINDOW_MINUTES",
                defaults.advisor.duplicate_window_minutes,
            ),
        };

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            storage: std::env::var("STORAGE")
                .ok()
                .and_then(|s| match s.parse() {
                    Ok(backend) => Some(backend),
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring STORAGE, using memory");
                        None
                    }
                })
                .unwrap_or(defaults.storage),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            providers_file: std::env::var("PROVIDERS_FILE").ok(),
            monthly_budget_usd: std::env::var("MONTHLY_BUDGET_USD")
                .ok()
                .and_then(|s| s.parse().ok()),
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL").ok(),
            alert_webhook_secret: std::env::var("ALERT_WEBHOOK_SECRET").ok(),
            alert_webhook_timeout_seconds: env_or(
                "ALERT_WEBHOOK_TIMEOUT_SECONDS",
                defaults.alert_webhook_timeout_seconds,
            ),
            health_interval_seconds: env_or(
                "HEALTH_INTERVAL_SECONDS",
                defaults.health_interval_seconds,
            ),
            report_interval_seconds: env_or(
                "REPORT_INTERVAL_SECONDS",
                defaults.report_interval_seconds,
            ),
            health_window_hours: env_or("HEALTH_WINDOW_HOURS", defaults.health_window_hours),
            advisor,
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_or("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_or(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
        }
    }

    /// Load the provider catalog: `providers_file` if set, else the built-in one.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the file cannot be read or parsed, and the
    /// registry's validation errors for a malformed catalog.
    pub fn load_registry(&self) -> Result<ProviderRegistry, MeterError> {
        let Some(path) = &self.providers_file else {
            tracing::debug!("PROVIDERS_FILE not set, using built-in provider catalog");
            return Ok(ProviderRegistry::with_defaults());
        };

        let path = Path::new(path);
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MeterError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let registry = ProviderRegistry::from_json(&contents)?;
        tracing::info!(
            path = %path.display(),
            providers = registry.len(),
            "Loaded provider catalog"
        );
        Ok(registry)
    }
}

/// Parse an environment variable, falling back to `default` when unset or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key = %key, value = %raw, "Ignoring malformed setting");
            default
        }),
        Err(_) => default,
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/tollgate".into(),
            storage: StorageBackend::Memory,
            service_api_key: None,
            admin_api_key: None,
            providers_file: None,
            monthly_budget_usd: None,
            alert_webhook_url: None,
            alert_webhook_secret: None,
            alert_webhook_timeout_seconds: 10,
            health_interval_seconds: 300,
            report_interval_seconds: 86_400,
            health_window_hours: 24,
            advisor: AdvisorConfig::default(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}
