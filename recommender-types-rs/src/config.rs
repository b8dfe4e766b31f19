// recommender-types-rs/src/config.rs
// Configuration loader for the recommendation engine

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "./config/recommender.toml";
const ENV_PREFIX: &str = "RECOMMENDER";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub knowledge_top_k: usize,
    pub min_knowledge_relevance: f64,
    pub call_timeout_ms: u64,
    pub embedding_dimensions: usize,
    pub embedding_cache_ttl_secs: u64,
    pub embedding_cache_capacity: usize,
    /// Whether an empty candidate list also counts against the breaker
    pub empty_result_counts_as_failure: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            knowledge_top_k: 3,
            min_knowledge_relevance: 0.2,
            call_timeout_ms: 5_000,
            embedding_dimensions: 256,
            embedding_cache_ttl_secs: 600,
            embedding_cache_capacity: 1_024,
            empty_result_counts_as_failure: false,
        }
    }
}

impl RetrievalConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cool_down_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cool_down_ms: 60_000,
        }
    }
}

impl BreakerConfig {
    pub fn cool_down(&self) -> Duration {
        Duration::from_millis(self.cool_down_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchModeConfig {
    Sequential,
    Parallel,
}

impl FromStr for BatchModeConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(BatchModeConfig::Sequential),
            "parallel" => Ok(BatchModeConfig::Parallel),
            other => Err(ConfigError::InvalidValue(format!("unknown batch mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub mode: BatchModeConfig,
    pub inter_call_delay_ms: u64,
    pub max_in_flight: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            mode: BatchModeConfig::Sequential,
            inter_call_delay_ms: 1_000,
            max_in_flight: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub history_capacity: usize,
    pub uptime_window: usize,
    pub pipeline_degraded_ms: u64,
    pub pipeline_critical_ms: u64,
    pub retrieval_degraded_ms: u64,
    pub retrieval_critical_ms: u64,
    pub knowledge_min_entries: usize,
    pub knowledge_min_quality: f64,
    pub error_rate_window: usize,
    pub error_rate_degraded: f64,
    pub error_rate_critical: f64,
    pub consecutive_failure_alert: u32,
    pub uptime_alert_pct: f64,
    pub alert_dedup_window_secs: u64,
    pub metrics_capacity: usize,
    pub auto_remediation: bool,
    pub probe_task_name: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            history_capacity: 100,
            uptime_window: 20,
            pipeline_degraded_ms: 2_000,
            pipeline_critical_ms: 5_000,
            retrieval_degraded_ms: 1_000,
            retrieval_critical_ms: 3_000,
            knowledge_min_entries: 1,
            knowledge_min_quality: 0.5,
            error_rate_window: 50,
            error_rate_degraded: 0.10,
            error_rate_critical: 0.50,
            consecutive_failure_alert: 3,
            uptime_alert_pct: 95.0,
            alert_dedup_window_secs: 300,
            metrics_capacity: 1_000,
            auto_remediation: true,
            probe_task_name: "Write Python web scraper".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub service_name: String,
    pub json_format: bool,
    pub file_output: bool,
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "recommendation-engine".to_string(),
            json_format: false,
            file_output: false,
            log_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `RECOMMENDER_CONFIG_PATH` (or the default path), falling back
    /// to built-in defaults when no file exists
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let config_path = env::var(format!("{}_CONFIG_PATH", ENV_PREFIX))
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        match Self::load(&config_path) {
            Err(ConfigError::FileNotFound(_)) => {
                tracing::info!(path = %config_path, "No config file, using defaults");
                Self::from_env()
            }
            other => other,
        }
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply `RECOMMENDER_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}_{}", ENV_PREFIX, name));

        if let Some(v) = parse_override(&get, "TOP_K")? {
            self.retrieval.top_k = v;
        }
        if let Some(v) = parse_override(&get, "CALL_TIMEOUT_MS")? {
            self.retrieval.call_timeout_ms = v;
        }
        if let Some(v) = parse_override(&get, "BREAKER_THRESHOLD")? {
            self.breaker.failure_threshold = v;
        }
        if let Some(v) = parse_override(&get, "BREAKER_COOL_DOWN_MS")? {
            self.breaker.cool_down_ms = v;
        }
        if let Some(v) = parse_override(&get, "BATCH_MODE")? {
            self.batch.mode = v;
        }
        if let Some(v) = parse_override(&get, "BATCH_DELAY_MS")? {
            self.batch.inter_call_delay_ms = v;
        }
        if let Some(v) = parse_override(&get, "BATCH_MAX_IN_FLIGHT")? {
            self.batch.max_in_flight = v;
        }
        if let Some(v) = parse_override(&get, "MONITOR_INTERVAL_SECS")? {
            self.monitor.interval_secs = v;
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = parse_override(&get, "LOG_JSON")? {
            self.logging.json_format = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::InvalidValue("retrieval.top_k must be > 0".into()));
        }
        if self.retrieval.call_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "retrieval.call_timeout_ms must be > 0".into(),
            ));
        }
        if self.retrieval.embedding_dimensions == 0 {
            return Err(ConfigError::InvalidValue(
                "retrieval.embedding_dimensions must be > 0".into(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "breaker.failure_threshold must be > 0".into(),
            ));
        }
        if self.batch.max_in_flight == 0 {
            return Err(ConfigError::InvalidValue("batch.max_in_flight must be > 0".into()));
        }
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::InvalidValue("monitor.interval_secs must be > 0".into()));
        }
        if self.monitor.uptime_window == 0 || self.monitor.history_capacity < self.monitor.uptime_window {
            return Err(ConfigError::InvalidValue(
                "monitor.history_capacity must hold at least one uptime window".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.monitor.uptime_alert_pct) {
            return Err(ConfigError::InvalidValue(
                "monitor.uptime_alert_pct must be within 0..=100".into(),
            ));
        }
        if self.monitor.error_rate_degraded > self.monitor.error_rate_critical {
            return Err(ConfigError::InvalidValue(
                "monitor.error_rate_degraded must not exceed error_rate_critical".into(),
            ));
        }
        Ok(())
    }
}

fn parse_override<T, G>(get: &G, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ConfigError::InvalidValue(format!("{}_{}={}: {}", ENV_PREFIX, name, raw, e))
        }),
        None => Ok(None),
    }
}
