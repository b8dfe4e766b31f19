//! Health check results and per-component history

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PIPELINE: &str = "pipeline";
pub const RETRIEVAL: &str = "retrieval";
pub const KNOWLEDGE_BASE: &str = "knowledge_base";
pub const ERROR_RATE: &str = "error_rate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
        }
    }

    /// Classify a latency against degraded/critical thresholds
    pub fn from_latency(elapsed: Duration, degraded: Duration, critical: Duration) -> Self {
        if elapsed >= critical {
            HealthStatus::Critical
        } else if elapsed >= degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw output of one probe, before history-derived fields are filled in
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReading {
    pub component: String,
    pub status: HealthStatus,
    pub response_time: Duration,
    pub details: String,
    /// Probe-specific measurement, e.g. an error rate or quality score
    pub observed: Option<f64>,
}

impl ProbeReading {
    pub fn new(component: impl Into<String>, status: HealthStatus, response_time: Duration, details: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status,
            response_time,
            details: details.into(),
            observed: None,
        }
    }

    pub fn with_observed(mut self, value: f64) -> Self {
        self.observed = Some(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub component: String,
    pub status: HealthStatus,
    pub response_time_ms: f64,
    /// Critical results in a row, including this one
    pub consecutive_failures: u32,
    /// Healthy share of the uptime window, 0..100
    pub uptime_pct: f64,
    pub details: String,
    pub checked_at: DateTime<Utc>,
}

/// Bounded ring buffer of results for one component
#[derive(Debug, Clone)]
pub struct ComponentHistory {
    results: VecDeque<HealthCheckResult>,
    capacity: usize,
    uptime_window: usize,
}

impl ComponentHistory {
    pub fn new(capacity: usize, uptime_window: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            results: VecDeque::with_capacity(capacity),
            capacity,
            uptime_window: uptime_window.clamp(1, capacity),
        }
    }

    /// Append a reading and return it with derived fields filled in
    pub fn record(&mut self, reading: ProbeReading) -> HealthCheckResult {
        let consecutive_failures = match (reading.status, self.results.back()) {
            (HealthStatus::Critical, Some(previous)) => previous.consecutive_failures.saturating_add(1),
            (HealthStatus::Critical, None) => 1,
            _ => 0,
        };

        if self.results.len() >= self.capacity {
            self.results.pop_front();
        }

        let mut result = HealthCheckResult {
            component: reading.component,
            status: reading.status,
            response_time_ms: reading.response_time.as_secs_f64() * 1000.0,
            consecutive_failures,
            uptime_pct: 0.0,
            details: reading.details,
            checked_at: Utc::now(),
        };
        self.results.push_back(result.clone());

        result.uptime_pct = self.uptime_pct();
        if let Some(last) = self.results.back_mut() {
            last.uptime_pct = result.uptime_pct;
        }
        result
    }

    /// Healthy share of the last `uptime_window` results, 0..100
    pub fn uptime_pct(&self) -> f64 {
        let window: Vec<&HealthCheckResult> = self.results.iter().rev().take(self.uptime_window).collect();
        if window.is_empty() {
            return 100.0;
        }
        let healthy = window.iter().filter(|r| r.status == HealthStatus::Healthy).count();
        healthy as f64 / window.len() as f64 * 100.0
    }

    /// Whether enough results exist for uptime to be meaningful
    pub fn window_full(&self) -> bool {
        self.results.len() >= self.uptime_window
    }

    pub fn latest(&self) -> Option<&HealthCheckResult> {
        self.results.back()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// (checked_at, response time in ms), oldest first
    pub fn response_times(&self) -> Vec<(DateTime<Utc>, f64)> {
        self.results.iter().map(|r| (r.checked_at, r.response_time_ms)).collect()
    }
}
