//! In-process performance metric log
//!
//! Append-only and capacity-bounded: once full, the oldest sample is dropped.
//! The error-rate probe reads recommendation outcomes back from here.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metric recorded once per `recommend` call
pub const RECOMMENDATION_METRIC: &str = "recommendation_latency";

/// Tag carrying the `CallOutcome` of a recommendation
pub const OUTCOME_TAG: &str = "outcome";

/// How a recommendation call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// A tool was recommended
    Success,
    /// Retrieval worked but nothing matched or survived filtering
    NoMatch,
    /// Every eligible strategy failed
    Failed,
    /// Blank task description, nothing searched
    EmptyTask,
    /// The caller cancelled before a strategy answered
    Cancelled,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::NoMatch => "no_match",
            CallOutcome::Failed => "failed",
            CallOutcome::EmptyTask => "empty_task",
            CallOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub tags: BTreeMap<String, String>,
}

impl PerformanceMetric {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            name: name.into(),
            value,
            unit: unit.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Debug)]
pub struct PerformanceLog {
    entries: Mutex<VecDeque<PerformanceMetric>>,
    capacity: usize,
}

impl PerformanceLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PerformanceMetric>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, metric: PerformanceMetric) {
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(metric);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `limit` most recent samples named `name`, oldest first
    pub fn recent(&self, name: &str, limit: usize) -> Vec<PerformanceMetric> {
        let entries = self.lock();
        let mut recent: Vec<PerformanceMetric> = entries
            .iter()
            .rev()
            .filter(|m| m.name == name)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    /// Fraction of the last `window` recommendations that failed outright
    pub fn error_rate(&self, window: usize) -> Option<f64> {
        let recent = self.recent(RECOMMENDATION_METRIC, window);
        if recent.is_empty() {
            return None;
        }
        let failed = recent
            .iter()
            .filter(|m| m.tag_value(OUTCOME_TAG) == Some(CallOutcome::Failed.as_str()))
            .count();
        Some(failed as f64 / recent.len() as f64)
    }
}
