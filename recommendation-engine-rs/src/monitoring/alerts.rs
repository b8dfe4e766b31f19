//! Alert lifecycle: raise with de-duplication, resolve on recovery

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Performance,
    Availability,
    ErrorRate,
    Quality,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::Performance => "performance",
            AlertCategory::Availability => "availability",
            AlertCategory::ErrorRate => "error_rate",
            AlertCategory::Quality => "quality",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub component: String,
    pub severity: AlertSeverity,
    pub category: AlertCategory,
    pub title: String,
    pub metric: String,
    pub threshold: f64,
    pub current_value: f64,
    pub action_items: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        component: impl Into<String>,
        severity: AlertSeverity,
        category: AlertCategory,
        metric: impl Into<String>,
        threshold: f64,
        current_value: f64,
    ) -> Self {
        let component = component.into();
        let metric = metric.into();
        Self {
            id: Uuid::new_v4().to_string(),
            title: format!("{} {} alert on {}", severity.as_str(), category.as_str(), component),
            component,
            severity,
            category,
            metric,
            threshold,
            current_value,
            action_items: Vec::new(),
            created_at: Utc::now(),
            resolved: false,
            resolved_at: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action_items.push(action.into());
        self
    }

    fn same_key(&self, other: &Alert) -> bool {
        self.component == other.component
            && self.category == other.category
            && self.metric == other.metric
            && self.severity == other.severity
    }
}

/// Stores alerts and suppresses duplicates inside the de-duplication window
#[derive(Debug)]
pub struct AlertManager {
    alerts: Mutex<Vec<Alert>>,
    dedup_window: Duration,
    capacity: usize,
}

impl AlertManager {
    pub fn new(dedup_window: Duration, capacity: usize) -> Self {
        Self {
            alerts: Mutex::new(Vec::new()),
            dedup_window,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Alert>> {
        self.alerts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store the alert unless an identical active one was raised within the
    /// window. Returns the stored alert.
    pub fn raise(&self, alert: Alert) -> Option<Alert> {
        let mut alerts = self.lock();
        let window = chrono::Duration::from_std(self.dedup_window).unwrap_or_else(|_| chrono::Duration::zero());
        let duplicate = alerts.iter().any(|existing| {
            !existing.resolved && existing.same_key(&alert) && alert.created_at - existing.created_at < window
        });
        if duplicate {
            return None;
        }

        warn!(
            alert_id = %alert.id,
            component = %alert.component,
            category = alert.category.as_str(),
            severity = alert.severity.as_str(),
            metric = %alert.metric,
            threshold = alert.threshold,
            current_value = alert.current_value,
            "{}",
            alert.title
        );
        counter!(
            "recommender_alerts_total",
            1,
            "category" => alert.category.as_str(),
            "severity" => alert.severity.as_str()
        );

        if alerts.len() >= self.capacity {
            alerts.remove(0);
        }
        alerts.push(alert.clone());
        Some(alert)
    }

    /// Resolve every active alert of a component; returns how many changed
    pub fn resolve_component(&self, component: &str) -> usize {
        self.resolve_component_where(component, |_| true)
    }

    /// Resolve the active alerts of a component accepted by `filter`
    pub fn resolve_component_where<F>(&self, component: &str, filter: F) -> usize
    where
        F: Fn(&Alert) -> bool,
    {
        let mut alerts = self.lock();
        let now = Utc::now();
        let mut resolved = 0;
        for alert in alerts
            .iter_mut()
            .filter(|a| a.component == component && !a.resolved && filter(a))
        {
            alert.resolved = true;
            alert.resolved_at = Some(now);
            resolved += 1;
        }
        if resolved > 0 {
            info!(component, resolved, "Alerts resolved");
        }
        resolved
    }

    pub fn active(&self) -> Vec<Alert> {
        self.lock().iter().filter(|a| !a.resolved).cloned().collect()
    }

    pub fn all(&self) -> Vec<Alert> {
        self.lock().clone()
    }
}
