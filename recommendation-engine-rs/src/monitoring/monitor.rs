//! Periodic health monitor
//!
//! Each tick probes the pipeline, the retrieval chain, the knowledge base and
//! the recent error rate, appends the results to per-component history,
//! raises or resolves alerts and, when enabled, applies remediation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::gauge;
use recommender_types::{MonitorConfig, SearchContext, SearchStrategy, Task};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::alerts::{Alert, AlertCategory, AlertManager, AlertSeverity};
use super::health::{
    ComponentHistory, HealthCheckResult, HealthStatus, ProbeReading, ERROR_RATE, KNOWLEDGE_BASE, PIPELINE, RETRIEVAL,
};
use super::metrics::CallOutcome;
use super::trend::{self, TrendAnalysis};
use crate::cancel::CancelToken;
use crate::engine::RecommendationEngine;
use crate::error::StoreError;
use crate::resilience::BreakerSnapshot;

const UPTIME_METRIC: &str = "uptime_pct";

/// Snapshot returned by `RecommendationEngine::health`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub overall: HealthStatus,
    /// Latest result per component, keyed by component name
    pub components: BTreeMap<String, HealthCheckResult>,
    /// Active alerts only
    pub alerts: Vec<Alert>,
    /// Response-time trend per component with enough history
    pub trends: BTreeMap<String, TrendAnalysis>,
    pub breakers: Vec<BreakerSnapshot>,
    pub knowledge_base_available: bool,
    pub generated_at: DateTime<Utc>,
}

/// Histories and alerts, shared between the monitor and the engine
#[derive(Debug)]
pub struct MonitorState {
    config: MonitorConfig,
    histories: DashMap<String, ComponentHistory>,
    alerts: AlertManager,
}

impl MonitorState {
    pub fn new(config: MonitorConfig) -> Self {
        let alerts = AlertManager::new(
            Duration::from_secs(config.alert_dedup_window_secs),
            config.history_capacity * 4,
        );
        Self {
            config,
            histories: DashMap::new(),
            alerts,
        }
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn history(&self, component: &str) -> Option<ComponentHistory> {
        self.histories.get(component).map(|h| h.value().clone())
    }

    fn latency_thresholds(&self, component: &str) -> Option<(Duration, Duration)> {
        match component {
            PIPELINE => Some((
                Duration::from_millis(self.config.pipeline_degraded_ms),
                Duration::from_millis(self.config.pipeline_critical_ms),
            )),
            RETRIEVAL => Some((
                Duration::from_millis(self.config.retrieval_degraded_ms),
                Duration::from_millis(self.config.retrieval_critical_ms),
            )),
            _ => None,
        }
    }

    /// Append a reading, then raise or resolve alerts for its component.
    /// Returns the stored result and any newly raised alerts.
    pub fn record(&self, reading: ProbeReading) -> (HealthCheckResult, Vec<Alert>) {
        let component = reading.component.clone();
        let observed = reading.observed;
        let response_time = reading.response_time;

        // Guard dropped before touching alerts
        let (result, window_full) = {
            let mut history = self
                .histories
                .entry(component.clone())
                .or_insert_with(|| ComponentHistory::new(self.config.history_capacity, self.config.uptime_window));
            let result = history.record(reading);
            (result, history.window_full())
        };

        gauge!(
            "recommender_component_response_ms",
            result.response_time_ms,
            "component" => component.clone()
        );

        let unhealthy = result.status != HealthStatus::Healthy;
        let uptime_low = window_full && result.uptime_pct < self.config.uptime_alert_pct;

        // Recovery resolves everything but a still-valid uptime alert
        if !unhealthy {
            self.alerts
                .resolve_component_where(&component, |alert| !(uptime_low && alert.metric == UPTIME_METRIC));
        }

        let severity = match result.status {
            HealthStatus::Critical => AlertSeverity::Critical,
            _ => AlertSeverity::Warning,
        };
        let mut candidates = Vec::new();

        if let Some((degraded, _)) = self.latency_thresholds(&component) {
            if unhealthy && response_time >= degraded {
                candidates.push(
                    Alert::new(
                        &component,
                        severity,
                        AlertCategory::Performance,
                        "response_time_ms",
                        degraded.as_millis() as f64,
                        result.response_time_ms,
                    )
                    .with_title(format!("{} response time above threshold", component))
                    .with_action("Check store latency and strategy timeouts"),
                );
            }
        }

        if result.consecutive_failures >= self.config.consecutive_failure_alert {
            candidates.push(
                Alert::new(
                    &component,
                    AlertSeverity::Critical,
                    AlertCategory::Availability,
                    "consecutive_failures",
                    self.config.consecutive_failure_alert as f64,
                    result.consecutive_failures as f64,
                )
                .with_title(format!("{} failing repeatedly", component))
                .with_action("Inspect circuit breaker states")
                .with_action("Verify knowledge store connectivity"),
            );
        }

        if uptime_low {
            candidates.push(
                Alert::new(
                    &component,
                    AlertSeverity::Warning,
                    AlertCategory::Availability,
                    UPTIME_METRIC,
                    self.config.uptime_alert_pct,
                    result.uptime_pct,
                )
                .with_title(format!("{} uptime below target", component)),
            );
        }

        match (component.as_str(), observed) {
            (ERROR_RATE, Some(rate)) if unhealthy => candidates.push(
                Alert::new(
                    &component,
                    severity,
                    AlertCategory::ErrorRate,
                    "error_rate",
                    self.config.error_rate_degraded,
                    rate,
                )
                .with_title("Recommendation error rate elevated")
                .with_action("Review recent strategy failures"),
            ),
            (KNOWLEDGE_BASE, Some(quality)) if result.status == HealthStatus::Degraded => candidates.push(
                Alert::new(
                    &component,
                    severity,
                    AlertCategory::Quality,
                    "knowledge_quality",
                    self.config.knowledge_min_quality,
                    quality,
                )
                .with_title("Knowledge base quality below target")
                .with_action("Refresh curated knowledge entries"),
            ),
            _ => {}
        }

        let raised: Vec<Alert> = candidates.into_iter().filter_map(|alert| self.alerts.raise(alert)).collect();
        (result, raised)
    }

    pub fn report(&self, breakers: Vec<BreakerSnapshot>, knowledge_base_available: bool) -> HealthReport {
        let mut components = BTreeMap::new();
        let mut trends = BTreeMap::new();
        for entry in self.histories.iter() {
            let history = entry.value();
            let latest = match history.latest() {
                Some(latest) => latest.clone(),
                None => continue,
            };
            let threshold = self
                .latency_thresholds(entry.key())
                .map(|(_, critical)| critical.as_millis() as f64);
            if let Some(analysis) = trend::analyze(&history.response_times(), threshold) {
                trends.insert(entry.key().clone(), analysis);
            }
            components.insert(entry.key().clone(), latest);
        }

        let overall = components
            .values()
            .map(|result| result.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        HealthReport {
            overall,
            components,
            alerts: self.alerts.active(),
            trends,
            breakers,
            knowledge_base_available,
            generated_at: Utc::now(),
        }
    }
}

struct MonitorRunner {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Drives the probes on a timer; explicit `start` / `stop`
pub struct HealthMonitor {
    engine: Arc<RecommendationEngine>,
    state: Arc<MonitorState>,
    config: MonitorConfig,
    runner: Mutex<Option<MonitorRunner>>,
}

impl HealthMonitor {
    /// Create a monitor and attach its state to the engine
    pub fn new(engine: Arc<RecommendationEngine>) -> Arc<Self> {
        let config = engine.config().monitor.clone();
        let state = Arc::new(MonitorState::new(config.clone()));
        if !engine.attach_monitor(Arc::clone(&state)) {
            warn!("Engine already has a monitor attached; health() keeps reporting the first one");
        }
        Arc::new(Self {
            engine,
            state,
            config,
            runner: Mutex::new(None),
        })
    }

    pub fn state(&self) -> &Arc<MonitorState> {
        &self.state
    }

    fn runner(&self) -> MutexGuard<'_, Option<MonitorRunner>> {
        self.runner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.runner().is_some()
    }

    /// Start the periodic loop. Returns false if it was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut runner = self.runner();
        if runner.is_some() {
            return false;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let monitor = Arc::clone(self);
        let period = self.config.interval().max(Duration::from_millis(10));

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        monitor.run_checks().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Health monitor stopped");
        });

        info!(interval_secs = self.config.interval_secs, "Health monitor started");
        *runner = Some(MonitorRunner { shutdown, handle });
        true
    }

    /// Stop the loop and wait for an in-flight tick to finish
    pub async fn stop(&self) {
        let runner = self.runner().take();
        if let Some(runner) = runner {
            let _ = runner.shutdown.send(true);
            if let Err(error) = runner.handle.await {
                warn!(error = %error, "Health monitor task ended abnormally");
            }
        }
    }

    /// One tick: every probe, in order
    pub async fn run_checks(&self) -> Vec<HealthCheckResult> {
        let readings = vec![
            self.probe_knowledge_base().await,
            self.probe_retrieval().await,
            self.probe_pipeline().await,
            self.probe_error_rate(),
        ];
        readings.into_iter().map(|reading| self.record_check(reading)).collect()
    }

    /// Record a reading from any source, then apply remediation
    pub fn record_check(&self, reading: ProbeReading) -> HealthCheckResult {
        let (result, raised) = self.state.record(reading);
        debug!(
            component = %result.component,
            status = %result.status,
            response_time_ms = result.response_time_ms,
            alerts = raised.len(),
            "Health check recorded"
        );
        if self.config.auto_remediation {
            self.remediate(&result);
        }
        result
    }

    fn remediate(&self, result: &HealthCheckResult) {
        match result.component.as_str() {
            KNOWLEDGE_BASE => {
                self.engine
                    .set_knowledge_base_available(result.status != HealthStatus::Critical);
            }
            RETRIEVAL if result.consecutive_failures >= self.config.consecutive_failure_alert => {
                let cleared = self.engine.clear_embedding_cache();
                info!(cleared, "Cleared embedding cache after repeated retrieval failures");
            }
            _ => {}
        }
    }

    async fn probe_pipeline(&self) -> ProbeReading {
        let task = Task::new(format!("health-probe-{}", uuid::Uuid::new_v4()), self.config.probe_task_name.clone());
        let context = SearchContext::new("health-monitor", "en");

        let started = Instant::now();
        let (result, outcome) = self
            .engine
            .recommend_with_outcome(&task, None, &context, &CancelToken::never())
            .await;
        let elapsed = started.elapsed();

        let latency_status = HealthStatus::from_latency(
            elapsed,
            Duration::from_millis(self.config.pipeline_degraded_ms),
            Duration::from_millis(self.config.pipeline_critical_ms),
        );
        let status = match outcome {
            CallOutcome::Failed => HealthStatus::Critical,
            CallOutcome::NoMatch | CallOutcome::EmptyTask | CallOutcome::Cancelled => latency_status.max(HealthStatus::Degraded),
            CallOutcome::Success => latency_status,
        };

        // A slow but working strategy is taken out of rotation; Legacy stays as last resort
        if self.config.auto_remediation && latency_status == HealthStatus::Critical {
            if let Some(strategy) = result.strategy_used.filter(|s| *s != SearchStrategy::Legacy) {
                self.engine.force_open_breaker(strategy);
            }
        }

        ProbeReading::new(
            PIPELINE,
            status,
            elapsed,
            format!(
                "outcome={} strategy={}",
                outcome.as_str(),
                result.strategy_used.map(|s| s.as_str()).unwrap_or("none")
            ),
        )
    }

    async fn probe_retrieval(&self) -> ProbeReading {
        let chain = self.engine.probe_retrieval(&self.config.probe_task_name).await;
        let status = match chain.strategy() {
            Some(_) => HealthStatus::from_latency(
                chain.elapsed,
                Duration::from_millis(self.config.retrieval_degraded_ms),
                Duration::from_millis(self.config.retrieval_critical_ms),
            ),
            None if chain.is_failure() => HealthStatus::Critical,
            None => HealthStatus::Degraded,
        };
        ProbeReading::new(
            RETRIEVAL,
            status,
            chain.elapsed,
            format!(
                "strategy={} failures={}",
                chain.strategy().map(|s| s.as_str()).unwrap_or("none"),
                chain.failures.len()
            ),
        )
    }

    async fn probe_knowledge_base(&self) -> ProbeReading {
        let limit = self.engine.chain().call_timeout();
        let started = Instant::now();
        let stats = timeout(limit, self.engine.knowledge_stats())
            .await
            .unwrap_or_else(|_| Err(StoreError::timeout(format!("knowledge stats exceeded {:?}", limit))));
        let elapsed = started.elapsed();

        match stats {
            Ok(stats) if stats.total_entries < self.config.knowledge_min_entries => ProbeReading::new(
                KNOWLEDGE_BASE,
                HealthStatus::Critical,
                elapsed,
                format!("only {} knowledge entries", stats.total_entries),
            )
            .with_observed(stats.quality_score),
            Ok(stats) if stats.quality_score < self.config.knowledge_min_quality => ProbeReading::new(
                KNOWLEDGE_BASE,
                HealthStatus::Degraded,
                elapsed,
                format!("quality {:.2} below target", stats.quality_score),
            )
            .with_observed(stats.quality_score),
            Ok(stats) => ProbeReading::new(
                KNOWLEDGE_BASE,
                HealthStatus::Healthy,
                elapsed,
                format!("{} entries, {} tools", stats.total_entries, stats.total_tools),
            )
            .with_observed(stats.quality_score),
            Err(error) => ProbeReading::new(KNOWLEDGE_BASE, HealthStatus::Critical, elapsed, error.to_string()),
        }
    }

    fn probe_error_rate(&self) -> ProbeReading {
        let started = Instant::now();
        let rate = self.engine.performance().error_rate(self.config.error_rate_window);
        let elapsed = started.elapsed();

        match rate {
            None => ProbeReading::new(ERROR_RATE, HealthStatus::Healthy, elapsed, "no recent traffic"),
            Some(rate) => {
                let status = if rate >= self.config.error_rate_critical {
                    HealthStatus::Critical
                } else if rate >= self.config.error_rate_degraded {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                ProbeReading::new(ERROR_RATE, status, elapsed, format!("error rate {:.1}%", rate * 100.0))
                    .with_observed(rate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> MonitorState {
        MonitorState::new(MonitorConfig::default())
    }

    #[test]
    fn test_healthy_readings_raise_nothing() {
        let state = state();
        let (result, raised) = state.record(ProbeReading::new(
            PIPELINE,
            HealthStatus::Healthy,
            Duration::from_millis(5),
            "ok",
        ));
        assert_eq!(result.status, HealthStatus::Healthy);
        assert!(raised.is_empty());
    }

    #[test]
    fn test_slow_retrieval_raises_performance_alert() {
        let state = state();
        let (_, raised) = state.record(ProbeReading::new(
            RETRIEVAL,
            HealthStatus::Degraded,
            Duration::from_millis(1_500),
            "slow",
        ));
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].category, AlertCategory::Performance);
        assert_eq!(raised[0].severity, AlertSeverity::Warning);
        assert_eq!(raised[0].threshold, 1_000.0);
    }

    #[test]
    fn test_error_rate_alert_carries_observed_rate() {
        let state = state();
        let (_, raised) = state.record(
            ProbeReading::new(ERROR_RATE, HealthStatus::Critical, Duration::ZERO, "error rate 60.0%").with_observed(0.6),
        );
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].category, AlertCategory::ErrorRate);
        assert_eq!(raised[0].severity, AlertSeverity::Critical);
        assert_eq!(raised[0].current_value, 0.6);
    }

    #[test]
    fn test_low_knowledge_quality_raises_quality_alert() {
        let state = state();
        let (_, raised) = state.record(
            ProbeReading::new(KNOWLEDGE_BASE, HealthStatus::Degraded, Duration::ZERO, "quality 0.30").with_observed(0.3),
        );
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].category, AlertCategory::Quality);
        assert_eq!(raised[0].metric, "knowledge_quality");
    }

    #[test]
    fn test_report_takes_worst_status() {
        let state = state();
        state.record(ProbeReading::new(PIPELINE, HealthStatus::Healthy, Duration::ZERO, "ok"));
        state.record(ProbeReading::new(RETRIEVAL, HealthStatus::Degraded, Duration::ZERO, "slow"));

        let report = state.report(Vec::new(), true);
        assert_eq!(report.overall, HealthStatus::Degraded);
        assert_eq!(report.components.len(), 2);
        assert!(state.history(RETRIEVAL).is_some());
        assert!(state.history(ERROR_RATE).is_none());
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let state = state();
        state.record(ProbeReading::new(PIPELINE, HealthStatus::Critical, Duration::ZERO, "down"));

        let json = serde_json::to_value(state.report(Vec::new(), false)).unwrap();
        assert_eq!(json["overall"], "critical");
        assert_eq!(json["knowledgeBaseAvailable"], false);
        assert_eq!(json["components"]["pipeline"]["consecutiveFailures"], 1);
        assert!(json["alerts"].is_array());
    }

    #[test]
    fn test_uptime_alert_survives_healthy_readings_while_below_target() {
        let state = state();
        for i in 0..40 {
            let status = if i % 2 == 0 { HealthStatus::Degraded } else { HealthStatus::Healthy };
            state.record(ProbeReading::new(PIPELINE, status, Duration::from_millis(5), "alternating"));
        }

        let uptime_alerts = |state: &MonitorState| {
            state
                .alerts()
                .active()
                .into_iter()
                .filter(|a| a.metric == UPTIME_METRIC)
                .count()
        };
        assert_eq!(uptime_alerts(&state), 1);

        state.record(ProbeReading::new(PIPELINE, HealthStatus::Degraded, Duration::from_millis(5), "degraded"));
        assert_eq!(uptime_alerts(&state), 1);

        for _ in 0..20 {
            state.record(ProbeReading::new(PIPELINE, HealthStatus::Healthy, Duration::from_millis(5), "ok"));
        }
        assert_eq!(uptime_alerts(&state), 0);
    }
}
