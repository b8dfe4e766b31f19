//! Health and trend monitoring for the engine itself

pub mod alerts;
pub mod health;
pub mod metrics;
pub mod monitor;
pub mod trend;

pub use alerts::{Alert, AlertCategory, AlertManager, AlertSeverity};
pub use health::{ComponentHistory, HealthCheckResult, HealthStatus, ProbeReading, ERROR_RATE, KNOWLEDGE_BASE, PIPELINE, RETRIEVAL};
pub use self::metrics::{CallOutcome, PerformanceLog, PerformanceMetric, OUTCOME_TAG, RECOMMENDATION_METRIC};
pub use monitor::{HealthMonitor, HealthReport, MonitorState};
pub use trend::{TrendAnalysis, TrendDirection};
