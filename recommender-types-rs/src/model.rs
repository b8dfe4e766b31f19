//! Core data model: tasks, candidates, strategies and results.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::preferences::{DifficultyLevel, PricingSignal};

/// A unit of work the caller wants a tool for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl Task {
    pub fn new<I: Into<String>, N: Into<String>>(id: I, name: N) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            order: None,
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }
}

/// Per-request correlation data, used for log spans and metric tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchContext {
    pub session_id: String,
    pub language: String,
}

impl SearchContext {
    pub fn new<S: Into<String>, L: Into<String>>(session_id: S, language: L) -> Self {
        Self {
            session_id: session_id.into(),
            language: language.into(),
        }
    }
}

/// Coarse task category driving quality weighting and retrieval tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Coding,
    Math,
    Analysis,
    General,
    Design,
    Writing,
    Communication,
}

impl TaskType {
    pub const ALL: [TaskType; 7] = [
        TaskType::Coding,
        TaskType::Math,
        TaskType::Analysis,
        TaskType::General,
        TaskType::Design,
        TaskType::Writing,
        TaskType::Communication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Coding => "coding",
            TaskType::Math => "math",
            TaskType::Analysis => "analysis",
            TaskType::General => "general",
            TaskType::Design => "design",
            TaskType::Writing => "writing",
            TaskType::Communication => "communication",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much signal a query carries; broader queries search wider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// Several domain keywords, narrow search is enough
    Specific,
    /// Some signal but not much
    Broad,
    /// Short or keyword-free query
    Ambiguous,
}

/// Named retrieval algorithms, in fallback priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    RagEnhanced,
    Adaptive,
    Hybrid,
    Legacy,
}

impl SearchStrategy {
    /// Fixed order the fallback chain walks
    pub const PRIORITY: [SearchStrategy; 4] = [
        SearchStrategy::RagEnhanced,
        SearchStrategy::Adaptive,
        SearchStrategy::Hybrid,
        SearchStrategy::Legacy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::RagEnhanced => "rag_enhanced",
            SearchStrategy::Adaptive => "adaptive",
            SearchStrategy::Hybrid => "hybrid",
            SearchStrategy::Legacy => "legacy",
        }
    }

    /// Strategies that read curated knowledge entries
    pub fn requires_knowledge_base(&self) -> bool {
        matches!(self, SearchStrategy::RagEnhanced | SearchStrategy::Hybrid)
    }

    /// Strategies that enrich candidates with catalog quality signals
    pub fn is_quality_aware(&self) -> bool {
        !matches!(self, SearchStrategy::Legacy)
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog metadata attached to each candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    pub category: String,
    pub pricing: PricingSignal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<DifficultyLevel>,
    pub created_at: DateTime<Utc>,
}

/// Quality sub-scores, each normalized to 0..1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityComponents {
    pub benchmark_score: f64,
    pub user_rating_score: f64,
    pub performance_score: f64,
    pub reliability_score: f64,
}

impl QualityComponents {
    pub fn new(benchmark: f64, user_rating: f64, performance: f64, reliability: f64) -> Self {
        Self {
            benchmark_score: benchmark,
            user_rating_score: user_rating,
            performance_score: performance,
            reliability_score: reliability,
        }
        .clamped()
    }

    /// Used when no quality signal is known
    pub fn neutral() -> Self {
        Self::new(0.5, 0.5, 0.5, 0.5)
    }

    pub fn clamped(self) -> Self {
        Self {
            benchmark_score: clamp_unit(self.benchmark_score),
            user_rating_score: clamp_unit(self.user_rating_score),
            performance_score: clamp_unit(self.performance_score),
            reliability_score: clamp_unit(self.reliability_score),
        }
    }
}

impl Default for QualityComponents {
    fn default() -> Self {
        Self::neutral()
    }
}

/// An unranked tool match produced by retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub tool_id: String,
    pub name: String,
    pub raw_metadata: ToolMetadata,
    pub similarity: f64,
    pub quality_components: QualityComponents,
}

/// Final answer for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResult {
    pub task_id: String,
    pub task_name: String,
    pub tool_id: Option<String>,
    pub tool_name: String,
    pub final_score: f64,
    pub task_type: TaskType,
    pub reason: String,
    pub confidence_score: f64,
    #[serde(with = "duration_millis")]
    pub search_duration: Duration,
    #[serde(with = "duration_millis")]
    pub reranking_duration: Duration,
    pub strategy_used: Option<SearchStrategy>,
    #[serde(default)]
    pub knowledge_sources: Vec<String>,
}

impl RecommendationResult {
    /// A valid result that carries no tool
    pub fn no_recommendation<R: Into<String>>(task: &Task, task_type: TaskType, reason: R) -> Self {
        Self {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            tool_id: None,
            tool_name: String::new(),
            final_score: 0.0,
            task_type,
            reason: reason.into(),
            confidence_score: 0.0,
            search_duration: Duration::ZERO,
            reranking_duration: Duration::ZERO,
            strategy_used: None,
            knowledge_sources: Vec::new(),
        }
    }

    pub fn has_tool(&self) -> bool {
        self.tool_id.is_some()
    }
}

/// Progress pushed while a batch runs. A stream ends with exactly one
/// `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        stage: String,
        progress: f64,
        message: String,
    },
    Complete {
        results: Vec<RecommendationResult>,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
