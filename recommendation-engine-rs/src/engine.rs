//! Recommendation engine: the public entry point
//!
//! Built once through `RecommendationEngineBuilder` and shared behind an
//! `Arc`. A call classifies the task, walks the strategy fallback chain,
//! reranks the surviving candidates and records one performance metric.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::histogram;
use once_cell::sync::OnceCell;
use recommender_types::{
    EngineConfig, ProgressEvent, RecommendationResult, SearchContext, SearchStrategy, Task, TaskType,
    UserPreferences,
};
use tokio::sync::mpsc;
use tracing::{debug, info, Instrument};

use crate::batch::BatchOrchestrator;
use crate::cancel::CancelToken;
use crate::classifier::{Classification, QueryClassifier};
use crate::embedding::{CachedEmbedder, Embedder, HashingEmbedder};
use crate::error::{Result, StoreResult};
use crate::knowledge::{CatalogStore, KnowledgeStats, KnowledgeStore};
use crate::logging::request_span;
use crate::monitoring::{
    CallOutcome, HealthReport, MonitorState, PerformanceLog, PerformanceMetric, OUTCOME_TAG, RECOMMENDATION_METRIC,
};
use crate::progress::{self, ProgressStream};
use crate::ranking::Reranker;
use crate::resilience::{ChainOutcome, FallbackChain};
use crate::retrieval::{CandidateRetriever, SearchRequest};

const EMPTY_TASK_REASON: &str = "Task description is empty; nothing to search for";
const CANCELLED_SEARCH_REASON: &str = "Search cancelled before a strategy answered";

/// Builder for `RecommendationEngine`
pub struct RecommendationEngineBuilder {
    store: Arc<dyn KnowledgeStore>,
    catalog: Option<Arc<dyn CatalogStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    config: EngineConfig,
}

impl RecommendationEngineBuilder {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            store,
            catalog: None,
            embedder: None,
            config: EngineConfig::default(),
        }
    }

    /// Catalog used to enrich candidates with review signals
    pub fn catalog(mut self, catalog: Arc<dyn CatalogStore>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Embedder for queries; defaults to a hashing embedder
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<RecommendationEngine> {
        self.config.validate()?;

        let retrieval = &self.config.retrieval;
        let inner = self
            .embedder
            .unwrap_or_else(|| Arc::new(HashingEmbedder::new(retrieval.embedding_dimensions)));
        let embedder = Arc::new(CachedEmbedder::new(
            inner,
            Duration::from_secs(retrieval.embedding_cache_ttl_secs),
            retrieval.embedding_cache_capacity,
        ));

        let retriever = Arc::new(CandidateRetriever::new(
            self.store,
            self.catalog,
            embedder,
            retrieval.clone(),
        ));
        let chain = Arc::new(FallbackChain::new(retriever, retrieval, &self.config.breaker));

        info!(
            top_k = retrieval.top_k,
            failure_threshold = self.config.breaker.failure_threshold,
            batch_mode = ?self.config.batch.mode,
            "Recommendation engine built"
        );

        Ok(RecommendationEngine {
            classifier: QueryClassifier::new(),
            chain,
            reranker: Reranker::new(),
            performance: Arc::new(PerformanceLog::new(self.config.monitor.metrics_capacity)),
            batch: BatchOrchestrator::new(&self.config.batch),
            config: self.config,
            health: OnceCell::new(),
        })
    }
}

pub struct RecommendationEngine {
    classifier: QueryClassifier,
    chain: Arc<FallbackChain>,
    reranker: Reranker,
    performance: Arc<PerformanceLog>,
    batch: BatchOrchestrator,
    config: EngineConfig,
    health: OnceCell<Arc<MonitorState>>,
}

fn confidence(final_score: f64, classification: &Classification, margin: f64) -> f64 {
    (0.5 * final_score + 0.3 * classification.confidence + 0.2 * margin).clamp(0.0, 1.0)
}

impl RecommendationEngine {
    pub fn builder(store: Arc<dyn KnowledgeStore>) -> RecommendationEngineBuilder {
        RecommendationEngineBuilder::new(store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<FallbackChain> {
        &self.chain
    }

    pub fn performance(&self) -> &Arc<PerformanceLog> {
        &self.performance
    }

    pub fn classify(&self, description: &str) -> Classification {
        self.classifier.classify(description)
    }

    /// Recommend one tool for a task. Never fails: degraded paths return a
    /// result with no tool and an explanatory reason.
    pub async fn recommend(
        &self,
        task: &Task,
        preferences: Option<&UserPreferences>,
        context: &SearchContext,
    ) -> RecommendationResult {
        self.recommend_cancellable(task, preferences, context, &CancelToken::never())
            .await
    }

    /// `recommend` that stops issuing retriever calls once `cancel` fires
    pub async fn recommend_cancellable(
        &self,
        task: &Task,
        preferences: Option<&UserPreferences>,
        context: &SearchContext,
        cancel: &CancelToken,
    ) -> RecommendationResult {
        self.recommend_with_outcome(task, preferences, context, cancel).await.0
    }

    pub(crate) async fn recommend_with_outcome(
        &self,
        task: &Task,
        preferences: Option<&UserPreferences>,
        context: &SearchContext,
        cancel: &CancelToken,
    ) -> (RecommendationResult, CallOutcome) {
        let span = request_span("recommend", context);
        async move {
            let started = Instant::now();
            let (result, outcome) = self.run_pipeline(task, preferences, cancel).await;
            self.record_call(&result, outcome, started.elapsed(), context);
            (result, outcome)
        }
        .instrument(span)
        .await
    }

    async fn run_pipeline(
        &self,
        task: &Task,
        preferences: Option<&UserPreferences>,
        cancel: &CancelToken,
    ) -> (RecommendationResult, CallOutcome) {
        if task.name.trim().is_empty() {
            debug!(task_id = %task.id, "Empty task description");
            let result = RecommendationResult::no_recommendation(task, TaskType::General, EMPTY_TASK_REASON);
            return (result, CallOutcome::EmptyTask);
        }

        let classification = self.classifier.classify(&task.name);
        let preferences = preferences.cloned().unwrap_or_default();
        let request = Arc::new(SearchRequest {
            query: task.name.clone(),
            task_type: classification.task_type,
            query_type: classification.query_type,
            preferences: preferences.clone(),
            top_k: self.config.retrieval.top_k,
        });
        debug!(
            task_id = %task.id,
            task_type = %classification.task_type,
            query_type = ?classification.query_type,
            confidence = classification.confidence,
            "Task classified"
        );

        let chain = self.chain.execute(request, cancel).await;
        let search_duration = chain.elapsed;
        let exhausted = chain.is_failure();
        let cancelled = chain.cancelled;

        let (strategy, retrieval) = match chain.success {
            Some(success) => success,
            None => {
                let (reason, outcome) = if cancelled {
                    (CANCELLED_SEARCH_REASON, CallOutcome::Cancelled)
                } else if exhausted {
                    ("All search strategies failed or were unavailable", CallOutcome::Failed)
                } else {
                    ("No tools matched this task", CallOutcome::NoMatch)
                };
                let mut result = RecommendationResult::no_recommendation(task, classification.task_type, reason);
                result.search_duration = search_duration;
                return (result, outcome);
            }
        };

        let rerank_started = Instant::now();
        let ranked = self
            .reranker
            .rerank(retrieval.candidates, classification.task_type, &preferences);
        let reranking_duration = rerank_started.elapsed();

        let mut result = match ranked.best() {
            Some(best) => RecommendationResult {
                task_id: task.id.clone(),
                task_name: task.name.clone(),
                tool_id: Some(best.candidate.tool_id.clone()),
                tool_name: best.candidate.name.clone(),
                final_score: best.final_score,
                task_type: classification.task_type,
                reason: best.reason.clone(),
                confidence_score: confidence(best.final_score, &classification, ranked.margin()),
                search_duration,
                reranking_duration,
                strategy_used: Some(strategy),
                knowledge_sources: Vec::new(),
            },
            None => {
                let reason = format!(
                    "No tools matched the given preferences ({} filtered out)",
                    ranked.filtered_out
                );
                let mut result = RecommendationResult::no_recommendation(task, classification.task_type, reason);
                result.search_duration = search_duration;
                result.reranking_duration = reranking_duration;
                result.strategy_used = Some(strategy);
                return (result, CallOutcome::NoMatch);
            }
        };
        result.knowledge_sources = retrieval.knowledge_sources;
        (result, CallOutcome::Success)
    }

    fn record_call(&self, result: &RecommendationResult, outcome: CallOutcome, elapsed: Duration, context: &SearchContext) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let strategy = result.strategy_used.map(|s| s.as_str()).unwrap_or("none");

        self.performance.record(
            PerformanceMetric::new(RECOMMENDATION_METRIC, elapsed_ms, "ms")
                .tag(OUTCOME_TAG, outcome.as_str())
                .tag("strategy", strategy)
                .tag("task_type", result.task_type.as_str())
                .tag("session_id", context.session_id.clone()),
        );
        histogram!(
            "recommender_recommendation_duration_ms",
            elapsed_ms,
            "outcome" => outcome.as_str(),
            "strategy" => strategy
        );
        info!(
            task_id = %result.task_id,
            tool_id = result.tool_id.as_deref().unwrap_or("none"),
            final_score = result.final_score,
            confidence = result.confidence_score,
            strategy,
            outcome = outcome.as_str(),
            elapsed_ms,
            "Recommendation complete"
        );
    }

    /// Recommend for every task, preserving input order
    pub async fn recommend_batch(
        &self,
        tasks: &[Task],
        preferences: Option<&UserPreferences>,
        context: &SearchContext,
        workflow_id: Option<&str>,
    ) -> Vec<RecommendationResult> {
        self.recommend_batch_cancellable(tasks, preferences, context, workflow_id, &CancelToken::never(), None)
            .await
    }

    /// Batch that stops issuing retriever calls once `cancel` fires; the
    /// task in flight and every unissued task get a cancelled result
    pub async fn recommend_batch_cancellable(
        &self,
        tasks: &[Task],
        preferences: Option<&UserPreferences>,
        context: &SearchContext,
        workflow_id: Option<&str>,
        cancel: &CancelToken,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> Vec<RecommendationResult> {
        let span = tracing::info_span!(
            "batch",
            workflow_id = workflow_id.unwrap_or("none"),
            session_id = %context.session_id,
            tasks = tasks.len()
        );
        self.batch
            .run(tasks, cancel, progress, |task| {
                let task = task.clone();
                async move {
                    self.recommend_cancellable(&task, preferences, context, cancel)
                        .await
                }
            })
            .instrument(span)
            .await
    }

    /// Run a batch in the background and observe it as a stream
    pub fn recommend_batch_with_progress(
        self: &Arc<Self>,
        tasks: Vec<Task>,
        preferences: Option<UserPreferences>,
        context: SearchContext,
    ) -> ProgressStream {
        progress::spawn(Arc::clone(self), tasks, preferences, context)
    }

    /// Current health, once a monitor has been attached
    pub fn health(&self) -> Option<HealthReport> {
        self.health.get().map(|state| {
            state.report(
                self.chain.breaker_snapshots(),
                self.chain.is_knowledge_base_available(),
            )
        })
    }

    pub(crate) fn attach_monitor(&self, state: Arc<MonitorState>) -> bool {
        self.health.set(state).is_ok()
    }

    /// Walk the fallback chain for a query without reranking or metrics
    pub async fn probe_retrieval(&self, query: &str) -> ChainOutcome {
        let classification = self.classifier.classify(query);
        let request = Arc::new(SearchRequest {
            query: query.to_string(),
            task_type: classification.task_type,
            query_type: classification.query_type,
            preferences: UserPreferences::default(),
            top_k: self.config.retrieval.top_k,
        });
        self.chain.execute(request, &CancelToken::never()).await
    }

    pub async fn knowledge_stats(&self) -> StoreResult<KnowledgeStats> {
        self.chain.retriever().store().knowledge_stats().await
    }

    pub fn set_knowledge_base_available(&self, available: bool) {
        self.chain.set_knowledge_base_available(available);
    }

    pub fn force_open_breaker(&self, strategy: SearchStrategy) {
        self.chain.force_open(strategy);
    }

    pub fn reset_breaker(&self, strategy: SearchStrategy) {
        self.chain.reset(strategy);
    }

    /// Drop cached query embeddings; returns how many were removed
    pub fn clear_embedding_cache(&self) -> usize {
        self.chain.retriever().embedder().clear()
    }
}
