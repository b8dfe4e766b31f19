//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use recommendation_engine::{
    EmbeddingQuery, KnowledgeMatch, KnowledgeStats, KnowledgeStore, RecommendationEngine, SearchFilter, StoreError,
    StoreResult,
};
use recommender_types::{
    BatchModeConfig, Candidate, EngineConfig, PricingSignal, QualityComponents, SearchContext, ToolMetadata,
};

/// Queries containing this marker match nothing
pub const NO_MATCH_MARKER: &str = "zzqx";

pub fn tool(id: &str, category: &str, pricing: PricingSignal, similarity: f64, quality: QualityComponents) -> Candidate {
    Candidate {
        tool_id: id.to_string(),
        name: id.to_uppercase(),
        raw_metadata: ToolMetadata {
            name: id.to_uppercase(),
            url: format!("https://{}.example", id),
            logo_url: None,
            category: category.to_string(),
            pricing,
            difficulty: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        },
        similarity,
        quality_components: quality,
    }
}

/// Store that serves a fixed candidate list with fixed similarities
pub struct FixtureStore {
    tools: Vec<Candidate>,
    failing: AtomicBool,
    delay: Duration,
    stats_delay: Duration,
    searches: AtomicUsize,
}

impl FixtureStore {
    pub fn new(tools: Vec<Candidate>) -> Self {
        Self {
            tools,
            failing: AtomicBool::new(false),
            delay: Duration::ZERO,
            stats_delay: Duration::ZERO,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_stats_delay(mut self, delay: Duration) -> Self {
        self.stats_delay = delay;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KnowledgeStore for FixtureStore {
    async fn similarity_search(
        &self,
        query: &EmbeddingQuery,
        top_k: usize,
        filter: Option<SearchFilter>,
    ) -> StoreResult<Vec<Candidate>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("fixture store offline"));
        }
        if query.text.contains(NO_MATCH_MARKER) {
            return Ok(Vec::new());
        }

        let mut matches: Vec<Candidate> = self
            .tools
            .iter()
            .filter(|c| filter.as_ref().map_or(true, |f| f.accepts(c.similarity)))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn search_knowledge(&self, _query: &EmbeddingQuery, _top_k: usize) -> StoreResult<Vec<KnowledgeMatch>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("fixture store offline"));
        }
        Ok(Vec::new())
    }

    async fn knowledge_stats(&self) -> StoreResult<KnowledgeStats> {
        if !self.stats_delay.is_zero() {
            tokio::time::sleep(self.stats_delay).await;
        }
        Ok(KnowledgeStats {
            total_entries: 10,
            total_tools: self.tools.len(),
            quality_score: 0.9,
            last_updated: None,
        })
    }
}

/// Config with pacing removed so tests run fast
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.batch.inter_call_delay_ms = 0;
    config.batch.mode = BatchModeConfig::Sequential;
    config.retrieval.call_timeout_ms = 500;
    config.monitor.interval_secs = 1;
    config
}

pub fn engine_with(store: Arc<FixtureStore>, config: EngineConfig) -> Arc<RecommendationEngine> {
    Arc::new(
        RecommendationEngine::builder(store)
            .config(config)
            .build()
            .expect("engine builds"),
    )
}

pub fn default_catalog() -> Vec<Candidate> {
    vec![
        tool("scrapy", "development", PricingSignal::Free, 0.82, QualityComponents::new(0.9, 0.8, 0.8, 0.9)),
        tool(
            "copilot",
            "development",
            PricingSignal::Paid { monthly_usd: 10.0 },
            0.9,
            QualityComponents::new(0.95, 0.9, 0.9, 0.9),
        ),
        tool("notion", "productivity", PricingSignal::Freemium, 0.6, QualityComponents::new(0.5, 0.85, 0.7, 0.8)),
    ]
}

pub fn context() -> SearchContext {
    SearchContext::new("integration", "en")
}
