//! Candidate retrieval: one `SearchStrategy` per call
//!
//! - `RagEnhanced` augments the query with relevant knowledge entries
//! - `Adaptive` tunes breadth and category boosts from the query type
//! - `Hybrid` runs both concurrently and unions the results
//! - `Legacy` is a plain similarity search with no enrichment

mod params;

pub use params::{domain_categories, is_domain_category, AdaptiveParams};

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use recommender_types::{Candidate, QueryType, RetrievalConfig, SearchStrategy, TaskType, UserPreferences};
use tracing::{debug, warn};

use crate::embedding::{CachedEmbedder, Embedder};
use crate::error::{FailureKind, StoreError, StoreResult, StrategyFailure};
use crate::knowledge::{CatalogStore, EmbeddingQuery, KnowledgeStore, SearchFilter};

/// Everything a strategy needs to run; owned so attempts can outlive the caller
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub task_type: TaskType,
    pub query_type: QueryType,
    pub preferences: UserPreferences,
    pub top_k: usize,
}

/// Candidates from one strategy plus the knowledge entries that shaped them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalOutcome {
    pub candidates: Vec<Candidate>,
    pub knowledge_sources: Vec<String>,
}

impl RetrievalOutcome {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Executes retrieval strategies against the configured stores
pub struct CandidateRetriever {
    store: Arc<dyn KnowledgeStore>,
    catalog: Option<Arc<dyn CatalogStore>>,
    embedder: Arc<CachedEmbedder>,
    config: RetrievalConfig,
}

impl CandidateRetriever {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        catalog: Option<Arc<dyn CatalogStore>>,
        embedder: Arc<CachedEmbedder>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            embedder,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<CachedEmbedder> {
        &self.embedder
    }

    /// Run one strategy. Store faults become a typed `StrategyFailure`.
    pub async fn search(
        &self,
        request: &SearchRequest,
        strategy: SearchStrategy,
    ) -> Result<RetrievalOutcome, StrategyFailure> {
        if request.top_k == 0 {
            return Ok(RetrievalOutcome::default());
        }

        let outcome = match strategy {
            SearchStrategy::RagEnhanced => self.rag_enhanced(request).await,
            SearchStrategy::Adaptive => self.adaptive(request).await,
            SearchStrategy::Hybrid => return self.hybrid(request).await,
            SearchStrategy::Legacy => self.legacy(request).await,
        };

        outcome.map_err(|error| StrategyFailure::store(strategy, error))
    }

    async fn embed(&self, text: &str) -> StoreResult<EmbeddingQuery> {
        let vector = self.embedder.embed(text).await?;
        Ok(EmbeddingQuery::new(text, vector))
    }

    async fn rag_enhanced(&self, request: &SearchRequest) -> StoreResult<RetrievalOutcome> {
        let query = self.embed(&request.query).await?;
        let knowledge = self
            .store
            .search_knowledge(&query, self.config.knowledge_top_k)
            .await?;

        let relevant: Vec<_> = knowledge
            .into_iter()
            .filter(|m| m.relevance >= self.config.min_knowledge_relevance)
            .collect();

        let search_query = if relevant.is_empty() {
            query
        } else {
            let mut augmented = request.query.clone();
            for m in &relevant {
                augmented.push(' ');
                augmented.push_str(&m.entry.content);
            }
            self.embed(&augmented).await?
        };

        let candidates = self
            .store
            .similarity_search(&search_query, request.top_k, None)
            .await?;
        let knowledge_sources: Vec<String> = relevant.into_iter().map(|m| m.entry.id).collect();

        debug!(
            strategy = "rag_enhanced",
            knowledge_sources = knowledge_sources.len(),
            candidates = candidates.len(),
            "RAG retrieval complete"
        );

        Ok(RetrievalOutcome {
            candidates: self.enrich(candidates).await,
            knowledge_sources,
        })
    }

    async fn adaptive(&self, request: &SearchRequest) -> StoreResult<RetrievalOutcome> {
        let params = AdaptiveParams::for_query(request.query_type, request.top_k);
        let query = self.embed(&request.query).await?;
        let mut candidates = self
            .store
            .similarity_search(
                &query,
                params.breadth,
                Some(SearchFilter::min_similarity(params.min_similarity)),
            )
            .await?;

        for candidate in candidates.iter_mut() {
            let category = &candidate.raw_metadata.category;
            if request.preferences.prefers_category(category) || is_domain_category(request.task_type, category) {
                candidate.similarity = (candidate.similarity + params.category_boost).min(1.0);
            }
        }
        candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

        debug!(
            strategy = "adaptive",
            query_type = ?request.query_type,
            breadth = params.breadth,
            candidates = candidates.len(),
            "Adaptive retrieval complete"
        );

        Ok(RetrievalOutcome {
            candidates: self.enrich(candidates).await,
            knowledge_sources: Vec::new(),
        })
    }

    async fn hybrid(&self, request: &SearchRequest) -> Result<RetrievalOutcome, StrategyFailure> {
        let (rag, adaptive) = tokio::join!(self.rag_enhanced(request), self.adaptive(request));

        let (rag, adaptive) = match (rag, adaptive) {
            (Err(rag_error), Err(adaptive_error)) => {
                return Err(StrategyFailure::new(
                    SearchStrategy::Hybrid,
                    FailureKind::Store(format!("rag: {}; adaptive: {}", rag_error, adaptive_error)),
                ));
            }
            (rag, adaptive) => (log_partial("rag_enhanced", rag), log_partial("adaptive", adaptive)),
        };

        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, Candidate> = HashMap::new();
        for candidate in rag.candidates.into_iter().chain(adaptive.candidates) {
            match merged.get_mut(&candidate.tool_id) {
                Some(existing) => {
                    if candidate.similarity > existing.similarity {
                        existing.similarity = candidate.similarity;
                    }
                }
                None => {
                    order.push(candidate.tool_id.clone());
                    merged.insert(candidate.tool_id.clone(), candidate);
                }
            }
        }

        let mut candidates: Vec<Candidate> = order.into_iter().filter_map(|id| merged.remove(&id)).collect();
        candidates.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

        Ok(RetrievalOutcome {
            candidates,
            knowledge_sources: rag.knowledge_sources,
        })
    }

    async fn legacy(&self, request: &SearchRequest) -> StoreResult<RetrievalOutcome> {
        let query = self.embed(&request.query).await?;
        let candidates = self.store.similarity_search(&query, request.top_k, None).await?;
        Ok(RetrievalOutcome {
            candidates,
            knowledge_sources: Vec::new(),
        })
    }

    /// Replace user rating scores with the catalog's damped review average
    async fn enrich(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let catalog = match &self.catalog {
            Some(catalog) => catalog,
            None => return candidates,
        };

        join_all(candidates.into_iter().map(|mut candidate| async move {
            match catalog.catalog_entry(&candidate.tool_id).await {
                Ok(Some(entry)) => {
                    candidate.quality_components.user_rating_score = entry.reviews.normalized_score();
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(tool_id = %candidate.tool_id, error = %error, "Catalog enrichment failed");
                }
            }
            candidate
        }))
        .await
    }
}

fn log_partial(half: &'static str, result: StoreResult<RetrievalOutcome>) -> RetrievalOutcome {
    result.unwrap_or_else(|error: StoreError| {
        warn!(half, error = %error, "Hybrid retrieval continuing without one half");
        RetrievalOutcome::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::knowledge::{CatalogEntry, KnowledgeEntry, KnowledgeMatch, MockCatalogStore, MockKnowledgeStore, ReviewAggregate};
    use chrono::Utc;
    use recommender_types::{PricingSignal, QualityComponents, ToolMetadata};
    use std::time::Duration;

    fn candidate(id: &str, category: &str, similarity: f64) -> Candidate {
        Candidate {
            tool_id: id.to_string(),
            name: id.to_uppercase(),
            raw_metadata: ToolMetadata {
                name: id.to_uppercase(),
                url: format!("https://{}.example", id),
                logo_url: None,
                category: category.to_string(),
                pricing: PricingSignal::Free,
                difficulty: None,
                created_at: Utc::now(),
            },
            similarity,
            quality_components: QualityComponents::neutral(),
        }
    }

    fn request(query_type: QueryType) -> SearchRequest {
        SearchRequest {
            query: "Write Python web scraper".to_string(),
            task_type: TaskType::Coding,
            query_type,
            preferences: UserPreferences::default(),
            top_k: 10,
        }
    }

    fn retriever(store: MockKnowledgeStore, catalog: Option<MockCatalogStore>) -> CandidateRetriever {
        let embedder = Arc::new(CachedEmbedder::new(
            Arc::new(HashingEmbedder::new(64)),
            Duration::from_secs(60),
            16,
        ));
        CandidateRetriever::new(
            Arc::new(store),
            catalog.map(|c| Arc::new(c) as Arc<dyn CatalogStore>),
            embedder,
            RetrievalConfig::default(),
        )
    }

    fn knowledge(id: &str, relevance: f64) -> KnowledgeMatch {
        KnowledgeMatch {
            entry: KnowledgeEntry {
                id: id.to_string(),
                title: "Scraping".to_string(),
                content: "requests beautifulsoup".to_string(),
                quality: 0.9,
                updated_at: Utc::now(),
            },
            relevance,
        }
    }

    #[tokio::test]
    async fn test_rag_records_relevant_sources_only() {
        let mut store = MockKnowledgeStore::new();
        store
            .expect_search_knowledge()
            .returning(|_, _| Ok(vec![knowledge("kb-1", 0.7), knowledge("kb-2", 0.05)]));
        store
            .expect_similarity_search()
            .withf(|query, _, _| query.text.contains("beautifulsoup"))
            .returning(|_, _, _| Ok(vec![candidate("scrapy", "development", 0.8)]));

        let outcome = retriever(store, None)
            .search(&request(QueryType::Specific), SearchStrategy::RagEnhanced)
            .await
            .unwrap();

        assert_eq!(outcome.knowledge_sources, vec!["kb-1".to_string()]);
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_adaptive_boosts_domain_categories() {
        let mut store = MockKnowledgeStore::new();
        store.expect_similarity_search().returning(|_, top_k, filter| {
            assert_eq!(top_k, 30);
            assert_eq!(filter, Some(SearchFilter::min_similarity(0.1)));
            Ok(vec![candidate("canva", "design", 0.5), candidate("replit", "development", 0.45)])
        });

        let outcome = retriever(store, None)
            .search(&request(QueryType::Ambiguous), SearchStrategy::Adaptive)
            .await
            .unwrap();

        assert_eq!(outcome.candidates[0].tool_id, "replit");
        assert!((outcome.candidates[0].similarity - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_boost_never_exceeds_one() {
        let mut store = MockKnowledgeStore::new();
        store
            .expect_similarity_search()
            .returning(|_, _, _| Ok(vec![candidate("replit", "development", 0.98)]));

        let outcome = retriever(store, None)
            .search(&request(QueryType::Ambiguous), SearchStrategy::Adaptive)
            .await
            .unwrap();
        assert_eq!(outcome.candidates[0].similarity, 1.0);
    }

    #[tokio::test]
    async fn test_hybrid_survives_one_failing_half() {
        let mut store = MockKnowledgeStore::new();
        store
            .expect_search_knowledge()
            .returning(|_, _| Err(StoreError::unavailable("kb down")));
        store
            .expect_similarity_search()
            .returning(|_, _, _| Ok(vec![candidate("replit", "development", 0.7)]));

        let outcome = retriever(store, None)
            .search(&request(QueryType::Specific), SearchStrategy::Hybrid)
            .await
            .unwrap();
        assert_eq!(outcome.candidates.len(), 1);
        assert!(outcome.knowledge_sources.is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_unions_with_max_similarity() {
        let mut store = MockKnowledgeStore::new();
        store.expect_search_knowledge().returning(|_, _| Ok(vec![]));
        store.expect_similarity_search().returning(|_, _, filter| {
            if filter.is_some() {
                Ok(vec![candidate("a", "misc", 0.4), candidate("b", "misc", 0.9)])
            } else {
                Ok(vec![candidate("a", "misc", 0.6)])
            }
        });

        let outcome = retriever(store, None)
            .search(&request(QueryType::Specific), SearchStrategy::Hybrid)
            .await
            .unwrap();

        let ids: Vec<_> = outcome.candidates.iter().map(|c| c.tool_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!((outcome.candidates[1].similarity - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_hybrid_fails_when_both_halves_fail() {
        let mut store = MockKnowledgeStore::new();
        store
            .expect_search_knowledge()
            .returning(|_, _| Err(StoreError::unavailable("down")));
        store
            .expect_similarity_search()
            .returning(|_, _, _| Err(StoreError::unavailable("down")));

        let failure = retriever(store, None)
            .search(&request(QueryType::Specific), SearchStrategy::Hybrid)
            .await
            .unwrap_err();
        assert_eq!(failure.strategy, SearchStrategy::Hybrid);
        assert!(matches!(failure.kind, FailureKind::Store(_)));
    }

    #[tokio::test]
    async fn test_legacy_skips_catalog_and_knowledge() {
        let mut store = MockKnowledgeStore::new();
        store.expect_search_knowledge().never();
        store
            .expect_similarity_search()
            .returning(|_, _, _| Ok(vec![candidate("a", "misc", 0.5)]));
        let mut catalog = MockCatalogStore::new();
        catalog.expect_catalog_entry().never();

        let outcome = retriever(store, Some(catalog))
            .search(&request(QueryType::Specific), SearchStrategy::Legacy)
            .await
            .unwrap();
        assert_eq!(outcome.candidates[0].quality_components, QualityComponents::neutral());
    }

    #[tokio::test]
    async fn test_quality_aware_strategies_use_catalog_reviews() {
        let mut store = MockKnowledgeStore::new();
        store
            .expect_similarity_search()
            .returning(|_, _, _| Ok(vec![candidate("a", "misc", 0.5)]));
        let mut catalog = MockCatalogStore::new();
        catalog.expect_catalog_entry().returning(|id| {
            let base = candidate(id, "misc", 0.0);
            Ok(Some(CatalogEntry {
                tool_id: id.to_string(),
                metadata: base.raw_metadata,
                reviews: ReviewAggregate::new(1000, 5.0),
            }))
        });

        let outcome = retriever(store, Some(catalog))
            .search(&request(QueryType::Specific), SearchStrategy::Adaptive)
            .await
            .unwrap();
        assert!(outcome.candidates[0].quality_components.user_rating_score > 0.9);
    }

    #[tokio::test]
    async fn test_store_error_is_typed() {
        let mut store = MockKnowledgeStore::new();
        store
            .expect_similarity_search()
            .returning(|_, _, _| Err(StoreError::internal("boom")));

        let failure = retriever(store, None)
            .search(&request(QueryType::Specific), SearchStrategy::Legacy)
            .await
            .unwrap_err();
        assert_eq!(failure.strategy, SearchStrategy::Legacy);
    }

    #[tokio::test]
    async fn test_zero_top_k_returns_empty() {
        let mut store = MockKnowledgeStore::new();
        store.expect_similarity_search().never();
        let mut req = request(QueryType::Specific);
        req.top_k = 0;

        let outcome = retriever(store, None).search(&req, SearchStrategy::Legacy).await.unwrap();
        assert!(outcome.is_empty());
    }
}
