//! # Recommendation Engine
//!
//! Recommends the single best-fit tool for a described task by blending
//! semantic similarity with quality signals.
//!
//! This crate provides:
//!
//! - A keyword classifier that maps task descriptions to task and query types
//! - Four retrieval strategies over a pluggable knowledge store
//! - A fallback chain with one circuit breaker per strategy
//! - Task-weighted reranking with preference filters and boosts
//! - Batch orchestration, sequential or bounded-parallel, with a progress stream
//! - A health monitor with alerting, trend analysis and remediation
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use recommendation_engine::{HashingEmbedder, InMemoryKnowledgeStore, RecommendationEngine};
//! use recommender_types::{SearchContext, Task};
//!
//! # async fn run() -> recommendation_engine::Result<()> {
//! let store = Arc::new(InMemoryKnowledgeStore::new(Arc::new(HashingEmbedder::default())));
//! let engine = RecommendationEngine::builder(store).build()?;
//! let result = engine
//!     .recommend(&Task::new("t1", "Write Python web scraper"), None, &SearchContext::new("s1", "en"))
//!     .await;
//! println!("{:?}", result.tool_id);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod cancel;
pub mod classifier;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod knowledge;
pub mod logging;
pub mod monitoring;
pub mod progress;
pub mod ranking;
pub mod resilience;
pub mod retrieval;
pub mod validation;

pub use batch::{summarize, BatchOrchestrator, BatchSummary};
pub use cancel::{cancellation, CancelHandle, CancelToken};
pub use classifier::{Classification, QueryClassifier};
pub use embedding::{CachedEmbedder, Embedder, HashingEmbedder};
pub use engine::{RecommendationEngine, RecommendationEngineBuilder};
pub use error::{EngineError, FailureKind, Result, StoreError, StoreResult, StrategyFailure};
pub use knowledge::{
    CatalogEntry, CatalogStore, EmbeddingQuery, InMemoryCatalog, InMemoryKnowledgeStore, KnowledgeEntry,
    KnowledgeMatch, KnowledgeStats, KnowledgeStore, ReviewAggregate, SearchFilter, ToolDocument,
};
pub use logging::init_logging;
pub use monitoring::{Alert, HealthMonitor, HealthReport, HealthStatus};
pub use progress::ProgressStream;
pub use ranking::{Reranker, ScoredCandidate};
pub use resilience::{ChainOutcome, CircuitBreaker, CircuitState, FallbackChain};
pub use retrieval::{CandidateRetriever, SearchRequest};
