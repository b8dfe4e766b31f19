//! Knowledge and catalog store adapters
//!
//! The engine only reads from these stores. `KnowledgeStore` answers
//! similarity searches over tool embeddings and curated knowledge entries;
//! `CatalogStore` serves per-tool metadata and review aggregates.

mod catalog;
mod memory;

pub use catalog::{CatalogEntry, CatalogStore, InMemoryCatalog, ReviewAggregate};
pub use memory::{InMemoryKnowledgeStore, ToolDocument};

#[cfg(test)]
pub use catalog::MockCatalogStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recommender_types::Candidate;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Query text plus its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingQuery {
    pub text: String,
    pub vector: Vec<f32>,
}

impl EmbeddingQuery {
    pub fn new(text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            vector,
        }
    }
}

/// Optional narrowing of a similarity search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Drop matches below this similarity
    pub min_similarity: Option<f64>,
}

impl SearchFilter {
    pub fn min_similarity(threshold: f64) -> Self {
        Self {
            min_similarity: Some(threshold),
        }
    }

    pub fn accepts(&self, similarity: f64) -> bool {
        self.min_similarity.map_or(true, |min| similarity >= min)
    }
}

/// Curated text used to enrich queries before tool search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Editorial quality of the entry, 0..1
    pub quality: f64,
    pub updated_at: DateTime<Utc>,
}

/// A knowledge entry with its relevance to a query
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeMatch {
    pub entry: KnowledgeEntry,
    pub relevance: f64,
}

/// Aggregate health of the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total_entries: usize,
    pub total_tools: usize,
    /// Mean entry quality, 0..1
    pub quality_score: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Read-only similarity search over tools and knowledge entries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Tools most similar to the query, best first
    async fn similarity_search(
        &self,
        query: &EmbeddingQuery,
        top_k: usize,
        filter: Option<SearchFilter>,
    ) -> StoreResult<Vec<Candidate>>;

    /// Knowledge entries most relevant to the query, best first
    async fn search_knowledge(&self, query: &EmbeddingQuery, top_k: usize) -> StoreResult<Vec<KnowledgeMatch>>;

    async fn knowledge_stats(&self) -> StoreResult<KnowledgeStats>;
}
