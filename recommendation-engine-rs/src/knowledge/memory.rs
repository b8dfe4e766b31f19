//! In-memory knowledge store with cosine search over embedded documents

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use recommender_types::{Candidate, QualityComponents, ToolMetadata};
use tokio::sync::RwLock;
use tracing::debug;

use super::{EmbeddingQuery, KnowledgeEntry, KnowledgeMatch, KnowledgeStats, KnowledgeStore, SearchFilter};
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{StoreError, StoreResult};

/// A catalog tool as indexed for search
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDocument {
    pub tool_id: String,
    pub metadata: ToolMetadata,
    pub description: String,
    pub quality: QualityComponents,
}

impl ToolDocument {
    fn search_text(&self) -> String {
        format!("{} {} {}", self.metadata.name, self.metadata.category, self.description)
    }
}

#[derive(Debug)]
struct Indexed<T> {
    item: T,
    embedding: Vec<f32>,
}

/// Store backed by process memory; documents are embedded on insert
pub struct InMemoryKnowledgeStore {
    embedder: Arc<dyn Embedder>,
    tools: RwLock<Vec<Indexed<ToolDocument>>>,
    entries: RwLock<Vec<Indexed<KnowledgeEntry>>>,
    available: AtomicBool,
}

impl InMemoryKnowledgeStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            tools: RwLock::new(Vec::new()),
            entries: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Index a tool, replacing any previous document with the same id
    pub async fn add_tool(&self, document: ToolDocument) -> StoreResult<()> {
        let embedding = self.embedder.embed(&document.search_text()).await?;
        let mut tools = self.tools.write().await;
        tools.retain(|indexed| indexed.item.tool_id != document.tool_id);
        tools.push(Indexed {
            item: document,
            embedding,
        });
        Ok(())
    }

    pub async fn add_entry(&self, entry: KnowledgeEntry) -> StoreResult<()> {
        let text = format!("{} {}", entry.title, entry.content);
        let embedding = self.embedder.embed(&text).await?;
        let mut entries = self.entries.write().await;
        entries.retain(|indexed| indexed.item.id != entry.id);
        entries.push(Indexed { item: entry, embedding });
        Ok(())
    }

    /// Simulate an outage; every call fails while unavailable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("in-memory store marked unavailable"))
        }
    }
}

fn by_score_desc(a: f64, b: f64) -> CmpOrdering {
    b.partial_cmp(&a).unwrap_or(CmpOrdering::Equal)
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn similarity_search(
        &self,
        query: &EmbeddingQuery,
        top_k: usize,
        filter: Option<SearchFilter>,
    ) -> StoreResult<Vec<Candidate>> {
        self.ensure_available()?;
        let filter = filter.unwrap_or_default();
        let tools = self.tools.read().await;

        let mut scored: Vec<Candidate> = tools
            .iter()
            .map(|indexed| (indexed, cosine_similarity(&query.vector, &indexed.embedding)))
            .filter(|(_, similarity)| filter.accepts(*similarity))
            .map(|(indexed, similarity)| Candidate {
                tool_id: indexed.item.tool_id.clone(),
                name: indexed.item.metadata.name.clone(),
                raw_metadata: indexed.item.metadata.clone(),
                similarity,
                quality_components: indexed.item.quality,
            })
            .collect();

        scored.sort_by(|a, b| by_score_desc(a.similarity, b.similarity));
        scored.truncate(top_k);
        debug!(query = %query.text, matches = scored.len(), "In-memory tool search");
        Ok(scored)
    }

    async fn search_knowledge(&self, query: &EmbeddingQuery, top_k: usize) -> StoreResult<Vec<KnowledgeMatch>> {
        self.ensure_available()?;
        let entries = self.entries.read().await;

        let mut matches: Vec<KnowledgeMatch> = entries
            .iter()
            .map(|indexed| KnowledgeMatch {
                entry: indexed.item.clone(),
                relevance: cosine_similarity(&query.vector, &indexed.embedding),
            })
            .filter(|m| m.relevance > 0.0)
            .collect();

        matches.sort_by(|a, b| by_score_desc(a.relevance, b.relevance));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn knowledge_stats(&self) -> StoreResult<KnowledgeStats> {
        self.ensure_available()?;
        let entries = self.entries.read().await;
        let tools = self.tools.read().await;

        let quality_score = if entries.is_empty() {
            0.0
        } else {
            entries.iter().map(|indexed| indexed.item.quality).sum::<f64>() / entries.len() as f64
        };

        Ok(KnowledgeStats {
            total_entries: entries.len(),
            total_tools: tools.len(),
            quality_score,
            last_updated: entries.iter().map(|indexed| indexed.item.updated_at).max(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use chrono::Utc;
    use recommender_types::PricingSignal;

    fn tool(id: &str, name: &str, category: &str, description: &str) -> ToolDocument {
        ToolDocument {
            tool_id: id.to_string(),
            metadata: ToolMetadata {
                name: name.to_string(),
                url: format!("https://{}.example", id),
                logo_url: None,
                category: category.to_string(),
                pricing: PricingSignal::Free,
                difficulty: None,
                created_at: Utc::now(),
            },
            description: description.to_string(),
            quality: QualityComponents::neutral(),
        }
    }

    async fn store() -> (InMemoryKnowledgeStore, HashingEmbedder) {
        let embedder = HashingEmbedder::new(128);
        let store = InMemoryKnowledgeStore::new(Arc::new(embedder.clone()));
        store
            .add_tool(tool("scrapy", "Scrapy", "development", "python web scraper framework"))
            .await
            .unwrap();
        store
            .add_tool(tool("canva", "Canva", "design", "logo and poster design"))
            .await
            .unwrap();
        (store, embedder)
    }

    #[tokio::test]
    async fn test_search_ranks_closest_tool_first() {
        let (store, embedder) = store().await;
        let query = EmbeddingQuery::new("python scraper", embedder.embed_sync("python scraper"));

        let results = store.similarity_search(&query, 10, None).await.unwrap();
        assert_eq!(results[0].tool_id, "scrapy");
        assert!(results.iter().all(|c| (0.0..=1.0).contains(&c.similarity)));
    }

    #[tokio::test]
    async fn test_filter_and_top_k() {
        let (store, embedder) = store().await;
        let query = EmbeddingQuery::new("python scraper", embedder.embed_sync("python scraper"));

        let strict = store
            .similarity_search(&query, 10, Some(SearchFilter::min_similarity(0.3)))
            .await
            .unwrap();
        assert_eq!(strict.len(), 1);

        let limited = store.similarity_search(&query, 1, None).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_reinsert_replaces_document() {
        let (store, _) = store().await;
        store
            .add_tool(tool("scrapy", "Scrapy 2", "development", "crawler"))
            .await
            .unwrap();
        assert_eq!(store.knowledge_stats().await.unwrap().total_tools, 2);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_calls() {
        let (store, embedder) = store().await;
        store.set_available(false);
        let query = EmbeddingQuery::new("x", embedder.embed_sync("x"));
        assert!(matches!(
            store.similarity_search(&query, 1, None).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.knowledge_stats().await.is_err());
    }

    #[tokio::test]
    async fn test_knowledge_stats_average_quality() {
        let (store, _) = store().await;
        for (id, quality) in [("k1", 0.8), ("k2", 0.4)] {
            store
                .add_entry(KnowledgeEntry {
                    id: id.to_string(),
                    title: "Scraping guide".to_string(),
                    content: "Use a scraper library".to_string(),
                    quality,
                    updated_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let stats = store.knowledge_stats().await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert!((stats.quality_score - 0.6).abs() < 1e-9);
        assert!(stats.last_updated.is_some());
    }
}
