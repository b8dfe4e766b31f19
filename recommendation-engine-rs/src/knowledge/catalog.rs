//! Read-only catalog adapter: tool metadata plus review aggregates

use async_trait::async_trait;
use dashmap::DashMap;
use recommender_types::ToolMetadata;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

// Bayesian damping: reviews are blended with this many virtual reviews at the prior mean
const PRIOR_REVIEW_WEIGHT: f64 = 10.0;
const PRIOR_MEAN_RATING: f64 = 3.0;
const MIN_RATING: f64 = 1.0;
const MAX_RATING: f64 = 5.0;

/// Review statistics on a 1..5 star scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAggregate {
    pub review_count: u32,
    pub average_rating: f64,
}

impl ReviewAggregate {
    pub fn new(review_count: u32, average_rating: f64) -> Self {
        Self {
            review_count,
            average_rating,
        }
    }

    /// Damped average rating mapped onto 0..1. Few reviews stay near the prior.
    pub fn normalized_score(&self) -> f64 {
        let n = self.review_count as f64;
        let average = if self.average_rating.is_finite() {
            self.average_rating.clamp(MIN_RATING, MAX_RATING)
        } else {
            PRIOR_MEAN_RATING
        };
        let damped = (PRIOR_REVIEW_WEIGHT * PRIOR_MEAN_RATING + n * average) / (PRIOR_REVIEW_WEIGHT + n);
        ((damped - MIN_RATING) / (MAX_RATING - MIN_RATING)).clamp(0.0, 1.0)
    }
}

/// Catalog record for one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub tool_id: String,
    pub metadata: ToolMetadata,
    pub reviews: ReviewAggregate,
}

/// Per-tool catalog lookups
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn catalog_entry(&self, tool_id: &str) -> StoreResult<Option<CatalogEntry>>;
}

/// Concurrent in-memory catalog
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    entries: DashMap<String, CatalogEntry>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: CatalogEntry) {
        self.entries.insert(entry.tool_id.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn catalog_entry(&self, tool_id: &str) -> StoreResult<Option<CatalogEntry>> {
        Ok(self.entries.get(tool_id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recommender_types::PricingSignal;

    #[test]
    fn test_damping_pulls_small_samples_to_prior() {
        let single = ReviewAggregate::new(1, 5.0).normalized_score();
        let many = ReviewAggregate::new(1000, 5.0).normalized_score();
        let none = ReviewAggregate::new(0, 0.0).normalized_score();

        assert!(single < many);
        assert!((none - 0.5).abs() < 1e-9);
        assert!(many > 0.95 && many <= 1.0);
    }

    #[test]
    fn test_out_of_range_ratings_are_clamped() {
        assert!(ReviewAggregate::new(50, 9.0).normalized_score() <= 1.0);
        assert!(ReviewAggregate::new(50, f64::NAN).normalized_score() >= 0.0);
    }

    #[tokio::test]
    async fn test_catalog_lookup() {
        let catalog = InMemoryCatalog::new();
        catalog.insert(CatalogEntry {
            tool_id: "notion".to_string(),
            metadata: ToolMetadata {
                name: "Notion".to_string(),
                url: "https://notion.so".to_string(),
                logo_url: None,
                category: "productivity".to_string(),
                pricing: PricingSignal::Freemium,
                difficulty: None,
                created_at: Utc::now(),
            },
            reviews: ReviewAggregate::new(120, 4.6),
        });

        assert!(catalog.catalog_entry("notion").await.unwrap().is_some());
        assert!(catalog.catalog_entry("missing").await.unwrap().is_none());
        assert_eq!(catalog.len(), 1);
    }
}
