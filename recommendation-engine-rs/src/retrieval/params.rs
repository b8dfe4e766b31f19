//! Retrieval tuning derived from the classified query

use recommender_types::{QueryType, TaskType};

/// Breadth, threshold and boost used by the adaptive strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveParams {
    /// How many raw matches to request from the store
    pub breadth: usize,
    /// Matches below this similarity are dropped
    pub min_similarity: f64,
    /// Added to the similarity of candidates in a favored category
    pub category_boost: f64,
}

impl AdaptiveParams {
    /// Vaguer queries search wider with a lower bar and lean harder on categories
    pub fn for_query(query_type: QueryType, top_k: usize) -> Self {
        let top_k = top_k.max(1);
        match query_type {
            QueryType::Specific => Self {
                breadth: top_k,
                min_similarity: 0.3,
                category_boost: 0.05,
            },
            QueryType::Broad => Self {
                breadth: top_k * 2,
                min_similarity: 0.2,
                category_boost: 0.1,
            },
            QueryType::Ambiguous => Self {
                breadth: top_k * 3,
                min_similarity: 0.1,
                category_boost: 0.15,
            },
        }
    }
}

/// Catalog categories that serve a task type
pub fn domain_categories(task_type: TaskType) -> &'static [&'static str] {
    match task_type {
        TaskType::Coding => &["development", "developer tools", "coding", "programming"],
        TaskType::Math => &["math", "education", "science"],
        TaskType::Analysis => &["analytics", "data", "business intelligence", "research"],
        TaskType::General => &["productivity"],
        TaskType::Design => &["design", "creative", "graphics"],
        TaskType::Writing => &["writing", "content", "copywriting"],
        TaskType::Communication => &["communication", "collaboration", "email"],
    }
}

pub fn is_domain_category(task_type: TaskType, category: &str) -> bool {
    domain_categories(task_type)
        .iter()
        .any(|c| c.eq_ignore_ascii_case(category))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breadth_grows_with_ambiguity() {
        let specific = AdaptiveParams::for_query(QueryType::Specific, 10);
        let broad = AdaptiveParams::for_query(QueryType::Broad, 10);
        let ambiguous = AdaptiveParams::for_query(QueryType::Ambiguous, 10);

        assert!(specific.breadth < broad.breadth && broad.breadth < ambiguous.breadth);
        assert!(specific.min_similarity > ambiguous.min_similarity);
        assert!(specific.category_boost < ambiguous.category_boost);
    }

    #[test]
    fn test_domain_category_match_is_case_insensitive() {
        assert!(is_domain_category(TaskType::Coding, "Development"));
        assert!(!is_domain_category(TaskType::Coding, "design"));
    }
}
