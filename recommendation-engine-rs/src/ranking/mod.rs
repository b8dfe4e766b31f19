//! Quality-weighted reranking of retrieved candidates
//!
//! final = 0.6 * similarity + 0.4 * quality + preference boosts, clamped to [0, 1].
//! Budget and free-only preferences are hard filters applied first.

mod weights;

pub use weights::QualityWeights;

use std::cmp::Ordering;

use recommender_types::{Candidate, TaskType, UserPreferences};
use serde::Serialize;

pub const SIMILARITY_WEIGHT: f64 = 0.6;
pub const QUALITY_WEIGHT: f64 = 0.4;
pub const CATEGORY_BOOST: f64 = 0.05;
pub const DIFFICULTY_BOOST: f64 = 0.02;

/// Blend of similarity and quality before boosts
pub fn blended_score(similarity: f64, quality: f64) -> f64 {
    (SIMILARITY_WEIGHT * similarity + QUALITY_WEIGHT * quality).clamp(0.0, 1.0)
}

/// A candidate with its scores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub quality_score: f64,
    pub boost: f64,
    pub final_score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RerankOutcome {
    /// Best first
    pub ranked: Vec<ScoredCandidate>,
    /// Candidates removed by hard preference filters
    pub filtered_out: usize,
}

impl RerankOutcome {
    pub fn best(&self) -> Option<&ScoredCandidate> {
        self.ranked.first()
    }

    /// Gap between the top two scores, 1.0 when there is no runner-up
    pub fn margin(&self) -> f64 {
        match (self.ranked.first(), self.ranked.get(1)) {
            (Some(first), Some(second)) => (first.final_score - second.final_score).clamp(0.0, 1.0),
            (Some(_), None) => 1.0,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Reranker;

impl Reranker {
    pub fn new() -> Self {
        Self
    }

    pub fn rerank(&self, candidates: Vec<Candidate>, task_type: TaskType, preferences: &UserPreferences) -> RerankOutcome {
        let weights = QualityWeights::for_task(task_type);
        let total = candidates.len();

        let mut ranked: Vec<ScoredCandidate> = candidates
            .into_iter()
            .filter(|c| preferences.allows_pricing(&c.raw_metadata.pricing))
            .map(|candidate| score_candidate(candidate, task_type, &weights, preferences))
            .collect();

        ranked.sort_by(compare_ranked);

        RerankOutcome {
            filtered_out: total - ranked.len(),
            ranked,
        }
    }
}

fn score_candidate(
    candidate: Candidate,
    task_type: TaskType,
    weights: &QualityWeights,
    preferences: &UserPreferences,
) -> ScoredCandidate {
    let similarity = candidate.similarity.clamp(0.0, 1.0);
    let quality_score = weights.score(&candidate.quality_components);

    let category_match = preferences.prefers_category(&candidate.raw_metadata.category);
    let mut boost = 0.0;
    if category_match {
        boost += CATEGORY_BOOST;
    }
    if preferences.matches_difficulty(candidate.raw_metadata.difficulty) {
        boost += DIFFICULTY_BOOST;
    }

    let final_score = (blended_score(similarity, quality_score) + boost).clamp(0.0, 1.0);

    let mut reason = if QUALITY_WEIGHT * quality_score > SIMILARITY_WEIGHT * similarity {
        let (label, value) = weights.dominant(&candidate.quality_components);
        format!("Strong {} for {} tasks ({:.2})", label, task_type, value)
    } else {
        format!("Closest match to the task description (similarity {:.2})", similarity)
    };
    if category_match {
        reason.push_str(&format!("; in preferred category {}", candidate.raw_metadata.category));
    }

    ScoredCandidate {
        candidate,
        quality_score,
        boost,
        final_score,
        reason,
    }
}

/// Final score desc, then quality desc, then newer catalog entries first
fn compare_ranked(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.final_score
        .total_cmp(&a.final_score)
        .then_with(|| b.quality_score.total_cmp(&a.quality_score))
        .then_with(|| b.candidate.raw_metadata.created_at.cmp(&a.candidate.raw_metadata.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use recommender_types::{BudgetRange, DifficultyLevel, PricingSignal, QualityComponents, ToolMetadata};

    fn candidate(id: &str, similarity: f64, quality: QualityComponents, pricing: PricingSignal) -> Candidate {
        Candidate {
            tool_id: id.to_string(),
            name: id.to_string(),
            raw_metadata: ToolMetadata {
                name: id.to_string(),
                url: format!("https://{}.example", id),
                logo_url: None,
                category: "development".to_string(),
                pricing,
                difficulty: Some(DifficultyLevel::Beginner),
                created_at: Utc::now(),
            },
            similarity,
            quality_components: quality,
        }
    }

    #[test]
    fn test_quality_can_outrank_similarity_for_coding() {
        let a = candidate("a", 0.80, QualityComponents::new(0.9, 0.5, 0.5, 0.5), PricingSignal::Free);
        let b = candidate("b", 0.85, QualityComponents::new(0.1, 0.5, 0.5, 0.5), PricingSignal::Free);

        let outcome = Reranker::new().rerank(vec![b, a], TaskType::Coding, &UserPreferences::default());
        assert_eq!(outcome.best().unwrap().candidate.tool_id, "a");
        assert!(outcome.ranked[0].final_score > outcome.ranked[1].final_score);
    }

    #[test]
    fn test_blended_score_is_monotonic() {
        let mut previous = blended_score(0.0, 0.5);
        for step in 1..=10 {
            let current = blended_score(step as f64 / 10.0, 0.5);
            assert!(current >= previous);
            previous = current;
        }
        assert!(blended_score(0.5, 0.9) >= blended_score(0.5, 0.1));
    }

    #[test]
    fn test_free_only_filters_paid_tools() {
        let prefs = UserPreferences::default().free_only(true);
        let outcome = Reranker::new().rerank(
            vec![
                candidate("paid", 0.99, QualityComponents::neutral(), PricingSignal::Paid { monthly_usd: 10.0 }),
                candidate("freemium", 0.5, QualityComponents::neutral(), PricingSignal::Freemium),
            ],
            TaskType::General,
            &prefs,
        );
        assert_eq!(outcome.filtered_out, 1);
        assert!(outcome.ranked.iter().all(|s| !s.candidate.raw_metadata.pricing.is_paid_only()));
    }

    #[test]
    fn test_budget_filter_can_empty_the_set() {
        let prefs = UserPreferences::default().with_budget(BudgetRange::new(1.0, 5.0));
        let outcome = Reranker::new().rerank(
            vec![candidate("free", 0.9, QualityComponents::neutral(), PricingSignal::Free)],
            TaskType::General,
            &prefs,
        );
        assert!(outcome.best().is_none());
        assert_eq!(outcome.margin(), 0.0);
    }

    #[test]
    fn test_boosts_are_applied_and_clamped() {
        let prefs = UserPreferences::default()
            .with_categories(["Development"])
            .with_difficulty(DifficultyLevel::Beginner);
        let outcome = Reranker::new().rerank(
            vec![candidate("top", 1.0, QualityComponents::new(1.0, 1.0, 1.0, 1.0), PricingSignal::Free)],
            TaskType::Coding,
            &prefs,
        );
        let best = outcome.best().unwrap();
        assert!((best.boost - 0.07).abs() < 1e-9);
        assert_eq!(best.final_score, 1.0);
        assert!(best.reason.contains("preferred category"));
    }

    #[test]
    fn test_ties_break_on_quality_then_recency() {
        let older = {
            let mut c = candidate("older", 0.5, QualityComponents::neutral(), PricingSignal::Free);
            c.raw_metadata.created_at = Utc::now() - Duration::days(30);
            c
        };
        let newer = candidate("newer", 0.5, QualityComponents::neutral(), PricingSignal::Free);

        let outcome = Reranker::new().rerank(vec![older, newer], TaskType::General, &UserPreferences::default());
        assert_eq!(outcome.ranked[0].candidate.tool_id, "newer");
    }

    #[test]
    fn test_reason_names_dominant_factor() {
        let outcome = Reranker::new().rerank(
            vec![candidate("q", 0.1, QualityComponents::new(1.0, 0.2, 0.2, 0.2), PricingSignal::Free)],
            TaskType::Coding,
            &UserPreferences::default(),
        );
        assert!(outcome.ranked[0].reason.contains("benchmark score"));

        let outcome = Reranker::new().rerank(
            vec![candidate("s", 0.9, QualityComponents::neutral(), PricingSignal::Free)],
            TaskType::Coding,
            &UserPreferences::default(),
        );
        assert!(outcome.ranked[0].reason.contains("similarity"));
    }
}
