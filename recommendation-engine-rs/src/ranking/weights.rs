//! Task-type quality weighting

use recommender_types::{QualityComponents, TaskType};
use serde::Serialize;

/// Weights over the four quality components; each row sums to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityWeights {
    pub benchmark: f64,
    pub user_rating: f64,
    pub performance: f64,
    pub reliability: f64,
}

impl QualityWeights {
    const fn new(benchmark: f64, user_rating: f64, performance: f64, reliability: f64) -> Self {
        Self {
            benchmark,
            user_rating,
            performance,
            reliability,
        }
    }

    pub fn for_task(task_type: TaskType) -> Self {
        match task_type {
            TaskType::Coding => Self::new(0.40, 0.20, 0.25, 0.15),
            TaskType::Math => Self::new(0.45, 0.15, 0.20, 0.20),
            TaskType::Analysis => Self::new(0.30, 0.20, 0.20, 0.30),
            TaskType::General => Self::new(0.25, 0.25, 0.25, 0.25),
            TaskType::Design => Self::new(0.15, 0.45, 0.20, 0.20),
            TaskType::Writing => Self::new(0.15, 0.50, 0.15, 0.20),
            TaskType::Communication => Self::new(0.10, 0.40, 0.20, 0.30),
        }
    }

    pub fn score(&self, q: &QualityComponents) -> f64 {
        (self.benchmark * q.benchmark_score
            + self.user_rating * q.user_rating_score
            + self.performance * q.performance_score
            + self.reliability * q.reliability_score)
            .clamp(0.0, 1.0)
    }

    /// The component contributing most to `score`, with its raw value
    pub fn dominant(&self, q: &QualityComponents) -> (&'static str, f64) {
        let parts = [
            ("benchmark score", self.benchmark, q.benchmark_score),
            ("user rating", self.user_rating, q.user_rating_score),
            ("performance", self.performance, q.performance_score),
            ("reliability", self.reliability, q.reliability_score),
        ];
        parts
            .iter()
            .max_by(|a, b| (a.1 * a.2).total_cmp(&(b.1 * b.2)))
            .map(|(label, _, value)| (*label, *value))
            .unwrap_or(("benchmark score", q.benchmark_score))
    }

    pub fn total(&self) -> f64 {
        self.benchmark + self.user_rating + self.performance + self.reliability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_row_sums_to_one() {
        for task_type in TaskType::ALL {
            let weights = QualityWeights::for_task(task_type);
            assert!((weights.total() - 1.0).abs() < 1e-9, "{}", task_type);
        }
    }

    #[test]
    fn test_coding_and_writing_emphasis() {
        let coding = QualityWeights::for_task(TaskType::Coding);
        assert!(coding.benchmark > coding.user_rating.max(coding.performance).max(coding.reliability));

        let writing = QualityWeights::for_task(TaskType::Writing);
        assert!(writing.user_rating > writing.benchmark.max(writing.performance).max(writing.reliability));
    }

    #[test]
    fn test_dominant_component() {
        let weights = QualityWeights::for_task(TaskType::Coding);
        let q = QualityComponents::new(0.9, 0.5, 0.5, 0.5);
        assert_eq!(weights.dominant(&q), ("benchmark score", 0.9));
    }
}
