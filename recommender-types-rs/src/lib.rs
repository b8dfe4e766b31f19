//! # Recommender Types
//!
//! Data model and configuration shared by the recommendation engine and any
//! request layer that sits in front of it.

pub mod config;
pub mod model;
pub mod preferences;

pub use config::{
    BatchConfig, BatchModeConfig, BreakerConfig, ConfigError, EngineConfig, LoggingConfig,
    MonitorConfig, RetrievalConfig,
};
pub use model::{
    Candidate, ProgressEvent, QualityComponents, QueryType, RecommendationResult, SearchContext,
    SearchStrategy, Task, TaskType, ToolMetadata,
};
pub use preferences::{BudgetRange, DifficultyLevel, Preference, PricingSignal, UserPreferences};
