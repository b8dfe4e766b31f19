//! Error handling for the recommendation engine
//!
//! Three layers, matching how far each error is allowed to travel:
//! - `StoreError`: a knowledge/catalog adapter call failed
//! - `StrategyFailure`: one retrieval strategy failed; recovered by the fallback chain
//! - `EngineError`: invalid input or configuration, the only errors a caller sees

use std::time::Duration;

use recommender_types::{ConfigError, SearchStrategy};
use thiserror::Error;

/// Result type for engine operations that can reject input
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type for store adapter calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced to the caller
#[derive(Error, Debug)]
pub enum EngineError {
    /// Request validation errors, never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Logging could not be initialized
    #[error("Logging error: {0}")]
    Logging(String),

    /// Unexpected internal fault
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal(message.into())
    }

    /// Input errors map to a client status; everything else is a server fault
    pub fn is_input_error(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}

/// Failures reported by knowledge and catalog adapters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store timeout: {0}")]
    Timeout(String),

    #[error("Store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        StoreError::Timeout(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        StoreError::Internal(message.into())
    }
}

/// Why a single strategy attempt did not produce candidates
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailureKind {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("store failure: {0}")]
    Store(String),

    #[error("circuit breaker open")]
    CircuitOpen,

    #[error("knowledge base unavailable")]
    KnowledgeBaseUnavailable,

    #[error("no candidates returned")]
    EmptyResult,

    #[error("attempt aborted: {0}")]
    Aborted(String),
}

/// A typed, recoverable failure of one retrieval strategy
#[derive(Error, Debug, Clone, PartialEq)]
#[error("strategy {strategy} failed: {kind}")]
pub struct StrategyFailure {
    pub strategy: SearchStrategy,
    pub kind: FailureKind,
}

impl StrategyFailure {
    pub fn new(strategy: SearchStrategy, kind: FailureKind) -> Self {
        Self { strategy, kind }
    }

    pub fn store(strategy: SearchStrategy, error: StoreError) -> Self {
        Self::new(strategy, FailureKind::Store(error.to_string()))
    }

    /// Skipped attempts never reached the retriever
    pub fn was_skipped(&self) -> bool {
        matches!(
            self.kind,
            FailureKind::CircuitOpen | FailureKind::KnowledgeBaseUnavailable
        )
    }

    /// The strategy ran and answered, with nothing to offer
    pub fn answered(&self) -> bool {
        !self.was_skipped() && matches!(self.kind, FailureKind::EmptyResult)
    }

    /// Whether this failure should move the strategy's breaker
    pub fn counts_against_breaker(&self, empty_counts: bool) -> bool {
        match self.kind {
            FailureKind::CircuitOpen | FailureKind::KnowledgeBaseUnavailable => false,
            FailureKind::EmptyResult => empty_counts,
            FailureKind::Timeout(_) | FailureKind::Store(_) | FailureKind::Aborted(_) => true,
        }
    }
}
