//! Strategy fallback chain
//!
//! Walks `SearchStrategy::PRIORITY`, skipping strategies whose breaker
//! rejects the call or that need the knowledge base while it is marked
//! unavailable. Each admitted attempt runs on a detached task bounded by the
//! per-call timeout; the task records its own outcome on the breaker, so the
//! breaker stays consistent even when the caller stops waiting. A fired
//! cancel token stops the walk; no further strategy is issued.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use recommender_types::{BreakerConfig, RetrievalConfig, SearchStrategy};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
use crate::cancel::CancelToken;
use crate::error::{FailureKind, StrategyFailure};
use crate::retrieval::{CandidateRetriever, RetrievalOutcome, SearchRequest};

/// Result of walking the chain once
#[derive(Debug, Clone, Default)]
pub struct ChainOutcome {
    /// First strategy that produced candidates
    pub success: Option<(SearchStrategy, RetrievalOutcome)>,
    /// Every strategy that was skipped or failed before it, in order
    pub failures: Vec<StrategyFailure>,
    pub elapsed: Duration,
    /// The walk stopped on cancellation; a late result was discarded
    pub cancelled: bool,
}

impl ChainOutcome {
    pub fn strategy(&self) -> Option<SearchStrategy> {
        self.success.as_ref().map(|(strategy, _)| *strategy)
    }

    /// True when no strategy succeeded and none of the attempted ones
    /// answered. Skipped strategies never count as answers.
    pub fn is_failure(&self) -> bool {
        self.success.is_none() && !self.cancelled && !self.failures.iter().any(|f| f.answered())
    }
}

fn slot(strategy: SearchStrategy) -> usize {
    match strategy {
        SearchStrategy::RagEnhanced => 0,
        SearchStrategy::Adaptive => 1,
        SearchStrategy::Hybrid => 2,
        SearchStrategy::Legacy => 3,
    }
}

fn cancelled(at: SearchStrategy, failures: Vec<StrategyFailure>, started: Instant) -> ChainOutcome {
    debug!(strategy = %at, "Fallback chain cancelled");
    ChainOutcome {
        success: None,
        failures,
        elapsed: started.elapsed(),
        cancelled: true,
    }
}

/// Ordered strategies, each behind its own circuit breaker
pub struct FallbackChain {
    retriever: Arc<CandidateRetriever>,
    breakers: [Arc<CircuitBreaker>; 4],
    attempts: [AtomicUsize; 4],
    knowledge_base_available: AtomicBool,
    call_timeout: Duration,
    empty_counts_as_failure: bool,
}

impl FallbackChain {
    pub fn new(retriever: Arc<CandidateRetriever>, retrieval: &RetrievalConfig, breaker: &BreakerConfig) -> Self {
        let breaker_config = CircuitBreakerConfig::from(breaker);
        let breakers = SearchStrategy::PRIORITY
            .map(|strategy| Arc::new(CircuitBreaker::new(strategy.as_str(), breaker_config.clone())));

        Self {
            retriever,
            breakers,
            attempts: Default::default(),
            knowledge_base_available: AtomicBool::new(true),
            call_timeout: retrieval.call_timeout(),
            empty_counts_as_failure: retrieval.empty_result_counts_as_failure,
        }
    }

    pub fn retriever(&self) -> &Arc<CandidateRetriever> {
        &self.retriever
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn breaker(&self, strategy: SearchStrategy) -> &Arc<CircuitBreaker> {
        &self.breakers[slot(strategy)]
    }

    /// Attempts actually handed to the retriever for `strategy`
    pub fn attempt_count(&self, strategy: SearchStrategy) -> usize {
        self.attempts[slot(strategy)].load(Ordering::SeqCst)
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.iter().map(|b| b.snapshot()).collect()
    }

    pub fn set_knowledge_base_available(&self, available: bool) {
        let previous = self.knowledge_base_available.swap(available, Ordering::SeqCst);
        if previous != available {
            info!(available, "Knowledge base availability changed");
        }
    }

    pub fn is_knowledge_base_available(&self) -> bool {
        self.knowledge_base_available.load(Ordering::SeqCst)
    }

    fn is_eligible(&self, strategy: SearchStrategy) -> bool {
        !strategy.requires_knowledge_base() || self.is_knowledge_base_available()
    }

    /// Try strategies in priority order until one returns candidates or
    /// `cancel` fires
    pub async fn execute(&self, request: Arc<SearchRequest>, cancel: &CancelToken) -> ChainOutcome {
        let started = Instant::now();
        let mut failures = Vec::new();

        for strategy in SearchStrategy::PRIORITY {
            if cancel.is_cancelled() {
                return cancelled(strategy, failures, started);
            }
            if !self.is_eligible(strategy) {
                debug!(strategy = %strategy, "Skipping strategy, knowledge base unavailable");
                failures.push(StrategyFailure::new(strategy, FailureKind::KnowledgeBaseUnavailable));
                continue;
            }

            let breaker = Arc::clone(self.breaker(strategy));
            if !breaker.try_acquire() {
                failures.push(StrategyFailure::new(strategy, FailureKind::CircuitOpen));
                continue;
            }

            self.attempts[slot(strategy)].fetch_add(1, Ordering::SeqCst);
            counter!("recommender_strategy_attempts_total", 1, "strategy" => strategy.as_str());

            let attempt = tokio::select! {
                result = self.attempt(strategy, breaker, Arc::clone(&request)) => result,
                _ = cancel.cancelled() => return cancelled(strategy, failures, started),
            };

            match attempt {
                Ok(outcome) => {
                    histogram!(
                        "recommender_chain_duration_ms",
                        started.elapsed().as_secs_f64() * 1000.0,
                        "strategy" => strategy.as_str()
                    );
                    return ChainOutcome {
                        success: Some((strategy, outcome)),
                        failures,
                        elapsed: started.elapsed(),
                        cancelled: false,
                    };
                }
                Err(failure) => {
                    debug!(strategy = %strategy, failure = %failure.kind, "Strategy attempt failed");
                    counter!("recommender_strategy_failures_total", 1, "strategy" => strategy.as_str());
                    failures.push(failure);
                }
            }
        }

        warn!(
            failures = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "All retrieval strategies exhausted"
        );
        ChainOutcome {
            success: None,
            failures,
            elapsed: started.elapsed(),
            cancelled: false,
        }
    }

    async fn attempt(
        &self,
        strategy: SearchStrategy,
        breaker: Arc<CircuitBreaker>,
        request: Arc<SearchRequest>,
    ) -> Result<RetrievalOutcome, StrategyFailure> {
        let retriever = Arc::clone(&self.retriever);
        let call_timeout = self.call_timeout;
        let empty_counts = self.empty_counts_as_failure;
        let task_breaker = Arc::clone(&breaker);

        let handle = tokio::spawn(async move {
            let result = match timeout(call_timeout, retriever.search(&request, strategy)).await {
                Ok(Ok(outcome)) if outcome.is_empty() => {
                    Err(StrategyFailure::new(strategy, FailureKind::EmptyResult))
                }
                Ok(result) => result,
                Err(_) => Err(StrategyFailure::new(strategy, FailureKind::Timeout(call_timeout))),
            };

            match &result {
                Ok(_) => task_breaker.record_success(),
                Err(failure) if failure.counts_against_breaker(empty_counts) => task_breaker.record_failure(),
                // The strategy answered; it just had nothing to offer
                Err(_) => task_breaker.record_success(),
            }
            result
        });

        match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                breaker.record_failure();
                Err(StrategyFailure::new(strategy, FailureKind::Aborted(join_error.to_string())))
            }
        }
    }

    /// Open a strategy's breaker ahead of failures
    pub fn force_open(&self, strategy: SearchStrategy) {
        warn!(strategy = %strategy, "Forcing circuit breaker open");
        self.breaker(strategy).force_open();
    }

    pub fn reset(&self, strategy: SearchStrategy) {
        self.breaker(strategy).reset();
    }
}
