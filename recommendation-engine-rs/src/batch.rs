//! Batch orchestration for multi-task workflows
//!
//! Sequential mode paces calls with a fixed delay; parallel mode caps
//! in-flight calls with a semaphore. Results always come back in input order,
//! one per task, and a failing task never aborts the rest.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use recommender_types::{BatchConfig, BatchModeConfig, ProgressEvent, RecommendationResult, Task, TaskType};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info};

use crate::cancel::CancelToken;

/// Reason attached to tasks that were never issued
pub const CANCELLED_REASON: &str = "Batch cancelled before this task was issued";

/// Aggregate view of a finished batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub recommended: usize,
    /// Mean final score over tasks that got a tool
    pub average_final_score: f64,
}

pub fn summarize(results: &[RecommendationResult]) -> BatchSummary {
    let scores: Vec<f64> = results.iter().filter(|r| r.has_tool()).map(|r| r.final_score).collect();
    let average_final_score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    BatchSummary {
        total: results.len(),
        recommended: scores.len(),
        average_final_score,
    }
}

fn cancelled_result(task: &Task) -> RecommendationResult {
    RecommendationResult::no_recommendation(task, TaskType::General, CANCELLED_REASON)
}

async fn report(progress: Option<&mpsc::Sender<ProgressEvent>>, done: usize, total: usize, task: &Task) {
    if let Some(sender) = progress {
        let event = ProgressEvent::Progress {
            stage: "recommend".to_string(),
            progress: done as f64 / total.max(1) as f64,
            message: format!("Completed {} of {}: {}", done, total, task.name),
        };
        // Receiver gone means nobody is listening; keep going
        let _ = sender.send(event).await;
    }
}

#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    mode: BatchModeConfig,
    delay: Duration,
    max_in_flight: usize,
}

impl BatchOrchestrator {
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            mode: config.mode,
            delay: Duration::from_millis(config.inter_call_delay_ms),
            max_in_flight: config.max_in_flight.max(1),
        }
    }

    pub fn mode(&self) -> BatchModeConfig {
        self.mode
    }

    /// Run `call` once per task and collect the results in input order
    pub async fn run<F, Fut>(
        &self,
        tasks: &[Task],
        cancel: &CancelToken,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
        call: F,
    ) -> Vec<RecommendationResult>
    where
        F: Fn(&Task) -> Fut,
        Fut: Future<Output = RecommendationResult>,
    {
        info!(tasks = tasks.len(), mode = ?self.mode, "Batch started");
        let results = match self.mode {
            BatchModeConfig::Sequential => self.run_sequential(tasks, cancel, progress, call).await,
            BatchModeConfig::Parallel => self.run_parallel(tasks, cancel, progress, call).await,
        };
        let summary = summarize(&results);
        info!(
            total = summary.total,
            recommended = summary.recommended,
            average_final_score = summary.average_final_score,
            "Batch finished"
        );
        results
    }

    async fn run_sequential<F, Fut>(
        &self,
        tasks: &[Task],
        cancel: &CancelToken,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
        call: F,
    ) -> Vec<RecommendationResult>
    where
        F: Fn(&Task) -> Fut,
        Fut: Future<Output = RecommendationResult>,
    {
        let mut results = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            if cancel.is_cancelled() {
                debug!(issued = index, remaining = tasks.len() - index, "Batch cancelled");
                results.extend(tasks[index..].iter().map(cancelled_result));
                break;
            }

            results.push(call(task).await);
            report(progress, index + 1, tasks.len(), task).await;
        }
        results
    }

    async fn run_parallel<F, Fut>(
        &self,
        tasks: &[Task],
        cancel: &CancelToken,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
        call: F,
    ) -> Vec<RecommendationResult>
    where
        F: Fn(&Task) -> Fut,
        Fut: Future<Output = RecommendationResult>,
    {
        let semaphore = Semaphore::new(self.max_in_flight);
        let completed = AtomicUsize::new(0);
        let total = tasks.len();

        let calls = tasks.iter().map(|task| {
            let semaphore = &semaphore;
            let completed = &completed;
            let call = &call;
            async move {
                let permit = tokio::select! {
                    permit = semaphore.acquire() => permit.ok(),
                    _ = cancel.cancelled() => None,
                };
                if permit.is_none() || cancel.is_cancelled() {
                    return cancelled_result(task);
                }

                let result = call(task).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                report(progress, done, total, task).await;
                result
            }
        });
        join_all(calls).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation;
    use std::sync::Arc;
    use std::time::Instant;

    fn tasks(n: usize) -> Vec<Task> {
        (0..n).map(|i| Task::new(format!("t{}", i), format!("task {}", i))).collect()
    }

    fn found(task: &Task, score: f64) -> RecommendationResult {
        let mut result = RecommendationResult::no_recommendation(task, TaskType::Coding, "found");
        result.tool_id = Some(format!("tool-{}", task.id));
        result.final_score = score;
        result
    }

    fn orchestrator(mode: BatchModeConfig, delay_ms: u64, max_in_flight: usize) -> BatchOrchestrator {
        BatchOrchestrator::new(&BatchConfig {
            mode,
            inter_call_delay_ms: delay_ms,
            max_in_flight,
        })
    }

    #[tokio::test]
    async fn test_sequential_preserves_order_and_paces() {
        let batch = orchestrator(BatchModeConfig::Sequential, 20, 1);
        let input = tasks(3);

        let started = Instant::now();
        let results = batch
            .run(&input, &CancelToken::never(), None, |task| {
                let result = found(task, 0.5);
                async move { result }
            })
            .await;

        assert!(started.elapsed() >= Duration::from_millis(40));
        let ids: Vec<&str> = results.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t0", "t1", "t2"]);
    }

    #[tokio::test]
    async fn test_parallel_respects_in_flight_cap() {
        let batch = orchestrator(BatchModeConfig::Parallel, 0, 2);
        let input = tasks(6);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = batch
            .run(&input, &CancelToken::never(), None, |task| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                let result = found(task, 0.5);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    result
                }
            })
            .await;

        assert_eq!(results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(results[5].task_id, "t5");
    }

    #[tokio::test]
    async fn test_cancel_marks_unissued_tasks() {
        let batch = orchestrator(BatchModeConfig::Sequential, 50, 1);
        let input = tasks(4);
        let (handle, token) = cancellation();
        let issued = AtomicUsize::new(0);

        let results = batch
            .run(&input, &token, None, |task| {
                if issued.fetch_add(1, Ordering::SeqCst) == 0 {
                    handle.cancel();
                }
                let result = found(task, 0.5);
                async move { result }
            })
            .await;

        assert_eq!(results.len(), 4);
        assert!(results[0].has_tool());
        assert!(results[1..].iter().all(|r| !r.has_tool() && r.reason.contains("cancelled")));
        assert_eq!(issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progress_events_per_task() {
        let batch = orchestrator(BatchModeConfig::Sequential, 0, 1);
        let input = tasks(3);
        let (tx, mut rx) = mpsc::channel(16);

        batch
            .run(&input, &CancelToken::never(), Some(&tx), |task| {
                let result = found(task, 0.5);
                async move { result }
            })
            .await;
        drop(tx);

        let mut fractions = Vec::new();
        while let Some(ProgressEvent::Progress { progress, .. }) = rx.recv().await {
            fractions.push(progress);
        }
        assert_eq!(fractions.len(), 3);
        assert!((fractions[2] - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_averages_recommended_only() {
        let input = tasks(5);
        let results: Vec<RecommendationResult> = input
            .iter()
            .enumerate()
            .map(|(i, task)| {
                if i == 2 {
                    RecommendationResult::no_recommendation(task, TaskType::General, "no match")
                } else {
                    found(task, 0.8)
                }
            })
            .collect();

        let summary = summarize(&results);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.recommended, 4);
        assert!((summary.average_final_score - 0.8).abs() < 1e-9);
    }
}
