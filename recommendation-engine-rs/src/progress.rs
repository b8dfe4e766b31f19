//! Batch progress as a stream of `ProgressEvent`s
//!
//! The stream yields a "started" event, one event per finished task and then
//! exactly one terminal `Complete` or `Error`. Dropping it cancels the batch.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use recommender_types::{ProgressEvent, SearchContext, Task, UserPreferences};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::error;

use crate::cancel::{cancellation, CancelHandle};
use crate::engine::RecommendationEngine;

const CHANNEL_CAPACITY: usize = 64;

pub struct ProgressStream {
    inner: ReceiverStream<ProgressEvent>,
    cancel: CancelHandle,
}

impl ProgressStream {
    /// Stop issuing new tasks; the stream still ends with a terminal event
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for ProgressStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub(crate) fn spawn(
    engine: Arc<RecommendationEngine>,
    tasks: Vec<Task>,
    preferences: Option<UserPreferences>,
    context: SearchContext,
) -> ProgressStream {
    let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
    let (handle, token) = cancellation();

    let worker_sender = sender.clone();
    let job = tokio::spawn(async move {
        let started = ProgressEvent::Progress {
            stage: "started".to_string(),
            progress: 0.0,
            message: format!("Recommending tools for {} tasks", tasks.len()),
        };
        let _ = worker_sender.send(started).await;

        engine
            .recommend_batch_cancellable(&tasks, preferences.as_ref(), &context, None, &token, Some(&worker_sender))
            .await
    });

    tokio::spawn(async move {
        let terminal = match job.await {
            Ok(results) => ProgressEvent::Complete { results },
            Err(join_error) => {
                error!(error = %join_error, "Batch task ended abnormally");
                ProgressEvent::Error {
                    message: format!("batch aborted: {}", join_error),
                }
            }
        };
        let _ = sender.send(terminal).await;
    });

    ProgressStream {
        inner: ReceiverStream::new(receiver),
        cancel: handle,
    }
}
