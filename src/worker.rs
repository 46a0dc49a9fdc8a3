//! Worker execution loop
//!
//! Each worker repeatedly takes the next job from the shared queue, sends
//! one embedding request for it, times the call and records the outcome.
//! What happens after a failed request is decided by a [`FailurePolicy`].

use crate::dispatch::Job;
use crate::embedding::{EmbeddingError, EmbeddingPayload, EmbeddingProvider};
use crate::metrics::{LatencySample, RunMetrics};
use crate::utils::render_payload_text;
use async_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Upper bound for a single retry backoff
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Strategy applied when a request fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// The worker stops for the rest of the run
    #[default]
    StopWorker,

    /// Retry the same job, doubling the backoff after every failed attempt;
    /// once `max_retries` is exhausted the job is skipped
    RetryWithBackoff {
        max_retries: u32,
        initial_backoff: Duration,
    },

    /// Drop the job and take the next one
    SkipJob,
}

/// Decision produced by a [`FailurePolicy`] for one failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Stop,
    Retry(Duration),
    Skip,
}

impl FailurePolicy {
    /// Decide what to do after the `attempt`-th consecutive failure of a job
    /// (1-based)
    pub fn on_failure(&self, attempt: u32) -> FailureAction {
        match *self {
            FailurePolicy::StopWorker => FailureAction::Stop,
            FailurePolicy::SkipJob => FailureAction::Skip,
            FailurePolicy::RetryWithBackoff {
                max_retries,
                initial_backoff,
            } => {
                if attempt == 0 || attempt > max_retries {
                    return FailureAction::Skip;
                }
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                let backoff = initial_backoff
                    .checked_mul(factor)
                    .unwrap_or(MAX_BACKOFF)
                    .min(MAX_BACKOFF);
                FailureAction::Retry(backoff)
            }
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::StopWorker => write!(f, "stop worker"),
            FailurePolicy::SkipJob => write!(f, "skip job"),
            FailurePolicy::RetryWithBackoff {
                max_retries,
                initial_backoff,
            } => write!(
                f,
                "retry up to {} times (initial backoff {:?})",
                max_retries, initial_backoff
            ),
        }
    }
}

/// Why a worker stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The run was cancelled (deadline or external stop)
    Cancelled,
    /// The job queue was closed and drained
    QueueClosed,
    /// A request failed and the failure policy stopped the worker
    ProviderFailure(String),
    /// The worker task itself panicked
    Panicked(String),
}

impl StopReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::ProviderFailure(_) | StopReason::Panicked(_))
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::QueueClosed => write!(f, "queue closed"),
            StopReason::ProviderFailure(err) => write!(f, "provider failure: {}", err),
            StopReason::Panicked(msg) => write!(f, "panicked: {}", msg),
        }
    }
}

/// Final tally of one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub worker_id: usize,
    pub completed: u64,
    pub failed: u64,
    pub stop_reason: StopReason,
}

enum JobResult {
    Completed,
    Skipped,
}

/// A single load-generating worker
pub struct Worker {
    id: usize,
    jobs: Receiver<Job>,
    provider: Arc<dyn EmbeddingProvider>,
    metrics: Arc<RunMetrics>,
    template: Arc<str>,
    policy: FailurePolicy,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        id: usize,
        jobs: Receiver<Job>,
        provider: Arc<dyn EmbeddingProvider>,
        metrics: Arc<RunMetrics>,
        template: Arc<str>,
        policy: FailurePolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            jobs,
            provider,
            metrics,
            template,
            policy,
            cancel,
        }
    }

    /// Run until cancellation, end of the job stream, or a stopping failure
    pub async fn run(self) -> WorkerOutcome {
        let mut completed = 0u64;
        let mut failed = 0u64;

        debug!(worker_id = self.id, "Worker started");

        let stop_reason = loop {
            let job = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break StopReason::Cancelled,

                next = self.jobs.recv() => match next {
                    Ok(job) => job,
                    Err(_) => break StopReason::QueueClosed,
                },
            };

            // Jobs still buffered after cancellation are not worth starting.
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            match self.process(job, &mut failed).await {
                Ok(JobResult::Completed) => completed += 1,
                Ok(JobResult::Skipped) => {}
                Err(reason) => break reason,
            }
        };

        debug!(
            worker_id = self.id,
            completed,
            failed,
            reason = %stop_reason,
            "Worker stopped"
        );

        WorkerOutcome {
            worker_id: self.id,
            completed,
            failed,
            stop_reason,
        }
    }

    async fn process(&self, job: Job, failed: &mut u64) -> Result<JobResult, StopReason> {
        let payload = [EmbeddingPayload::new(
            render_payload_text(&self.template, job.sequence_id),
            i64::try_from(job.sequence_id).ok(),
        )];
        let mut attempt = 0u32;

        loop {
            let start = Instant::now();
            let result = tokio::select! {
                biased;

                // Dropping the request future aborts the in-flight call.
                _ = self.cancel.cancelled() => return Err(StopReason::Cancelled),

                result = self.provider.generate_embeddings(&payload) => result,
            };
            let elapsed = start.elapsed();

            let error = match result {
                Ok(responses) if responses.len() == payload.len() => {
                    self.metrics
                        .record_success(LatencySample::from_duration(elapsed));
                    trace!(
                        worker_id = self.id,
                        job = job.sequence_id,
                        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                        "Request completed"
                    );
                    return Ok(JobResult::Completed);
                }
                Ok(responses) if responses.is_empty() => EmbeddingError::EmptyResponse,
                Ok(responses) => EmbeddingError::CountMismatch {
                    expected: payload.len(),
                    actual: responses.len(),
                },
                Err(err) => err,
            };

            if self.cancel.is_cancelled() {
                return Err(StopReason::Cancelled);
            }

            self.metrics.record_failure();
            *failed += 1;
            attempt += 1;

            match self.policy.on_failure(attempt) {
                FailureAction::Stop => {
                    warn!(
                        worker_id = self.id,
                        job = job.sequence_id,
                        "Request failed, worker stopping: {}",
                        error
                    );
                    return Err(StopReason::ProviderFailure(error.to_string()));
                }
                FailureAction::Skip => {
                    debug!(
                        worker_id = self.id,
                        job = job.sequence_id,
                        attempt,
                        "Request failed, skipping job: {}",
                        error
                    );
                    return Ok(JobResult::Skipped);
                }
                FailureAction::Retry(backoff) => {
                    debug!(
                        worker_id = self.id,
                        job = job.sequence_id,
                        attempt,
                        ?backoff,
                        "Request failed, retrying: {}",
                        error
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(StopReason::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }
}
