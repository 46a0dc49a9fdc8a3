//! # Benchmark Engine Module
//!
//! This module contains the run orchestrator. It owns the lifecycle of one
//! load-generation run: it builds the bounded job queue, starts a single
//! dispatcher and a fixed pool of workers, enforces the wall-clock deadline,
//! waits for every worker to quiesce and finally aggregates the collected
//! latency samples into a [`RunReport`].
//!
//! ## Key Components
//!
//! - **RunConfig**: Immutable parameters of a run
//! - **BenchmarkRunner**: Orchestrator that drives a run to completion
//! - **RunPhase**: Observable state of the run
//!
//! ## Run Lifecycle
//!
//! 1. **Idle**: Configuration validated, nothing started
//! 2. **Running**: Dispatcher, workers and progress reporter active
//! 3. **Draining**: Deadline reached, external stop, or every worker stopped
//!    early; in-flight requests are aborted and workers exit
//! 4. **Completed**: Samples aggregated and the report emitted
//!
//! A completed run is terminal. There is no retry or restart state.
//!
//! ## Concurrency Handling
//!
//! One cancellation token is shared by the deadline timer, the dispatcher and
//! every worker. Firing it stops dispatch and closes the queue, wakes workers
//! parked on an empty queue and aborts requests still in flight. Samples are
//! only read after all worker tasks have been joined.

use crate::{
    cli::{Args, FailurePolicyArg},
    dispatch::{job_queue, JobDispatcher},
    embedding::EmbeddingProvider,
    metrics::{RunMetrics, Summary, ThroughputMetrics},
    progress::ProgressReporter,
    results::{Reporter, RunReport, SystemInfo},
    utils::{
        format_duration, generate_run_id, validate_duration, validate_template, validate_workers,
    },
    worker::{FailurePolicy, StopReason, Worker, WorkerOutcome},
};
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Configuration for a benchmark run
///
/// This structure is the authoritative description of a run. It is built
/// once, validated, and never modified while the run is active.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Number of concurrent workers
    ///
    /// Each worker has at most one request in flight, so this is also the
    /// maximum request concurrency seen by the embedding service.
    pub workers: usize,

    /// Wall-clock duration of the run, measured from the moment it starts
    pub duration: Duration,

    /// Model shown in the start banner
    ///
    /// The provider is built with its own model; the report names the one
    /// the provider actually requests.
    pub model: String,

    /// Text template used to build every payload
    ///
    /// The job sequence ID is substituted for `{id}` or appended, so no two
    /// requests of a run carry the same text.
    pub input_template: String,

    /// What a worker does after a failed request
    pub failure_policy: FailurePolicy,

    /// Interval between progress updates; zero disables them
    pub progress_interval: Duration,
}

impl RunConfig {
    pub fn new(
        workers: usize,
        duration: Duration,
        model: impl Into<String>,
        input_template: impl Into<String>,
    ) -> Self {
        Self {
            workers,
            duration,
            model: model.into(),
            input_template: input_template.into(),
            failure_policy: FailurePolicy::default(),
            progress_interval: Duration::ZERO,
        }
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_progress_interval(mut self, progress_interval: Duration) -> Self {
        self.progress_interval = progress_interval;
        self
    }

    /// Create a run configuration from CLI arguments
    ///
    /// ## Returns
    /// - `Ok(RunConfig)`: Valid configuration ready for use
    /// - `Err(anyhow::Error)`: Zero or excessive workers, zero duration or
    ///   an empty input template
    pub fn from_args(args: &Args) -> Result<Self> {
        let failure_policy = match args.on_failure {
            FailurePolicyArg::Stop => FailurePolicy::StopWorker,
            FailurePolicyArg::Skip => FailurePolicy::SkipJob,
            FailurePolicyArg::Retry => FailurePolicy::RetryWithBackoff {
                max_retries: args.max_retries,
                initial_backoff: args.retry_backoff,
            },
        };

        let config = Self {
            workers: args.workers,
            duration: args.duration,
            model: args.model.clone(),
            input_template: args.input.clone(),
            failure_policy,
            progress_interval: args.progress_interval,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_workers(self.workers)?;
        validate_duration(self.duration)?;
        validate_template(&self.input_template)?;
        Ok(())
    }

    /// Capacity of the job queue: two pending jobs per worker
    pub fn queue_capacity(&self) -> usize {
        self.workers.saturating_mul(2).max(1)
    }
}

impl std::fmt::Display for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Starting embedding benchmark")?;
        writeln!(f, "  Model:              {}", self.model)?;
        writeln!(f, "  Workers:            {}", self.workers)?;
        writeln!(f, "  Duration:           {}", format_duration(self.duration))?;
        writeln!(f, "  Queue Capacity:     {}", self.queue_capacity())?;
        writeln!(f, "  On Failure:         {}", self.failure_policy)?;
        if self.progress_interval.is_zero() {
            writeln!(f, "  Progress:           Disabled")?;
        } else {
            writeln!(
                f,
                "  Progress:           Every {}",
                format_duration(self.progress_interval)
            )?;
        }
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// Observable state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Draining,
    Completed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "idle"),
            RunPhase::Running => write!(f, "running"),
            RunPhase::Draining => write!(f, "draining"),
            RunPhase::Completed => write!(f, "completed"),
        }
    }
}

/// Benchmark runner that orchestrates one load-generation run
///
/// The runner is given everything it talks to: the provider under test and
/// the reporter that receives lifecycle events. An external cancellation
/// token may be attached to stop the run before its deadline (e.g. on
/// Ctrl-C); cancelling the run internally never cancels that token.
///
/// ## Usage Pattern
///
/// ```rust,no_run
/// # use embedding_benchmark::benchmark::{BenchmarkRunner, RunConfig};
/// # use embedding_benchmark::embedding::MockEmbedding;
/// # use embedding_benchmark::results::LogReporter;
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// #
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let config = RunConfig::new(4, Duration::from_secs(10), "test-model", "Lorem ipsum");
/// let runner = BenchmarkRunner::new(
///     config,
///     Arc::new(MockEmbedding::new(768)),
///     Arc::new(LogReporter::new()),
/// );
/// let report = runner.run().await?;
/// println!("{}", report);
/// # Ok(())
/// # }
/// ```
pub struct BenchmarkRunner {
    config: RunConfig,
    provider: Arc<dyn EmbeddingProvider>,
    reporter: Arc<dyn Reporter>,
    external_cancel: Option<CancellationToken>,
    phase: RunPhase,
}

impl BenchmarkRunner {
    pub fn new(
        config: RunConfig,
        provider: Arc<dyn EmbeddingProvider>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            config,
            provider,
            reporter,
            external_cancel: None,
            phase: RunPhase::Idle,
        }
    }

    /// Stop the run early when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.external_cancel = Some(token);
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn transition(&mut self, next: RunPhase) {
        debug!("Run phase: {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Execute the run and return its report
    ///
    /// ## Execution Flow
    ///
    /// 1. Spawn the deadline timer, the dispatcher and `workers` workers
    /// 2. Join workers as they finish, reporting each outcome
    /// 3. Once all workers are gone, stop the dispatcher and progress task
    /// 4. Aggregate the sample snapshot and build the report
    ///
    /// Individual request failures never make this return an error; a run
    /// in which nothing succeeded still yields a report without a summary.
    ///
    /// ## Returns
    /// - `Ok(RunReport)`: The completed run
    /// - `Err(anyhow::Error)`: Invalid configuration
    pub async fn run(mut self) -> Result<RunReport> {
        self.config.validate()?;

        let run_id = generate_run_id();
        let timestamp = chrono::Utc::now();
        let cancel = match &self.external_cancel {
            Some(external) => external.child_token(),
            None => CancellationToken::new(),
        };

        if self.provider.model() != self.config.model {
            warn!(
                "Configured model '{}' differs from provider model '{}'",
                self.config.model,
                self.provider.model()
            );
        }

        self.reporter.run_started(&self.config);
        info!(
            run_id = %run_id,
            provider = self.provider.name(),
            "Starting run with {} workers for {}",
            self.config.workers,
            format_duration(self.config.duration)
        );

        let metrics = Arc::new(RunMetrics::new());
        let (sender, receiver) = job_queue(self.config.queue_capacity());
        let template: Arc<str> = Arc::from(self.config.input_template.as_str());

        let started = Instant::now();
        self.transition(RunPhase::Running);

        let deadline = {
            let cancel = cancel.clone();
            let duration = self.config.duration;
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(duration) => {
                        debug!("Run deadline reached");
                        cancel.cancel();
                    }
                }
            })
        };

        let dispatcher = tokio::spawn(JobDispatcher::new(sender, cancel.clone()).run());

        // Each worker runs in its own task; the wrapper keeps the worker ID
        // available when that task panics.
        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.workers {
            let worker = Worker::new(
                worker_id,
                receiver.clone(),
                Arc::clone(&self.provider),
                Arc::clone(&metrics),
                Arc::clone(&template),
                self.config.failure_policy,
                cancel.clone(),
            );
            workers.spawn(async move { (worker_id, tokio::spawn(worker.run()).await) });
        }
        drop(receiver);

        let progress_stop = cancel.child_token();
        let progress = tokio::spawn(
            ProgressReporter::new(
                Arc::clone(&metrics),
                Arc::clone(&self.reporter),
                self.config.progress_interval,
                started,
            )
            .run(progress_stop.clone()),
        );

        let mut outcomes: Vec<WorkerOutcome> = Vec::with_capacity(self.config.workers);
        loop {
            tokio::select! {
                joined = workers.join_next() => {
                    let Some(joined) = joined else { break };
                    let outcome = match joined {
                        Ok((_, Ok(outcome))) => outcome,
                        Ok((worker_id, Err(err))) => {
                            error!("Worker {} terminated abnormally: {}", worker_id, err);
                            WorkerOutcome {
                                worker_id,
                                completed: 0,
                                failed: 0,
                                stop_reason: StopReason::Panicked(err.to_string()),
                            }
                        }
                        Err(err) => {
                            error!("Worker supervisor task failed: {}", err);
                            continue;
                        }
                    };
                    self.reporter.worker_stopped(&outcome);
                    outcomes.push(outcome);
                }
                _ = cancel.cancelled(), if self.phase == RunPhase::Running => {
                    self.transition(RunPhase::Draining);
                }
            }
        }

        let elapsed = started.elapsed();

        if self.phase == RunPhase::Running {
            info!("All workers stopped before the deadline");
            self.transition(RunPhase::Draining);
        }
        cancel.cancel();

        let jobs_dispatched = dispatcher.await.unwrap_or_else(|err| {
            error!("Dispatcher task failed: {}", err);
            0
        });
        if let Err(err) = deadline.await {
            debug!("Deadline task ended abnormally: {}", err);
        }
        match progress.await {
            Ok(updates) => debug!("Progress reporter sent {} updates", updates),
            Err(err) => error!("Progress reporter failed: {}", err),
        }

        let samples = metrics.samples().snapshot_millis();
        let summary = Summary::from_samples(&samples);
        let processed = metrics.processed();
        let report = RunReport {
            run_id,
            timestamp,
            provider: self.provider.name().to_string(),
            model: self.provider.model().to_string(),
            workers: self.config.workers,
            configured_duration: self.config.duration,
            elapsed,
            processed,
            failed: metrics.failed(),
            workers_stopped_on_failure: outcomes
                .iter()
                .filter(|outcome| outcome.stop_reason.is_failure())
                .count(),
            jobs_dispatched,
            summary: (!summary.is_empty()).then_some(summary),
            throughput: ThroughputMetrics::new(processed, elapsed),
            system_info: SystemInfo::collect(),
        };

        self.transition(RunPhase::Completed);
        self.reporter.run_completed(&report);

        Ok(report)
    }
}
