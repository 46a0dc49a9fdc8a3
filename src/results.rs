use crate::{
    benchmark::RunConfig,
    metrics::{Summary, ThroughputMetrics},
    progress::ProgressUpdate,
    utils::{format_duration, format_latency_ms, format_request_rate},
    worker::WorkerOutcome,
};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Message printed in place of latency figures when nothing succeeded
pub const NO_SAMPLES_MESSAGE: &str = "no successful samples collected";

/// Complete outcome of one benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub provider: String,
    pub model: String,
    pub workers: usize,
    pub configured_duration: Duration,
    pub elapsed: Duration,
    pub processed: u64,
    pub failed: u64,
    pub workers_stopped_on_failure: usize,
    pub jobs_dispatched: u64,
    /// `None` when no request succeeded
    pub summary: Option<Summary>,
    pub throughput: ThroughputMetrics,
    pub system_info: SystemInfo,
}

impl RunReport {
    pub fn has_samples(&self) -> bool {
        self.summary.map_or(false, |s| !s.is_empty())
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Processed {} requests in {}",
            self.processed,
            format_duration(self.elapsed)
        )?;
        if self.failed > 0 {
            writeln!(
                f,
                "Failed requests: {} ({} of {} workers stopped)",
                self.failed, self.workers_stopped_on_failure, self.workers
            )?;
        }

        let summary = match self.summary {
            Some(summary) if !summary.is_empty() => summary,
            _ => return write!(f, "{}", NO_SAMPLES_MESSAGE),
        };

        writeln!(
            f,
            "Latency min / avg / max: {:.2} / {:.2} / {:.2} ms",
            summary.min, summary.mean, summary.max
        )?;
        writeln!(
            f,
            "Latency p50 / p90 / p95 / p99: {:.2} / {:.2} / {:.2} / {:.2} ms",
            summary.p50, summary.p90, summary.p95, summary.p99
        )?;
        writeln!(f, "Latency stddev: {}", format_latency_ms(summary.stddev))?;
        write!(
            f,
            "Throughput: {}",
            format_request_rate(self.throughput.requests_per_second)
        )
    }
}

/// System information for reproducibility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub rust_version: String,
    pub benchmark_version: String,
}

impl SystemInfo {
    pub fn collect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: crate::utils::get_cpu_cores(),
            rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
            benchmark_version: crate::VERSION.to_string(),
        }
    }
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self::collect()
    }
}

/// Sink for run lifecycle events
///
/// The runner never prints on its own; everything a user sees about a run
/// goes through the reporter it was given.
pub trait Reporter: Send + Sync {
    fn run_started(&self, config: &RunConfig);

    fn progress(&self, update: &ProgressUpdate);

    fn worker_stopped(&self, outcome: &WorkerOutcome);

    fn run_completed(&self, report: &RunReport);
}

/// Reporter that writes every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl LogReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for LogReporter {
    fn run_started(&self, config: &RunConfig) {
        for line in config.to_string().lines() {
            info!("{}", line);
        }
    }

    fn progress(&self, update: &ProgressUpdate) {
        info!(
            "[{}] processed {} requests ({}), {} failed",
            format_duration(update.elapsed),
            update.processed,
            format_request_rate(update.requests_per_second),
            update.failed
        );
    }

    fn worker_stopped(&self, outcome: &WorkerOutcome) {
        if outcome.stop_reason.is_failure() {
            warn!(
                "Worker {} stopped after {} requests: {}",
                outcome.worker_id, outcome.completed, outcome.stop_reason
            );
        } else {
            debug!(
                "Worker {} finished after {} requests ({})",
                outcome.worker_id, outcome.completed, outcome.stop_reason
            );
        }
    }

    fn run_completed(&self, report: &RunReport) {
        for line in report.to_string().lines() {
            info!("{}", line);
        }
    }
}

/// Event captured by a [`CollectingReporter`]
#[derive(Debug, Clone)]
pub enum ReportEvent {
    RunStarted { workers: usize },
    Progress(ProgressUpdate),
    WorkerStopped(WorkerOutcome),
    RunCompleted(Box<RunReport>),
}

/// Reporter that keeps every event in memory, for embedding the harness in
/// other tools and for tests
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().clone()
    }

    pub fn worker_outcomes(&self) -> Vec<WorkerOutcome> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ReportEvent::WorkerStopped(outcome) => Some(outcome.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn progress_updates(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| matches!(event, ReportEvent::Progress(_)))
            .count()
    }

    pub fn final_report(&self) -> Option<RunReport> {
        self.events.lock().iter().rev().find_map(|event| match event {
            ReportEvent::RunCompleted(report) => Some((**report).clone()),
            _ => None,
        })
    }
}

impl Reporter for CollectingReporter {
    fn run_started(&self, config: &RunConfig) {
        self.events.lock().push(ReportEvent::RunStarted {
            workers: config.workers,
        });
    }

    fn progress(&self, update: &ProgressUpdate) {
        self.events.lock().push(ReportEvent::Progress(*update));
    }

    fn worker_stopped(&self, outcome: &WorkerOutcome) {
        self.events
            .lock()
            .push(ReportEvent::WorkerStopped(outcome.clone()));
    }

    fn run_completed(&self, report: &RunReport) {
        self.events
            .lock()
            .push(ReportEvent::RunCompleted(Box::new(report.clone())));
    }
}

/// Results manager for JSON output
pub struct ResultsManager {
    output_file: PathBuf,
}

impl ResultsManager {
    /// Create a new results manager
    pub fn new(output_file: &Path) -> Result<Self> {
        if output_file.as_os_str().is_empty() {
            anyhow::bail!("Output file path cannot be empty");
        }
        Ok(Self {
            output_file: output_file.to_path_buf(),
        })
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Write the report, wrapped with run metadata, as pretty JSON
    pub fn write_json(&self, report: &RunReport) -> Result<()> {
        let final_report = FinalReport {
            metadata: ReportMetadata {
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                system_info: report.system_info.clone(),
            },
            report: report.clone(),
        };

        let json = serde_json::to_string_pretty(&final_report)?;
        std::fs::write(&self.output_file, json)
            .with_context(|| format!("Failed to write results to {:?}", self.output_file))?;

        info!("Results written to: {:?}", self.output_file);
        Ok(())
    }
}

/// Document written by [`ResultsManager::write_json`]
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalReport {
    pub metadata: ReportMetadata,
    pub report: RunReport,
}

/// Report metadata
#[derive(Debug, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub system_info: SystemInfo,
}
