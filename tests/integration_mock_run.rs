use anyhow::Result;
use embedding_benchmark::{
    cli::{Args, ProviderKind},
    embedding::ProviderFactory,
    results::{CollectingReporter, ResultsManager},
    BenchmarkRunner, FailurePolicy, MockEmbedding, RunConfig, StopReason,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Verify a full run against the in-process provider ends at its deadline.
///
/// Eight workers with a fixed per-request delay must all be cancelled by the
/// deadline, and every success must show up as exactly one sample.
#[tokio::test]
async fn mock_run_respects_deadline() -> Result<()> {
    let provider = Arc::new(MockEmbedding::new(16).with_latency(Duration::from_millis(10)));
    let reporter = Arc::new(CollectingReporter::new());
    let config = RunConfig::new(8, Duration::from_millis(300), "test-model", "doc {id}");

    let start = Instant::now();
    let report = BenchmarkRunner::new(config, provider.clone(), reporter.clone())
        .run()
        .await?;
    let wall = start.elapsed();

    assert!(wall >= Duration::from_millis(300));
    // Deadline plus at most one aborted request per worker, with slack.
    assert!(wall < Duration::from_millis(1500), "run took {:?}", wall);

    let summary = report.summary.expect("samples were collected");
    assert_eq!(summary.count as u64, report.processed);
    assert!(summary.min <= summary.p50 && summary.p99 <= summary.max);
    assert!(summary.min >= 10.0);
    assert!(report.throughput.requests_per_second > 0.0);
    assert!(provider.calls() >= report.processed);

    let outcomes = reporter.worker_outcomes();
    assert_eq!(outcomes.len(), 8);
    assert!(outcomes.iter().all(|o| o.stop_reason == StopReason::Cancelled));
    Ok(())
}

/// Requests slower than the whole run are aborted at the deadline instead of
/// holding the run open, and the report states that nothing completed.
#[tokio::test]
async fn in_flight_requests_are_aborted_at_deadline() -> Result<()> {
    let provider = Arc::new(MockEmbedding::new(16).with_latency(Duration::from_secs(5)));
    let reporter = Arc::new(CollectingReporter::new());
    let config = RunConfig::new(8, Duration::from_millis(200), "test-model", "text");

    let start = Instant::now();
    let report = BenchmarkRunner::new(config, provider, reporter.clone())
        .run()
        .await?;
    let wall = start.elapsed();

    assert!(wall < Duration::from_secs(1), "run took {:?}", wall);
    assert_eq!(report.processed, 0);
    assert_eq!(report.failed, 0);
    assert!(report.summary.is_none());
    assert!(report.to_string().contains("no successful samples collected"));

    let outcomes = reporter.worker_outcomes();
    assert_eq!(outcomes.len(), 8);
    assert!(outcomes.iter().all(|o| o.stop_reason == StopReason::Cancelled));
    Ok(())
}

/// A provider that always fails stops every worker, and the run completes
/// well before its deadline with an explicit "no samples" report.
#[tokio::test]
async fn always_failing_provider_reports_no_samples() -> Result<()> {
    let provider = Arc::new(MockEmbedding::new(16).with_failure_rate(1.0));
    let reporter = Arc::new(CollectingReporter::new());
    let config = RunConfig::new(4, Duration::from_secs(60), "test-model", "text");

    let start = Instant::now();
    let report = BenchmarkRunner::new(config, provider, reporter.clone())
        .run()
        .await?;

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(report.processed, 0);
    assert!(report.summary.is_none());
    assert_eq!(report.workers_stopped_on_failure, 4);
    assert!(report
        .to_string()
        .contains("no successful samples collected"));

    let outcomes = reporter.worker_outcomes();
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes
        .iter()
        .all(|o| matches!(o.stop_reason, StopReason::ProviderFailure(_))));
    Ok(())
}

/// With the skip policy, intermittent failures never reduce parallelism.
#[tokio::test]
async fn skip_policy_keeps_workers_running() -> Result<()> {
    let provider = Arc::new(
        MockEmbedding::new(16)
            .with_latency(Duration::from_millis(2))
            .fail_every(2),
    );
    let reporter = Arc::new(CollectingReporter::new());
    let config = RunConfig::new(3, Duration::from_millis(200), "test-model", "text")
        .with_failure_policy(FailurePolicy::SkipJob);

    let report = BenchmarkRunner::new(config, provider, reporter.clone())
        .run()
        .await?;

    assert!(report.processed > 0);
    assert!(report.failed > 0);
    assert_eq!(report.workers_stopped_on_failure, 0);
    assert!(reporter
        .worker_outcomes()
        .iter()
        .all(|o| o.stop_reason == StopReason::Cancelled));
    Ok(())
}

/// The CLI path: provider from arguments, JSON report on disk.
#[tokio::test]
async fn cli_configured_run_writes_json() -> Result<()> {
    let output = tempfile::NamedTempFile::new()?;
    let args = Args {
        provider: ProviderKind::Mock,
        workers: 2,
        duration: Duration::from_millis(100),
        mock_latency: Duration::from_millis(1),
        progress_interval: Duration::from_millis(30),
        output_file: Some(output.path().to_path_buf()),
        ..Default::default()
    };

    let config = RunConfig::from_args(&args)?;
    let provider = ProviderFactory::create(&args)?;
    let reporter = Arc::new(CollectingReporter::new());
    let report = BenchmarkRunner::new(config, provider, reporter.clone())
        .run()
        .await?;

    assert!(reporter.progress_updates() >= 1);

    let manager = ResultsManager::new(output.path())?;
    manager.write_json(&report)?;

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(output.path())?)?;
    assert_eq!(json["report"]["provider"], "mock");
    assert_eq!(json["report"]["workers"], 2);
    assert_eq!(json["report"]["processed"], report.processed);
    Ok(())
}
