//! # Embedding Benchmark Library
//!
//! A concurrent load-generation harness for text-embedding services. A fixed
//! pool of workers drains a bounded job queue for a fixed wall-clock
//! duration, sending one embedding request per job and recording the latency
//! of every successful call. At the end of the run the samples are reduced
//! to a latency distribution and a throughput figure.
//!
//! ## Architecture Overview
//!
//! The library is organized into several key modules:
//!
//! - `benchmark`: Run configuration and the orchestrator driving a run
//! - `dispatch`: Job producer and the bounded queue feeding the workers
//! - `worker`: Per-worker request loop and failure policies
//! - `embedding`: Provider abstraction with Ollama, OpenAI and mock backends
//! - `metrics`: Sample store, counters and latency statistics
//! - `progress`: Periodic progress updates while a run is active
//! - `results`: Run report, reporters and JSON output
//! - `cli`, `logging`, `utils`: Command-line surface and shared helpers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use embedding_benchmark::{BenchmarkRunner, LogReporter, MockEmbedding, RunConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RunConfig::new(8, Duration::from_secs(30), "test-model", "Lorem ipsum");
//!     let provider = Arc::new(MockEmbedding::new(768).with_latency(Duration::from_millis(20)));
//!
//!     let report = BenchmarkRunner::new(config, provider, Arc::new(LogReporter::new()))
//!         .run()
//!         .await?;
//!
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

/// Run configuration and orchestration
///
/// Contains `RunConfig` and the `BenchmarkRunner` that owns the run
/// lifecycle: deadline, dispatcher, worker pool, draining and aggregation.
pub mod benchmark;

/// Command-line interface and configuration
///
/// Every option can be given as a flag or through an environment variable,
/// with typed defaults. Includes the human-readable duration parser.
pub mod cli;

/// Job production under backpressure
pub mod dispatch;

/// Embedding provider abstraction and implementations
pub mod embedding;

pub mod logging;

/// Latency samples, request counters and statistical aggregation
pub mod metrics;

pub mod progress;

/// Run report, reporters and result output
///
/// The final report is always produced, even when no request succeeded;
/// in that case it carries no latency summary.
pub mod results;

pub mod utils;

pub mod worker;

pub use benchmark::{BenchmarkRunner, RunConfig, RunPhase};

pub use cli::{Args, ProviderKind};

/// Provider capability consumed by workers, and the bundled implementations
pub use embedding::{
    EmbeddingError, EmbeddingPayload, EmbeddingProvider, GenerationResponse, MockEmbedding,
    OllamaEmbedding, OpenAIEmbedding, ProviderFactory,
};

pub use metrics::{LatencySample, ProcessedCounter, SampleStore, Summary, ThroughputMetrics};

pub use results::{LogReporter, Reporter, ResultsManager, RunReport};

pub use worker::{FailurePolicy, StopReason, WorkerOutcome};

/// The current version of the embedding benchmark
///
/// Populated from Cargo.toml and written into JSON reports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// These are the typed defaults behind every CLI option and its
/// environment variable.
pub mod defaults {
    /// Default number of concurrent workers
    pub const WORKERS: usize = 2;

    /// Default run duration
    pub const DURATION: &str = "2m";

    /// Default embedding model
    pub const MODEL: &str = "hf.co/Qwen/Qwen3-Embedding-8B-GGUF:Q8_0";

    /// Default input text
    ///
    /// The job number is appended to it for every request.
    pub const INPUT: &str =
        "Lorem ipsum dolor sit amet, consectetur adipiscing elit. Integer convallis.";

    /// Default Ollama server address
    pub const OLLAMA_HOST: &str = "http://127.0.0.1:11434";

    /// Default base URL of the OpenAI API
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

    /// Default per-request HTTP timeout
    pub const REQUEST_TIMEOUT: &str = "20s";

    /// Default latency of the mock provider
    pub const MOCK_LATENCY: &str = "50ms";

    /// Default vector size of the mock provider
    pub const MOCK_DIMENSIONS: usize = 768;

    /// Default retries per job with `--on-failure retry`
    pub const MAX_RETRIES: u32 = 3;

    /// Default initial retry backoff
    pub const RETRY_BACKOFF: &str = "100ms";

    /// Default interval between progress updates
    pub const PROGRESS_INTERVAL: &str = "10s";
}
