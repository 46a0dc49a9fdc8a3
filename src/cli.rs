use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Embedding Benchmark - concurrent load generator for embedding services
///
/// Every option can also be set through the environment variable shown in
/// its help text; command-line flags take precedence.
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Number of concurrent workers
    #[clap(short = 'w', long, env = "WORKERS", default_value_t = crate::defaults::WORKERS, help_heading = "Core Options")]
    pub workers: usize,

    /// Total run duration (e.g. 90s, 2m, 1m30s)
    #[clap(short = 'd', long, env = "DURATION", value_parser = parse_duration, default_value = crate::defaults::DURATION, help_heading = "Core Options")]
    pub duration: Duration,

    /// Embedding model to request
    #[clap(short = 'm', long, env = "MODEL", default_value = crate::defaults::MODEL, help_heading = "Core Options")]
    pub model: String,

    /// Input text; the job number is appended (or substituted for "{id}") to defeat response caching
    #[clap(short = 'i', long, env = "INPUT", default_value = crate::defaults::INPUT, help_heading = "Core Options")]
    pub input: String,

    /// Embedding provider to benchmark
    #[clap(short = 'p', long, env = "PROVIDER", value_enum, default_value_t = ProviderKind::Ollama, help_heading = "Provider Options")]
    pub provider: ProviderKind,

    /// Ollama server address
    #[clap(long, env = "OLLAMA_HOST", default_value = crate::defaults::OLLAMA_HOST, help_heading = "Provider Options")]
    pub ollama_host: String,

    /// Base URL of the OpenAI-compatible API
    #[clap(long, env = "OPENAI_BASE_URL", default_value = crate::defaults::OPENAI_BASE_URL, help_heading = "Provider Options")]
    pub openai_base_url: String,

    /// API key for the openai provider
    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true, help_heading = "Provider Options")]
    pub openai_api_key: Option<String>,

    /// Per-request HTTP timeout
    #[clap(long, env = "REQUEST_TIMEOUT", value_parser = parse_duration, default_value = crate::defaults::REQUEST_TIMEOUT, help_heading = "Provider Options")]
    pub request_timeout: Duration,

    /// Fixed latency of the mock provider
    #[clap(long, value_parser = parse_duration, default_value = crate::defaults::MOCK_LATENCY, help_heading = "Provider Options")]
    pub mock_latency: Duration,

    /// Probability (0.0 - 1.0) that a mock request fails
    #[clap(long, default_value_t = 0.0, help_heading = "Provider Options")]
    pub mock_failure_rate: f64,

    /// Vector size produced by the mock provider
    #[clap(long, default_value_t = crate::defaults::MOCK_DIMENSIONS, help_heading = "Provider Options")]
    pub mock_dimensions: usize,

    /// What a worker does after a failed request
    #[clap(long, env = "ON_FAILURE", value_enum, default_value_t = FailurePolicyArg::Stop, help_heading = "Failure Handling")]
    pub on_failure: FailurePolicyArg,

    /// Retries per job when --on-failure=retry
    #[clap(long, default_value_t = crate::defaults::MAX_RETRIES, help_heading = "Failure Handling")]
    pub max_retries: u32,

    /// Initial backoff between retries, doubled on every attempt
    #[clap(long, value_parser = parse_duration, default_value = crate::defaults::RETRY_BACKOFF, help_heading = "Failure Handling")]
    pub retry_backoff: Duration,

    /// Interval between progress lines (0 disables)
    #[clap(long, value_parser = parse_duration, default_value = crate::defaults::PROGRESS_INTERVAL, help_heading = "Output Options")]
    pub progress_interval: Duration,

    /// Write the final report as JSON to this file
    #[clap(short = 'o', long, help_heading = "Output Options")]
    pub output_file: Option<PathBuf>,

    /// Also write logs to this file
    #[clap(long, help_heading = "Output Options")]
    pub log_file: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short = 'v', long, action = clap::ArgAction::Count, help_heading = "Output Options")]
    pub verbose: u8,

    /// Only print warnings, errors and the final report
    #[clap(short = 'q', long, default_value_t = false, help_heading = "Output Options")]
    pub quiet: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            workers: crate::defaults::WORKERS,
            duration: parse_duration(crate::defaults::DURATION).unwrap_or_default(),
            model: crate::defaults::MODEL.to_string(),
            input: crate::defaults::INPUT.to_string(),
            provider: ProviderKind::Ollama,
            ollama_host: crate::defaults::OLLAMA_HOST.to_string(),
            openai_base_url: crate::defaults::OPENAI_BASE_URL.to_string(),
            openai_api_key: None,
            request_timeout: parse_duration(crate::defaults::REQUEST_TIMEOUT).unwrap_or_default(),
            mock_latency: parse_duration(crate::defaults::MOCK_LATENCY).unwrap_or_default(),
            mock_failure_rate: 0.0,
            mock_dimensions: crate::defaults::MOCK_DIMENSIONS,
            on_failure: FailurePolicyArg::Stop,
            max_retries: crate::defaults::MAX_RETRIES,
            retry_backoff: parse_duration(crate::defaults::RETRY_BACKOFF).unwrap_or_default(),
            progress_interval: parse_duration(crate::defaults::PROGRESS_INTERVAL)
                .unwrap_or_default(),
            output_file: None,
            log_file: None,
            verbose: 0,
            quiet: false,
        }
    }
}

/// Embedding services that can be benchmarked
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Ollama native embed API
    #[clap(name = "ollama")]
    Ollama,

    /// OpenAI embeddings API
    #[clap(name = "openai")]
    OpenAI,

    /// In-process simulated provider
    #[clap(name = "mock")]
    Mock,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "Ollama"),
            ProviderKind::OpenAI => write!(f, "OpenAI"),
            ProviderKind::Mock => write!(f, "Mock"),
        }
    }
}

/// Worker behaviour after a failed request, as selected on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum FailurePolicyArg {
    /// Stop the worker for the rest of the run
    #[clap(name = "stop")]
    Stop,

    /// Retry the job with exponential backoff
    #[clap(name = "retry")]
    Retry,

    /// Drop the job and continue with the next one
    #[clap(name = "skip")]
    Skip,
}

/// Parse a duration such as "500ms", "10s", "5m", "1h" or "1m30s"
///
/// A bare number is interpreted as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    if let Ok(secs) = s.parse::<f64>() {
        if !secs.is_finite() || secs < 0.0 {
            return Err(format!("Invalid duration: {}", s));
        }
        return Ok(Duration::from_nanos((secs * 1e9).round() as u64));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(format!("Invalid number in duration: {}", s));
        }
        let (num_str, after) = rest.split_at(num_len);
        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, next) = after.split_at(unit_len);

        let num: f64 = num_str
            .parse()
            .map_err(|_| format!("Invalid number in duration: {}", num_str))?;

        let unit_ns = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("Missing unit in duration: {}", s)),
            _ => return Err(format!("Invalid duration unit: {}", unit)),
        };

        total += Duration::from_nanos((num * unit_ns).round() as u64);
        rest = next;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("250us").unwrap(), Duration::from_micros(250));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("-5").is_err());
        assert!(parse_duration("1m30").is_err());
    }

    #[test]
    fn test_args_defaults_match_clap_defaults() {
        let parsed = Args::parse_from(["embedding-benchmark"]);
        let manual = Args::default();

        assert_eq!(parsed.workers, manual.workers);
        assert_eq!(parsed.duration, Duration::from_secs(120));
        assert_eq!(parsed.duration, manual.duration);
        assert_eq!(parsed.model, manual.model);
        assert_eq!(parsed.input, manual.input);
        assert_eq!(parsed.request_timeout, Duration::from_secs(20));
        assert_eq!(parsed.on_failure, FailurePolicyArg::Stop);
    }

    #[test]
    fn test_args_flags() {
        let args = Args::parse_from([
            "embedding-benchmark",
            "-w",
            "8",
            "-d",
            "30s",
            "--provider",
            "mock",
            "--on-failure",
            "skip",
            "-vv",
        ]);
        assert_eq!(args.workers, 8);
        assert_eq!(args.duration, Duration::from_secs(30));
        assert_eq!(args.provider, ProviderKind::Mock);
        assert_eq!(args.on_failure, FailurePolicyArg::Skip);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(ProviderKind::Ollama.to_string(), "Ollama");
        assert_eq!(ProviderKind::OpenAI.to_string(), "OpenAI");
        assert_eq!(ProviderKind::Mock.to_string(), "Mock");
    }
}
