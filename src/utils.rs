//! # Utility Functions and Helper Module
//!
//! Small helpers shared by the benchmark engine, the CLI and the report
//! output: human-readable formatting, parameter validation and payload text
//! rendering.
//!
//! ## Usage Examples
//!
//! ```rust
//! use embedding_benchmark::utils::*;
//! use std::time::Duration;
//!
//! # fn main() -> anyhow::Result<()> {
//! assert_eq!(format_duration(Duration::from_micros(1500)), "1.50ms");
//! assert_eq!(format_request_rate(2.0), "2.00 req/s");
//! assert_eq!(render_payload_text("Lorem ipsum", 7), "Lorem ipsum 7");
//!
//! validate_workers(8)?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use std::time::Duration;

/// Placeholder replaced with the job sequence ID in input templates
pub const ID_PLACEHOLDER: &str = "{id}";

/// Maximum number of concurrent workers accepted for a run
pub const MAX_WORKERS: usize = 1024;

/// Generate a unique identifier for a benchmark run
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Format a duration in a human-readable way
///
/// Selects the most appropriate unit based on the magnitude:
///
/// - **Nanoseconds**: < 1,000 ns (e.g., "500ns")
/// - **Microseconds**: < 1,000,000 ns (e.g., "1.50μs")
/// - **Milliseconds**: < 1,000,000,000 ns (e.g., "25.75ms")
/// - **Seconds**: < 60 seconds (e.g., "5.25s")
/// - **Minutes and Hours**: For longer durations (e.g., "5m 30s", "2h 15m 30s")
///
/// ## Examples
///
/// ```rust
/// # use embedding_benchmark::utils::format_duration;
/// # use std::time::Duration;
/// assert_eq!(format_duration(Duration::from_nanos(750)), "750ns");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ns = duration.as_nanos();

    if total_ns < 1_000 {
        format!("{}ns", total_ns)
    } else if total_ns < 1_000_000 {
        format!("{:.2}μs", total_ns as f64 / 1_000.0)
    } else if total_ns < 1_000_000_000 {
        format!("{:.2}ms", total_ns as f64 / 1_000_000.0)
    } else if total_ns < 60_000_000_000 {
        format!("{:.2}s", total_ns as f64 / 1_000_000_000.0)
    } else {
        let seconds = duration.as_secs();
        let minutes = seconds / 60;
        let remaining_seconds = seconds % 60;

        if minutes < 60 {
            format!("{}m {}s", minutes, remaining_seconds)
        } else {
            let hours = minutes / 60;
            let remaining_minutes = minutes % 60;
            format!("{}h {}m {}s", hours, remaining_minutes, remaining_seconds)
        }
    }
}

/// Format a request rate with two decimals
pub fn format_request_rate(requests_per_second: f64) -> String {
    format!("{:.2} req/s", requests_per_second)
}

/// Format a latency expressed in milliseconds with two decimals
pub fn format_latency_ms(latency_ms: f64) -> String {
    format!("{:.2} ms", latency_ms)
}

/// Build the text sent for one job
///
/// Every request must carry distinct text so that services which cache
/// embeddings by content cannot answer from cache. When the template
/// contains `{id}` each occurrence is replaced with the sequence ID;
/// otherwise the ID is appended after a single space.
///
/// ## Examples
///
/// ```rust
/// # use embedding_benchmark::utils::render_payload_text;
/// assert_eq!(render_payload_text("doc", 3), "doc 3");
/// assert_eq!(render_payload_text("doc-{id}: body", 3), "doc-3: body");
/// ```
pub fn render_payload_text(template: &str, sequence_id: u64) -> String {
    if template.contains(ID_PLACEHOLDER) {
        template.replace(ID_PLACEHOLDER, &sequence_id.to_string())
    } else {
        format!("{} {}", template, sequence_id)
    }
}

/// Validate the number of concurrent workers
///
/// ## Validation Rules
///
/// - **Minimum**: At least 1 worker is required to issue any request
/// - **Maximum**: 1024 workers, beyond which the harness itself becomes the bottleneck
pub fn validate_workers(workers: usize) -> Result<()> {
    if workers == 0 {
        anyhow::bail!("Worker count cannot be zero");
    }
    if workers > MAX_WORKERS {
        anyhow::bail!(
            "Worker count {} is too high (maximum {})",
            workers,
            MAX_WORKERS
        );
    }
    Ok(())
}

/// Validate the run duration
pub fn validate_duration(duration: Duration) -> Result<()> {
    if duration.is_zero() {
        anyhow::bail!("Run duration must be greater than zero");
    }
    Ok(())
}

/// Validate the input text template
pub fn validate_template(template: &str) -> Result<()> {
    if template.trim().is_empty() {
        anyhow::bail!("Input template cannot be empty");
    }
    Ok(())
}

/// Get the number of logical CPU cores available
pub fn get_cpu_cores() -> usize {
    num_cpus::get()
}
