//! Simulated embedding service
//!
//! Produces deterministic vectors without any network I/O. Latency and
//! failures can be injected so the load-generation core can be exercised
//! (and the harness itself benchmarked) without a real model server.

use super::{EmbeddingError, EmbeddingPayload, EmbeddingProvider, GenerationResponse};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// In-process embedding provider with configurable behaviour
#[derive(Debug)]
pub struct MockEmbedding {
    model: String,
    dimensions: usize,
    latency: Duration,
    jitter: Duration,
    failure_rate: f64,
    fail_after: Option<u64>,
    fail_every: Option<u64>,
    calls: AtomicU64,
}

impl MockEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self {
            model: "mock".to_string(),
            dimensions: dimensions.max(1),
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
            failure_rate: 0.0,
            fail_after: None,
            fail_every: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Model identifier reported for this provider
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Fixed delay applied to every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Additional uniformly distributed delay in `[0, jitter)`
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Probability in `[0, 1]` that a call fails
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    /// Every call after the first `calls` fails
    pub fn fail_after(mut self, calls: u64) -> Self {
        self.fail_after = Some(calls);
        self
    }

    /// Every `n`-th call fails (n >= 1)
    pub fn fail_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    /// Number of calls received so far, including failed ones
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn should_fail(&self, call: u64) -> bool {
        if self.fail_after.map_or(false, |limit| call > limit) {
            return true;
        }
        if self.fail_every.map_or(false, |n| call % n == 0) {
            return true;
        }
        self.failure_rate > 0.0 && rand::thread_rng().gen_bool(self.failure_rate)
    }

    fn delay(&self) -> Duration {
        let max_jitter_us = self.jitter.as_micros() as u64;
        if max_jitter_us == 0 {
            return self.latency;
        }
        let extra = rand::thread_rng().gen_range(0..max_jitter_us);
        self.latency + Duration::from_micros(extra)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn generate_embeddings(
        &self,
        payloads: &[EmbeddingPayload],
    ) -> Result<Vec<GenerationResponse>, EmbeddingError> {
        if payloads.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let delay = self.delay();
        let fail = self.should_fail(call);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(EmbeddingError::Simulated(format!("call {} failed", call)));
        }

        Ok(payloads
            .iter()
            .map(|payload| GenerationResponse {
                data: payload.data.clone(),
                id: payload.id,
                embedding: deterministic_vector(&payload.data, self.dimensions),
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Uniform values in `[-1, 1)` from an RNG seeded by the text
fn deterministic_vector(text: &str, dimensions: usize) -> Vec<f32> {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let mut rng = StdRng::seed_from_u64(hasher.finish());

    (0..dimensions).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn batch(text: &str) -> Vec<EmbeddingPayload> {
        vec![EmbeddingPayload::new(text, Some(1))]
    }

    #[tokio::test]
    async fn test_vectors_are_deterministic() {
        let provider = MockEmbedding::new(8);
        let a = provider.generate_embeddings(&batch("hello")).await.unwrap();
        let b = provider.generate_embeddings(&batch("hello")).await.unwrap();
        let c = provider.generate_embeddings(&batch("hello 2")).await.unwrap();

        assert_eq!(a[0].embedding.len(), 8);
        assert_eq!(a[0].embedding, b[0].embedding);
        assert_ne!(a[0].embedding, c[0].embedding);
        assert!(a[0].embedding.iter().all(|v| (-1.0..1.0).contains(v)));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_vectors_match_across_instances() {
        let first = MockEmbedding::new(32);
        let second = MockEmbedding::new(32).with_model("other");
        let a = first.generate_embeddings(&batch("same text")).await.unwrap();
        let b = second.generate_embeddings(&batch("same text")).await.unwrap();

        assert_eq!(a[0].embedding, b[0].embedding);
        assert!(a[0].embedding.iter().any(|v| *v != a[0].embedding[0]));
        assert_eq!(first.model(), "mock");
        assert_eq!(second.model(), "other");
    }

    #[tokio::test]
    async fn test_fail_after() {
        let provider = MockEmbedding::new(4).fail_after(2);
        assert!(provider.generate_embeddings(&batch("a")).await.is_ok());
        assert!(provider.generate_embeddings(&batch("b")).await.is_ok());
        assert!(matches!(
            provider.generate_embeddings(&batch("c")).await,
            Err(EmbeddingError::Simulated(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_every() {
        let provider = MockEmbedding::new(4).fail_every(2);
        let results: Vec<bool> = {
            let mut out = Vec::new();
            for i in 0..4 {
                out.push(provider.generate_embeddings(&batch(&i.to_string())).await.is_ok());
            }
            out
        };
        assert_eq!(results, vec![true, false, true, false]);
    }

    #[tokio::test]
    async fn test_full_failure_rate() {
        let provider = MockEmbedding::new(4).with_failure_rate(1.0);
        assert!(provider.generate_embeddings(&batch("a")).await.is_err());
    }

    #[tokio::test]
    async fn test_latency_is_applied() {
        let provider = MockEmbedding::new(4).with_latency(Duration::from_millis(30));
        let start = Instant::now();
        provider.generate_embeddings(&batch("a")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let provider = MockEmbedding::new(4);
        assert!(matches!(
            provider.generate_embeddings(&[]).await,
            Err(EmbeddingError::EmptyInput)
        ));
        assert_eq!(provider.calls(), 0);
    }
}
