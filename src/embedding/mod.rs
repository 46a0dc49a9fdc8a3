//! # Embedding Provider Abstraction
//!
//! The benchmark core only ever talks to an embedding service through the
//! [`EmbeddingProvider`] trait: a batch of text payloads goes in, one vector
//! per payload comes back in the same order, or the whole batch fails.
//!
//! ## Implementations
//!
//! - **Ollama**: native `/api/embed` endpoint of a local or remote Ollama server
//! - **OpenAI**: the `/embeddings` endpoint of the OpenAI API (or a compatible server)
//! - **Mock**: an in-process simulated service with configurable latency and
//!   failure injection, used for dry runs and tests

use crate::cli::{Args, ProviderKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub mod mock;
pub mod ollama;
pub mod openai;

pub use mock::MockEmbedding;
pub use ollama::OllamaEmbedding;
pub use openai::OpenAIEmbedding;

/// A single text item submitted for embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingPayload {
    pub data: String,
    /// Optional caller-side tracking identifier, echoed back in the response
    pub id: Option<i64>,
}

impl EmbeddingPayload {
    pub fn new(data: impl Into<String>, id: Option<i64>) -> Self {
        Self {
            data: data.into(),
            id,
        }
    }
}

/// The embedding generated for one payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub data: String,
    pub id: Option<i64>,
    pub embedding: Vec<f32>,
}

/// Errors raised by embedding providers
///
/// Any of these fails the whole batch; no partial results are returned.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request contained no payloads")]
    EmptyInput,

    #[error("payload {index} has empty text")]
    EmptyPayload { index: usize },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider returned no embeddings")]
    EmptyResponse,

    #[error("provider returned {actual} embeddings for {expected} payloads")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding {index} in the response is empty")]
    MissingEmbedding { index: usize },

    #[error("simulated failure: {0}")]
    Simulated(String),

    #[error("provider misconfigured: {0}")]
    Configuration(String),
}

/// Capability that turns text payloads into vector embeddings
///
/// Implementations must be safe to share across all workers of a run.
/// Cancellation is handled by the caller dropping the returned future, so
/// implementations should not hold locks across await points.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate one embedding per payload, preserving input order and count
    async fn generate_embeddings(
        &self,
        payloads: &[EmbeddingPayload],
    ) -> Result<Vec<GenerationResponse>, EmbeddingError>;

    /// Short provider name for logs and reports
    fn name(&self) -> &'static str;

    /// Model identifier this provider requests embeddings from
    fn model(&self) -> &str;
}

/// Pair each payload with its embedding, enforcing the one-to-one contract
pub(crate) fn zip_responses(
    payloads: &[EmbeddingPayload],
    embeddings: Vec<Vec<f32>>,
) -> Result<Vec<GenerationResponse>, EmbeddingError> {
    if embeddings.is_empty() {
        return Err(EmbeddingError::EmptyResponse);
    }
    if embeddings.len() != payloads.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: payloads.len(),
            actual: embeddings.len(),
        });
    }

    payloads
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(index, (payload, embedding))| {
            if embedding.is_empty() {
                return Err(EmbeddingError::MissingEmbedding { index });
            }
            Ok(GenerationResponse {
                data: payload.data.clone(),
                id: payload.id,
                embedding,
            })
        })
        .collect()
}

/// Factory for building the provider selected on the command line
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create the configured provider, shared across all workers
    pub fn create(args: &Args) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
        let provider: Arc<dyn EmbeddingProvider> = match args.provider {
            ProviderKind::Ollama => Arc::new(OllamaEmbedding::new(
                &args.ollama_host,
                &args.model,
                args.request_timeout,
            )?),
            ProviderKind::OpenAI => {
                let api_key = args.openai_api_key.clone().ok_or_else(|| {
                    anyhow::anyhow!("OPENAI_API_KEY must be set to use the openai provider")
                })?;
                Arc::new(OpenAIEmbedding::new(
                    &args.openai_base_url,
                    api_key,
                    &args.model,
                    args.request_timeout,
                )?)
            }
            ProviderKind::Mock => Arc::new(
                MockEmbedding::new(args.mock_dimensions)
                    .with_model(&args.model)
                    .with_latency(args.mock_latency)
                    .with_failure_rate(args.mock_failure_rate),
            ),
        };
        Ok(provider)
    }
}
