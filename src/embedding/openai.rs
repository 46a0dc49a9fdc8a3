//! OpenAI `/embeddings` provider

use super::{
    zip_responses, EmbeddingError, EmbeddingPayload, EmbeddingProvider, GenerationResponse,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    embedding: Vec<f64>,
}

/// Embedding provider backed by the OpenAI embeddings API
pub struct OpenAIEmbedding {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAIEmbedding {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::Configuration(
                "OpenAI API key cannot be empty".to_string(),
            ));
        }
        if model.trim().is_empty() {
            return Err(EmbeddingError::Configuration(
                "model identifier cannot be empty".to_string(),
            ));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim().trim_end_matches('/')),
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn generate_embeddings(
        &self,
        payloads: &[EmbeddingPayload],
    ) -> Result<Vec<GenerationResponse>, EmbeddingError> {
        let input = collect_inputs(payloads)?;
        let request = EmbeddingRequest {
            input,
            model: &self.model,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: EmbeddingResponse = response.json().await?;
        into_responses(payloads, body)
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Validate payload text before any request is made
fn collect_inputs(payloads: &[EmbeddingPayload]) -> Result<Vec<&str>, EmbeddingError> {
    if payloads.is_empty() {
        return Err(EmbeddingError::EmptyInput);
    }
    payloads
        .iter()
        .enumerate()
        .map(|(index, payload)| {
            if payload.data.is_empty() {
                Err(EmbeddingError::EmptyPayload { index })
            } else {
                Ok(payload.data.as_str())
            }
        })
        .collect()
}

fn into_responses(
    payloads: &[EmbeddingPayload],
    body: EmbeddingResponse,
) -> Result<Vec<GenerationResponse>, EmbeddingError> {
    let mut data = body.data;
    // Items are matched to inputs by `index` when every item carries one.
    if data.iter().all(|item| item.index.is_some()) {
        data.sort_by_key(|item| item.index);
    }
    let embeddings = data
        .into_iter()
        .map(|item| item.embedding.into_iter().map(|v| v as f32).collect())
        .collect();
    zip_responses(payloads, embeddings)
}
