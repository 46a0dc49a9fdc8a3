//! Ollama `/api/embed` provider

use super::{
    zip_responses, EmbeddingError, EmbeddingPayload, EmbeddingProvider, GenerationResponse,
};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default port of an Ollama server
const DEFAULT_PORT: u16 = 11434;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

/// Embedding provider backed by an Ollama server
pub struct OllamaEmbedding {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OllamaEmbedding {
    /// Create a provider for `model` served at `host`
    ///
    /// `host` follows the `OLLAMA_HOST` conventions: a bare `host`,
    /// `host:port` or a full URL. A missing scheme defaults to `http` and a
    /// missing port to 11434.
    pub fn new(host: &str, model: &str, timeout: Duration) -> Result<Self, EmbeddingError> {
        if model.trim().is_empty() {
            return Err(EmbeddingError::Configuration(
                "model identifier cannot be empty".to_string(),
            ));
        }

        let client = Client::builder().timeout(timeout).build()?;
        let endpoint = embed_endpoint(host)?;
        debug!("Ollama embeddings endpoint: {}", endpoint);

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn generate_embeddings(
        &self,
        payloads: &[EmbeddingPayload],
    ) -> Result<Vec<GenerationResponse>, EmbeddingError> {
        if payloads.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let request = EmbedRequest {
            model: &self.model,
            input: payloads.iter().map(|p| p.data.as_str()).collect(),
        };

        let response = self.client.post(self.endpoint.clone()).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: EmbedResponse = response.json().await?;
        zip_responses(payloads, body.embeddings)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Resolve an `OLLAMA_HOST`-style value into the embed endpoint URL
fn embed_endpoint(host: &str) -> Result<Url, EmbeddingError> {
    let host = host.trim();
    let raw = if host.is_empty() {
        format!("http://127.0.0.1:{}", DEFAULT_PORT)
    } else if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    };

    let invalid = |reason: String| {
        EmbeddingError::Configuration(format!("invalid Ollama host '{}': {}", host, reason))
    };

    let mut url = Url::parse(&raw).map_err(|err| invalid(err.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host name".to_string()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("query strings and fragments are not allowed".to_string()));
    }
    if url.scheme() == "http" && url.port().is_none() {
        url.set_port(Some(DEFAULT_PORT))
            .map_err(|_| invalid("cannot set port".to_string()))?;
    }

    // Keep any path prefix (reverse proxies) when joining the API path.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.join("api/embed").map_err(|err| invalid(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str) -> String {
        embed_endpoint(host).unwrap().to_string()
    }

    #[test]
    fn test_embed_endpoint() {
        assert_eq!(endpoint(""), "http://127.0.0.1:11434/api/embed");
        assert_eq!(endpoint("localhost"), "http://localhost:11434/api/embed");
        assert_eq!(endpoint("10.0.0.5:8080"), "http://10.0.0.5:8080/api/embed");
        assert_eq!(
            endpoint("https://ollama.example.com/"),
            "https://ollama.example.com/api/embed"
        );
        assert_eq!(
            endpoint("http://gpu-box:11434/proxy"),
            "http://gpu-box:11434/proxy/api/embed"
        );
        assert_eq!(endpoint("[::1]"), "http://[::1]:11434/api/embed");
        assert_eq!(endpoint("[::1]:9000"), "http://[::1]:9000/api/embed");
    }

    #[test]
    fn test_embed_endpoint_scheme_is_case_insensitive() {
        assert_eq!(endpoint("HTTP://gpu-box"), "http://gpu-box:11434/api/embed");
    }

    #[test]
    fn test_embed_endpoint_rejects_malformed_hosts() {
        assert!(matches!(
            embed_endpoint("localhost:abc"),
            Err(EmbeddingError::Configuration(_))
        ));
        assert!(matches!(
            embed_endpoint("http://host?x=1"),
            Err(EmbeddingError::Configuration(_))
        ));
        assert!(matches!(
            embed_endpoint("ftp://host"),
            Err(EmbeddingError::Configuration(_))
        ));
        assert!(OllamaEmbedding::new("localhost:99999", "m", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_embed_endpoint_never_leaves_a_dangling_port_separator() {
        // An empty port either parses as "no port" or is rejected; it must
        // never produce an endpoint with a doubled separator.
        if let Ok(url) = embed_endpoint("localhost:") {
            assert_eq!(url.port(), Some(DEFAULT_PORT));
            assert!(!url.as_str().contains("::"));
        }
    }

    #[test]
    fn test_request_body_shape() {
        let request = EmbedRequest {
            model: "nomic-embed-text",
            input: vec!["a", "b"],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "nomic-embed-text", "input": ["a", "b"]})
        );
    }

    #[test]
    fn test_response_parsing() {
        let body: EmbedResponse =
            serde_json::from_str(r#"{"model":"m","embeddings":[[0.1,0.2],[0.3,0.4]]}"#).unwrap();
        assert_eq!(body.embeddings.len(), 2);

        let missing: EmbedResponse = serde_json::from_str(r#"{"model":"m"}"#).unwrap();
        assert!(missing.embeddings.is_empty());
    }

    #[test]
    fn test_new_rejects_empty_model() {
        assert!(OllamaEmbedding::new("localhost", " ", Duration::from_secs(1)).is_err());
        let provider = OllamaEmbedding::new("localhost", "m", Duration::from_secs(1)).unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:11434/api/embed");
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let provider = OllamaEmbedding::new("localhost", "m", Duration::from_secs(1)).unwrap();
        let result = provider.generate_embeddings(&[]).await;
        assert!(matches!(result, Err(EmbeddingError::EmptyInput)));
    }
}
