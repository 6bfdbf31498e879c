use crate::embeddings::{ensure_dimension, ImageEmbedder};
use crate::error::{ProviderError, Result};
use crate::source::ImageSource;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "jina";

pub const DEFAULT_JINA_ENDPOINT: &str = "https://api.jina.ai/v1/embeddings";
pub const DEFAULT_JINA_MODEL: &str = "jina-clip-v2";
pub const DEFAULT_JINA_DIMENSION: usize = 1024;

#[derive(Debug, Clone)]
pub struct JinaConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub dimension: usize,
}

impl JinaConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_JINA_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_JINA_MODEL.to_string(),
            dimension: DEFAULT_JINA_DIMENSION,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<ImageInput>,
    normalized: bool,
}

#[derive(Debug, Serialize)]
struct ImageInput {
    image: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// General visual-similarity embedder backed by the Jina embeddings API.
pub struct JinaEmbedder {
    client: Client,
    config: JinaConfig,
}

impl JinaEmbedder {
    pub fn new(client: Client, config: JinaConfig) -> Self {
        Self { client, config }
    }
}

impl std::fmt::Debug for JinaEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JinaEmbedder")
            .field("model", &self.config.model)
            .field("dimension", &self.config.dimension)
            .finish()
    }
}

#[async_trait]
impl ImageEmbedder for JinaEmbedder {
    fn model_id(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, image: &ImageSource) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: vec![ImageInput {
                image: image.to_url_or_base64(),
            }],
            normalized: true,
        };

        log::debug!(
            "Requesting {} embedding ({} input bytes)",
            self.config.model,
            image.len_hint()
        );
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::malformed(PROVIDER, err.to_string()))?;
        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "response contained no embeddings"))?;

        ensure_dimension(PROVIDER, &embedding, self.config.dimension)?;
        log::debug!("Generated {}-dimensional embedding", embedding.len());
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_in_provider_shape() {
        let request = EmbeddingRequest {
            model: DEFAULT_JINA_MODEL,
            input: vec![ImageInput {
                image: "https://example.com/a.jpg".to_string(),
            }],
            normalized: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "jina-clip-v2");
        assert_eq!(json["input"][0]["image"], "https://example.com/a.jpg");
    }

    #[test]
    fn response_parses_first_embedding() {
        let raw = r#"{"model":"jina-clip-v2","data":[{"index":0,"embedding":[0.5,0.5]}],"usage":{"total_tokens":1}}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.5, 0.5]);
    }
}
