use crate::embeddings::{ensure_dimension, ImageEmbedder};
use crate::error::{ProviderError, Result};
use crate::source::ImageSource;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "face-embedding";

#[derive(Debug, Clone)]
pub struct FaceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model_name: String,
    pub detector_backend: String,
    pub dimension: usize,
}

impl FaceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model_name: "Facenet512".to_string(),
            detector_backend: "retinaface".to_string(),
            dimension: 512,
        }
    }
}

#[derive(Debug, Serialize)]
struct RepresentRequest<'a> {
    img: String,
    model_name: &'a str,
    detector_backend: &'a str,
    enforce_detection: bool,
}

#[derive(Debug, Deserialize)]
struct RepresentResponse {
    #[serde(default)]
    results: Vec<FaceResult>,
}

#[derive(Debug, Deserialize)]
struct FaceResult {
    embedding: Vec<f32>,
    #[serde(default)]
    face_confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "detail", alias = "message")]
    error: String,
}

/// Face-embedding service client (`POST {base}/represent`).
///
/// When several faces are found the most confident detection is embedded.
pub struct FaceEmbedder {
    client: Client,
    config: FaceConfig,
}

impl FaceEmbedder {
    pub fn new(client: Client, config: FaceConfig) -> Self {
        Self { client, config }
    }
}

/// Maps a provider error message onto the recognized soft-failure signals.
pub fn classify_face_error(message: &str) -> Option<ProviderError> {
    let lowered = message.to_ascii_lowercase();
    const NO_SUBJECT: [&str; 3] = ["face could not be detected", "no face", "faces could not be detected"];
    const UNDECODABLE: [&str; 5] = [
        "could not decode",
        "cannot identify image",
        "could not read image",
        "invalid image",
        "unsupported image",
    ];
    if NO_SUBJECT.iter().any(|needle| lowered.contains(needle)) {
        return Some(ProviderError::NoSubjectDetected(message.to_string()));
    }
    if UNDECODABLE.iter().any(|needle| lowered.contains(needle)) {
        return Some(ProviderError::UndecodableImage(message.to_string()));
    }
    None
}

#[async_trait]
impl ImageEmbedder for FaceEmbedder {
    fn model_id(&self) -> &str {
        &self.config.model_name
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, image: &ImageSource) -> Result<Vec<f32>> {
        let request = RepresentRequest {
            img: image.to_uri(),
            model_name: &self.config.model_name,
            detector_backend: &self.config.detector_backend,
            enforce_detection: true,
        };
        let url = format!("{}/represent", self.config.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| body.clone());
            if let Some(soft) = classify_face_error(&message) {
                log::debug!("Face provider soft failure: {soft}");
                return Err(soft);
            }
            return Err(ProviderError::Http {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RepresentResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::malformed(PROVIDER, err.to_string()))?;
        let best = parsed
            .results
            .into_iter()
            .max_by(|a, b| {
                let ca = a.face_confidence.unwrap_or(0.0);
                let cb = b.face_confidence.unwrap_or(0.0);
                ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| {
                ProviderError::NoSubjectDetected("no face found in the image".to_string())
            })?;

        ensure_dimension(PROVIDER, &best.embedding, self.config.dimension)?;
        Ok(best.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_failures_are_soft_signals() {
        let err = classify_face_error(
            "Face could not be detected in numpy array.Please confirm that the picture is a face photo",
        )
        .unwrap();
        assert!(matches!(err, ProviderError::NoSubjectDetected(_)));
        assert!(err.is_soft_signal());

        let err = classify_face_error("cannot identify image file <_io.BytesIO>").unwrap();
        assert!(matches!(err, ProviderError::UndecodableImage(_)));
        assert!(err.is_soft_signal());
    }

    #[test]
    fn unrelated_errors_are_not_classified() {
        assert!(classify_face_error("model weights missing").is_none());
        assert!(!ProviderError::InvalidInput("x".into()).is_soft_signal());
    }

    #[test]
    fn error_body_accepts_common_field_names() {
        let a: ErrorBody = serde_json::from_str(r#"{"error":"no face"}"#).unwrap();
        let b: ErrorBody = serde_json::from_str(r#"{"detail":"no face"}"#).unwrap();
        assert_eq!(a.error, b.error);
    }
}
