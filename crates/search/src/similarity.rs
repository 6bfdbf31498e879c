use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use shutter_protocol::{CreatorSummary, ImageView};
use shutter_providers::{
    decode_base64_image, ImageEmbedder, ImageSource, ObjectStore, ProviderError,
    DEFAULT_SIGNED_URL_TTL,
};
use shutter_vector_store::PrimaryStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_SIMILAR_LIMIT: usize = 20;
pub const MAX_SIMILAR_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub url_ttl: Duration,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SIMILAR_LIMIT,
            max_limit: MAX_SIMILAR_LIMIT,
            url_ttl: DEFAULT_SIGNED_URL_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarImage {
    #[serde(flatten)]
    pub image: ImageView,
    /// `1 − cosine distance`; not clamped.
    pub similarity: f64,
    pub creator: Option<CreatorSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityResponse {
    pub images: Vec<SimilarImage>,
    /// Set when the query image carried nothing to match against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SimilarityResponse {
    fn soft_failure(message: impl Into<String>) -> Self {
        Self {
            images: Vec::new(),
            message: Some(message.into()),
        }
    }
}

/// Finds images of one event that look like a query image.
pub struct SimilaritySearch {
    store: Arc<dyn PrimaryStore>,
    objects: Arc<dyn ObjectStore>,
    embedder: Arc<dyn ImageEmbedder>,
    config: SimilarityConfig,
}

impl SimilaritySearch {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        objects: Arc<dyn ObjectStore>,
        embedder: Arc<dyn ImageEmbedder>,
        config: SimilarityConfig,
    ) -> Self {
        Self {
            store,
            objects,
            embedder,
            config,
        }
    }

    #[must_use]
    pub fn clamp_limit(&self, limit: Option<usize>) -> usize {
        limit
            .unwrap_or(self.config.default_limit)
            .clamp(1, self.config.max_limit.max(1))
    }

    /// Query image given as base64, optionally wrapped in a `data:` URI.
    pub async fn find_similar(
        &self,
        event_id: Uuid,
        image: &str,
        limit: Option<usize>,
    ) -> Result<SimilarityResponse> {
        self.ensure_event(event_id).await?;
        let bytes = decode_base64_image(image).map_err(|err| match err {
            ProviderError::InvalidInput(msg) => SearchError::Validation(msg),
            other => SearchError::Validation(other.to_string()),
        })?;
        self.search(event_id, bytes, limit).await
    }

    /// Query image given as raw bytes, e.g. a multipart upload.
    pub async fn find_similar_bytes(
        &self,
        event_id: Uuid,
        image: Vec<u8>,
        limit: Option<usize>,
    ) -> Result<SimilarityResponse> {
        self.ensure_event(event_id).await?;
        self.search(event_id, image, limit).await
    }

    async fn ensure_event(&self, event_id: Uuid) -> Result<()> {
        match self.store.get_event(event_id).await? {
            Some(_) => Ok(()),
            None => Err(SearchError::NotFound(format!("event {event_id}"))),
        }
    }

    async fn search(
        &self,
        event_id: Uuid,
        bytes: Vec<u8>,
        limit: Option<usize>,
    ) -> Result<SimilarityResponse> {
        if bytes.is_empty() {
            return Err(SearchError::Validation("query image is empty".to_string()));
        }
        let limit = self.clamp_limit(limit);

        let source = ImageSource::from_bytes(bytes);
        let query = match self.embedder.embed(&source).await {
            Ok(vector) => vector,
            Err(err) if err.is_soft_signal() => {
                log::info!("Similarity query for event {event_id} matched nothing: {err}");
                return Ok(SimilarityResponse::soft_failure(soft_message(&err)));
            }
            Err(err) => return Err(err.into()),
        };

        let hits = self.store.nearest_images(event_id, &query, limit).await?;

        let mut creators: HashMap<Uuid, Option<CreatorSummary>> = HashMap::new();
        let mut images = Vec::with_capacity(hits.len());
        for hit in hits.into_iter().take(limit) {
            let creator_id = hit.image.creator_id;
            if !creators.contains_key(&creator_id) {
                let summary = self
                    .store
                    .get_creator(creator_id)
                    .await?
                    .map(|c| c.summary());
                creators.insert(creator_id, summary);
            }
            let url = self
                .objects
                .signed_url(&hit.image.object_id, self.config.url_ttl);
            images.push(SimilarImage {
                similarity: hit.similarity(),
                creator: creators.get(&creator_id).cloned().flatten(),
                image: hit.image.to_view(url),
            });
        }

        log::debug!("Similarity query for event {event_id} returned {} images", images.len());
        Ok(SimilarityResponse {
            images,
            message: None,
        })
    }
}

fn soft_message(err: &ProviderError) -> &'static str {
    match err {
        ProviderError::NoSubjectDetected(_) => {
            "No face or subject could be detected in the query image. Try a clearer photo."
        }
        _ => "The query image could not be read. Upload a JPEG or PNG photo.",
    }
}
