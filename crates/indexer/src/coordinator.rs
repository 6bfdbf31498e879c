use crate::error::{IndexerError, Result};
use crate::projector::Projector;
use serde::{Deserialize, Serialize};
use shutter_protocol::{GalleryPage, ImageView, ImageWithVariants, Price, VariantView};
use shutter_providers::{
    AttributeExtractor, ExtractedAttributes, ImageEmbedder, ImageSource, ObjectStore,
    StoredObject, DEFAULT_SIGNED_URL_TTL,
};
use shutter_vector_store::{
    NewImage, NewVariant, PrimaryStore, StoredImage, StoredVariant, VariantPatch,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_GALLERY_LIMIT: u32 = 20;
pub const MAX_GALLERY_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub max_variants: usize,
    pub image_folder: String,
    pub variant_folder: String,
    /// Lifetime of retrieval URLs handed back to callers.
    pub url_ttl: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_variants: 3,
            image_folder: "images".to_string(),
            variant_folder: "variants".to_string(),
            url_ttl: DEFAULT_SIGNED_URL_TTL,
        }
    }
}

/// Raw ingest input as it arrives from the API.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub image: Vec<u8>,
    pub creator_id: String,
    pub event_id: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VariantUpload {
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub image: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum VariantOutcome {
    Created { variant: VariantView },
    Failed { name: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestWithVariants {
    pub image: ImageView,
    pub variants: Vec<VariantOutcome>,
}

/// Runs the ingestion pipeline: validate, extract, embed, upload, persist, project.
pub struct IndexingCoordinator {
    store: Arc<dyn PrimaryStore>,
    objects: Arc<dyn ObjectStore>,
    embedder: Arc<dyn ImageEmbedder>,
    extractor: Arc<dyn AttributeExtractor>,
    projector: Projector,
    config: CoordinatorConfig,
}

impl IndexingCoordinator {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        objects: Arc<dyn ObjectStore>,
        embedder: Arc<dyn ImageEmbedder>,
        extractor: Arc<dyn AttributeExtractor>,
        projector: Projector,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            objects,
            embedder,
            extractor,
            projector,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub async fn ingest(&self, request: IngestRequest) -> Result<ImageView> {
        let (creator_id, event_id) = self.validate(&request).await?;
        self.ingest_validated(request, creator_id, event_id).await
    }

    /// Ingests the main image, then each variant independently.
    ///
    /// Fails as a whole only when validation or the main image fails. Variant failures are
    /// reported per variant and never roll back variants already created.
    pub async fn ingest_with_variants(
        &self,
        request: IngestRequest,
        variants: Vec<VariantUpload>,
    ) -> Result<IngestWithVariants> {
        self.validate_variants(&variants)?;
        let (creator_id, event_id) = self.validate(&request).await?;
        let image = self.ingest_validated(request, creator_id, event_id).await?;

        let mut outcomes = Vec::with_capacity(variants.len());
        for upload in variants {
            let name = upload.name.clone();
            match self.create_variant(image.id, upload).await {
                Ok(variant) => outcomes.push(VariantOutcome::Created { variant }),
                Err(err) => {
                    log::warn!("Variant '{name}' of image {} failed: {err}", image.id);
                    outcomes.push(VariantOutcome::Failed {
                        name,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(IngestWithVariants {
            image,
            variants: outcomes,
        })
    }

    pub async fn update_variant(
        &self,
        creator_id: &str,
        variant_id: Uuid,
        patch: VariantPatch,
    ) -> Result<VariantView> {
        let creator_id = parse_id("creatorId", creator_id)?;
        if patch.is_empty() {
            return Err(IndexerError::Validation(
                "at least one of name, description or price is required".to_string(),
            ));
        }
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(IndexerError::Validation("variant name must not be blank".to_string()));
        }

        let updated = self
            .store
            .update_variant(variant_id, creator_id, patch)
            .await?
            .ok_or_else(|| variant_not_found(variant_id))?;
        Ok(self.variant_view(&updated))
    }

    pub async fn delete_variant(&self, creator_id: &str, variant_id: Uuid) -> Result<()> {
        let creator_id = parse_id("creatorId", creator_id)?;
        let removed = self
            .store
            .delete_variant(variant_id, creator_id)
            .await?
            .ok_or_else(|| variant_not_found(variant_id))?;

        if let Err(err) = self.objects.delete(&removed.object_id).await {
            log::warn!("Variant {variant_id} deleted but blob {} was not: {err}", removed.object_id);
        }
        Ok(())
    }

    /// Image plus its variants, visible only to the creator who uploaded it.
    pub async fn image_with_variants(
        &self,
        creator_id: &str,
        image_id: Uuid,
    ) -> Result<ImageWithVariants> {
        let creator_id = parse_id("creatorId", creator_id)?;
        let image = self
            .store
            .get_image(image_id)
            .await?
            .filter(|image| image.creator_id == creator_id)
            .ok_or_else(|| IndexerError::NotFound(format!("image {image_id}")))?;

        let variants = self.store.list_variants(image.id).await?;
        Ok(ImageWithVariants {
            image: self.image_view(&image),
            variants: variants.iter().map(|v| self.variant_view(v)).collect(),
        })
    }

    /// Everything a creator has uploaded, newest first, optionally narrowed to one event.
    pub async fn creator_contents(
        &self,
        creator_id: &str,
        event_id: Option<&str>,
    ) -> Result<Vec<ImageView>> {
        let creator_id = parse_id("userId", creator_id)?;
        let event_id = match event_id.map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_id("eventId", raw)?),
            _ => None,
        };
        if self.store.get_creator(creator_id).await?.is_none() {
            return Err(IndexerError::NotFound(format!("creator {creator_id}")));
        }

        let images = self.store.creator_images(creator_id, event_id).await?;
        Ok(images.iter().map(|image| self.image_view(image)).collect())
    }

    /// Paged public gallery of an event. `page` is 1-based; `limit` defaults to
    /// [`DEFAULT_GALLERY_LIMIT`] and may not exceed [`MAX_GALLERY_LIMIT`].
    pub async fn event_gallery(
        &self,
        event_id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<GalleryPage> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_GALLERY_LIMIT);
        if page == 0 {
            return Err(IndexerError::Validation("page starts at 1".to_string()));
        }
        if !(1..=MAX_GALLERY_LIMIT).contains(&limit) {
            return Err(IndexerError::Validation(format!(
                "limit must be between 1 and {MAX_GALLERY_LIMIT}"
            )));
        }
        if self.store.get_event(event_id).await?.is_none() {
            return Err(IndexerError::NotFound(format!("event {event_id}")));
        }

        let total = self.store.count_event_images(event_id).await?;
        let offset = u64::from(page - 1) * u64::from(limit);
        let images = if offset < total {
            self.store
                .event_images(event_id, limit as usize, offset)
                .await?
        } else {
            Vec::new()
        };
        Ok(GalleryPage {
            images: images.iter().map(|image| self.image_view(image)).collect(),
            total,
            page,
            limit,
            total_pages: total.div_ceil(u64::from(limit)),
        })
    }

    async fn validate(&self, request: &IngestRequest) -> Result<(Uuid, Option<Uuid>)> {
        if request.image.is_empty() {
            return Err(IndexerError::Validation("image payload is empty".to_string()));
        }
        let creator_id = parse_id("creatorId", &request.creator_id)?;
        let event_id = match request.event_id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_id("eventId", raw)?),
            _ => None,
        };

        if self.store.get_creator(creator_id).await?.is_none() {
            return Err(IndexerError::NotFound(format!("creator {creator_id}")));
        }
        if let Some(event_id) = event_id {
            if self.store.get_event(event_id).await?.is_none() {
                return Err(IndexerError::NotFound(format!("event {event_id}")));
            }
        }
        Ok((creator_id, event_id))
    }

    fn validate_variants(&self, variants: &[VariantUpload]) -> Result<()> {
        if variants.len() > self.config.max_variants {
            return Err(IndexerError::Validation(format!(
                "at most {} variants are allowed, got {}",
                self.config.max_variants,
                variants.len()
            )));
        }
        for (i, variant) in variants.iter().enumerate() {
            if variant.name.trim().is_empty() {
                return Err(IndexerError::Validation(format!("variant {i} has a blank name")));
            }
            if variant.image.is_empty() {
                return Err(IndexerError::Validation(format!(
                    "variant '{}' has no image payload",
                    variant.name
                )));
            }
        }
        Ok(())
    }

    async fn ingest_validated(
        &self,
        request: IngestRequest,
        creator_id: Uuid,
        event_id: Option<Uuid>,
    ) -> Result<ImageView> {
        let data: Arc<[u8]> = request.image.into();
        let source = ImageSource::from_bytes(data.clone());

        let attributes = match self.extractor.extract(&source).await {
            Ok(attributes) => attributes,
            Err(err) => {
                log::warn!("Attribute extraction failed, continuing without: {err}");
                ExtractedAttributes::default()
            }
        };

        let embedding = self.embedder.embed(&source).await?;

        let object = self.objects.put(data, &self.config.image_folder).await?;
        log::debug!("Uploaded image blob {}", object.object_id);

        let new_image = NewImage {
            object_id: object.object_id.clone(),
            description: normalize(request.description),
            bib_number: attributes.bib_number,
            plate_number: attributes.plate_number,
            embedding,
            creator_id,
            event_id,
        };
        let (image, jobs) = match self.store.insert_image(new_image).await {
            Ok(inserted) => inserted,
            Err(err) => {
                self.discard_blob(&object).await;
                return Err(err.into());
            }
        };
        log::info!(
            "Ingested image {} for creator {creator_id} (event {:?})",
            image.id,
            image.event_id
        );

        let report = self.projector.project(&jobs).await;
        if !report.is_clean() {
            log::warn!(
                "Image {} stored; {} projection job(s) deferred to the outbox",
                image.id,
                report.failed
            );
        }

        Ok(self.image_view(&image))
    }

    async fn create_variant(&self, image_id: Uuid, upload: VariantUpload) -> Result<VariantView> {
        let object = self
            .objects
            .put(upload.image.into(), &self.config.variant_folder)
            .await?;
        let inserted = self
            .store
            .insert_variant(NewVariant {
                image_id,
                object_id: object.object_id.clone(),
                name: upload.name.trim().to_string(),
                description: normalize(upload.description),
                price: upload.price,
            })
            .await;
        match inserted {
            Ok(variant) => Ok(self.variant_view(&variant)),
            Err(err) => {
                self.discard_blob(&object).await;
                Err(err.into())
            }
        }
    }

    async fn discard_blob(&self, object: &StoredObject) {
        match self.objects.delete(&object.object_id).await {
            Ok(()) => log::info!("Removed orphaned blob {}", object.object_id),
            Err(err) => log::error!("Orphaned blob {} could not be removed: {err}", object.object_id),
        }
    }

    fn image_view(&self, image: &StoredImage) -> ImageView {
        let url = self
            .objects
            .signed_url(&image.object_id, self.config.url_ttl);
        image.to_view(url)
    }

    fn variant_view(&self, variant: &StoredVariant) -> VariantView {
        let url = self
            .objects
            .signed_url(&variant.object_id, self.config.url_ttl);
        variant.to_view(url)
    }
}

fn parse_id(field: &str, raw: &str) -> Result<Uuid> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(IndexerError::Validation(format!("{field} is required")));
    }
    Uuid::parse_str(trimmed)
        .map_err(|_| IndexerError::Validation(format!("{field} '{trimmed}' is not a valid id")))
}

fn variant_not_found(variant_id: Uuid) -> IndexerError {
    IndexerError::NotFound(format!("variant {variant_id}"))
}

fn normalize(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ids_are_validated() {
        assert!(matches!(parse_id("creatorId", "  "), Err(IndexerError::Validation(_))));
        assert!(matches!(parse_id("creatorId", "abc"), Err(IndexerError::Validation(_))));
        let id = Uuid::new_v4();
        assert_eq!(parse_id("creatorId", &format!(" {id} ")).unwrap(), id);
    }

    #[test]
    fn blank_text_becomes_absent() {
        assert_eq!(normalize(Some("  ".to_string())), None);
        assert_eq!(normalize(Some(" finish ".to_string())), Some("finish".to_string()));
    }

    #[test]
    fn outcomes_serialize_with_status_tag() {
        let failed = VariantOutcome::Failed {
            name: "Print".to_string(),
            error: "upload failed".to_string(),
        };
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["name"], "Print");
    }
}
