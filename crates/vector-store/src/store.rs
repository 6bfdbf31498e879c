use crate::error::{Result, StoreError};
use crate::types::{
    NeighborHit, NewImage, NewVariant, ProjectionJob, StoredImage, StoredVariant, VariantPatch,
};
use async_trait::async_trait;
use shutter_protocol::{Creator, Event};
use uuid::Uuid;

/// Source of truth for creators, events, images, variants and the projection outbox.
///
/// Nearest-neighbor reads are ordered by cosine distance ascending, ties broken by image id
/// ascending, and only consider rows that carry an embedding. Stored and query vectors must
/// match [`Self::dimension`] and be non-zero; anything else is rejected with
/// [`StoreError::InvalidDimension`] or [`StoreError::InvalidVector`].
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Embedding dimension the store accepts.
    fn dimension(&self) -> usize;

    async fn get_creator(&self, id: Uuid) -> Result<Option<Creator>>;

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>>;

    /// Persists the image and enqueues its projection jobs atomically.
    ///
    /// Always enqueues an image upsert; additionally enqueues an event image-count refresh
    /// when the image belongs to an event.
    async fn insert_image(&self, image: NewImage) -> Result<(StoredImage, Vec<ProjectionJob>)>;

    async fn get_image(&self, id: Uuid) -> Result<Option<StoredImage>>;

    /// Images uploaded by `creator_id`, newest first, optionally narrowed to one event.
    async fn creator_images(
        &self,
        creator_id: Uuid,
        event_id: Option<Uuid>,
    ) -> Result<Vec<StoredImage>>;

    /// One page of an event's gallery, newest first with ties broken by id.
    async fn event_images(&self, event_id: Uuid, limit: usize, offset: u64)
        -> Result<Vec<StoredImage>>;

    async fn nearest_images(
        &self,
        event_id: Uuid,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<NeighborHit>>;

    async fn count_event_images(&self, event_id: Uuid) -> Result<u64>;

    async fn insert_variant(&self, variant: NewVariant) -> Result<StoredVariant>;

    async fn get_variant(&self, id: Uuid) -> Result<Option<StoredVariant>>;

    /// Variants of one image in creation order.
    async fn list_variants(&self, image_id: Uuid) -> Result<Vec<StoredVariant>>;

    /// Applies `patch` when the variant's parent image is owned by `creator_id`.
    /// Returns `None` when no such variant exists for that creator.
    async fn update_variant(
        &self,
        variant_id: Uuid,
        creator_id: Uuid,
        patch: VariantPatch,
    ) -> Result<Option<StoredVariant>>;

    /// Deletes the variant under the same ownership rule as [`Self::update_variant`] and
    /// returns the removed row.
    async fn delete_variant(&self, variant_id: Uuid, creator_id: Uuid)
        -> Result<Option<StoredVariant>>;

    /// Outbox jobs with fewer than `max_attempts` attempts, oldest first.
    async fn pending_projections(&self, max_attempts: i32, limit: usize)
        -> Result<Vec<ProjectionJob>>;

    async fn complete_projection(&self, job_id: i64) -> Result<()>;

    /// Records a failed attempt; the job stays in the outbox.
    async fn fail_projection(&self, job_id: i64, error: &str) -> Result<()>;

    /// Number of outbox jobs still eligible for another attempt.
    async fn pending_projection_count(&self, max_attempts: i32) -> Result<u64>;
}

/// Accepts vectors of the store's dimension with at least one non-zero component.
///
/// Zero-norm vectors have no cosine distance to anything (pgvector yields NaN), so both
/// stores refuse them instead of ranking them inconsistently.
pub(crate) fn ensure_vector(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(StoreError::InvalidDimension {
            expected,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(StoreError::InvalidVector("vector has non-finite components".to_string()));
    }
    if vector.iter().all(|v| *v == 0.0) {
        return Err(StoreError::InvalidVector("zero vector has no cosine direction".to_string()));
    }
    Ok(())
}
