use crate::error::{Result, StoreError};
use crate::store::{ensure_vector, PrimaryStore};
use crate::types::{
    NeighborHit, NewImage, NewVariant, ProjectionJob, ProjectionKind, StoredImage, StoredVariant,
    VariantPatch,
};
use crate::vector::cosine_distance;
use async_trait::async_trait;
use chrono::Utc;
use shutter_protocol::{Creator, Event};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    creators: HashMap<Uuid, Creator>,
    events: HashMap<Uuid, Event>,
    images: HashMap<Uuid, StoredImage>,
    variants: HashMap<Uuid, StoredVariant>,
    outbox: BTreeMap<i64, ProjectionJob>,
    next_job_id: i64,
}

impl State {
    fn enqueue(&mut self, kind: ProjectionKind, entity_id: Uuid) -> ProjectionJob {
        self.next_job_id += 1;
        let job = ProjectionJob {
            id: self.next_job_id,
            kind,
            entity_id,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
        };
        self.outbox.insert(job.id, job.clone());
        job
    }

    fn owned_variant(&self, variant_id: Uuid, creator_id: Uuid) -> bool {
        self.variants
            .get(&variant_id)
            .and_then(|variant| self.images.get(&variant.image_id))
            .is_some_and(|image| image.creator_id == creator_id)
    }
}

/// In-process [`PrimaryStore`] with brute-force cosine search.
///
/// Used for local runs without Postgres and as the store behind integration tests.
pub struct MemoryStore {
    dimension: usize,
    state: RwLock<State>,
    read_only: AtomicBool,
}

impl MemoryStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            state: RwLock::new(State::default()),
            read_only: AtomicBool::new(false),
        }
    }

    pub async fn insert_creator(&self, creator: Creator) {
        self.state.write().await.creators.insert(creator.id, creator);
    }

    pub async fn insert_event(&self, event: Event) {
        self.state.write().await.events.insert(event.id, event);
    }

    /// Rejects every write with [`StoreError::Other`] while set.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub async fn image_count(&self) -> usize {
        self.state.read().await.images.len()
    }

    pub async fn outbox(&self) -> Vec<ProjectionJob> {
        self.state.read().await.outbox.values().cloned().collect()
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(StoreError::Other("primary store is read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PrimaryStore for MemoryStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn get_creator(&self, id: Uuid) -> Result<Option<Creator>> {
        Ok(self.state.read().await.creators.get(&id).cloned())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        Ok(self.state.read().await.events.get(&id).cloned())
    }

    async fn insert_image(&self, image: NewImage) -> Result<(StoredImage, Vec<ProjectionJob>)> {
        ensure_vector(self.dimension, &image.embedding)?;
        self.check_writable()?;

        let mut state = self.state.write().await;
        if !state.creators.contains_key(&image.creator_id) {
            return Err(StoreError::NotFound(format!("creator {}", image.creator_id)));
        }
        if let Some(event_id) = image.event_id {
            if !state.events.contains_key(&event_id) {
                return Err(StoreError::NotFound(format!("event {event_id}")));
            }
        }

        let now = Utc::now();
        let stored = StoredImage {
            id: Uuid::new_v4(),
            object_id: image.object_id,
            description: image.description,
            bib_number: image.bib_number,
            plate_number: image.plate_number,
            embedding: Some(image.embedding),
            creator_id: image.creator_id,
            event_id: image.event_id,
            created_at: now,
            updated_at: now,
        };
        state.images.insert(stored.id, stored.clone());

        let mut jobs = vec![state.enqueue(ProjectionKind::Image, stored.id)];
        if let Some(event_id) = stored.event_id {
            jobs.push(state.enqueue(ProjectionKind::EventImageCount, event_id));
        }
        Ok((stored, jobs))
    }

    async fn get_image(&self, id: Uuid) -> Result<Option<StoredImage>> {
        Ok(self.state.read().await.images.get(&id).cloned())
    }

    async fn creator_images(
        &self,
        creator_id: Uuid,
        event_id: Option<Uuid>,
    ) -> Result<Vec<StoredImage>> {
        let state = self.state.read().await;
        let mut images: Vec<StoredImage> = state
            .images
            .values()
            .filter(|image| image.creator_id == creator_id)
            .filter(|image| event_id.is_none() || image.event_id == event_id)
            .cloned()
            .collect();
        images.sort_by(newest_first);
        Ok(images)
    }

    async fn event_images(
        &self,
        event_id: Uuid,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<StoredImage>> {
        let state = self.state.read().await;
        let mut images: Vec<&StoredImage> = state
            .images
            .values()
            .filter(|image| image.event_id == Some(event_id))
            .collect();
        images.sort_by(|a, b| newest_first(a, b));
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(images.into_iter().skip(skip).take(limit).cloned().collect())
    }

    async fn nearest_images(
        &self,
        event_id: Uuid,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<NeighborHit>> {
        ensure_vector(self.dimension, query)?;

        let state = self.state.read().await;
        let mut hits: Vec<NeighborHit> = state
            .images
            .values()
            .filter(|image| image.event_id == Some(event_id))
            .filter_map(|image| {
                let embedding = image.embedding.as_ref()?;
                Some(NeighborHit {
                    distance: cosine_distance(query, embedding),
                    image: image.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.image.id.cmp(&b.image.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count_event_images(&self, event_id: Uuid) -> Result<u64> {
        let state = self.state.read().await;
        let count = state
            .images
            .values()
            .filter(|image| image.event_id == Some(event_id))
            .count();
        Ok(count as u64)
    }

    async fn insert_variant(&self, variant: NewVariant) -> Result<StoredVariant> {
        self.check_writable()?;

        let mut state = self.state.write().await;
        if !state.images.contains_key(&variant.image_id) {
            return Err(StoreError::NotFound(format!("image {}", variant.image_id)));
        }
        let now = Utc::now();
        let stored = StoredVariant {
            id: Uuid::new_v4(),
            image_id: variant.image_id,
            object_id: variant.object_id,
            name: variant.name,
            description: variant.description,
            price: variant.price,
            created_at: now,
            updated_at: now,
        };
        state.variants.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_variant(&self, id: Uuid) -> Result<Option<StoredVariant>> {
        Ok(self.state.read().await.variants.get(&id).cloned())
    }

    async fn list_variants(&self, image_id: Uuid) -> Result<Vec<StoredVariant>> {
        let state = self.state.read().await;
        let mut variants: Vec<StoredVariant> = state
            .variants
            .values()
            .filter(|variant| variant.image_id == image_id)
            .cloned()
            .collect();
        variants.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(variants)
    }

    async fn update_variant(
        &self,
        variant_id: Uuid,
        creator_id: Uuid,
        patch: VariantPatch,
    ) -> Result<Option<StoredVariant>> {
        self.check_writable()?;

        let mut state = self.state.write().await;
        if !state.owned_variant(variant_id, creator_id) {
            return Ok(None);
        }
        let Some(variant) = state.variants.get_mut(&variant_id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            variant.name = name;
        }
        if let Some(description) = patch.description {
            variant.description = Some(description);
        }
        if let Some(price) = patch.price {
            variant.price = price;
        }
        variant.updated_at = Utc::now();
        Ok(Some(variant.clone()))
    }

    async fn delete_variant(
        &self,
        variant_id: Uuid,
        creator_id: Uuid,
    ) -> Result<Option<StoredVariant>> {
        self.check_writable()?;

        let mut state = self.state.write().await;
        if !state.owned_variant(variant_id, creator_id) {
            return Ok(None);
        }
        Ok(state.variants.remove(&variant_id))
    }

    async fn pending_projections(
        &self,
        max_attempts: i32,
        limit: usize,
    ) -> Result<Vec<ProjectionJob>> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .values()
            .filter(|job| job.attempts < max_attempts)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn complete_projection(&self, job_id: i64) -> Result<()> {
        self.state.write().await.outbox.remove(&job_id);
        Ok(())
    }

    async fn fail_projection(&self, job_id: i64, error: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let job = state
            .outbox
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(format!("projection job {job_id}")))?;
        job.attempts += 1;
        job.last_error = Some(error.to_string());
        Ok(())
    }

    async fn pending_projection_count(&self, max_attempts: i32) -> Result<u64> {
        let state = self.state.read().await;
        let count = state
            .outbox
            .values()
            .filter(|job| job.attempts < max_attempts)
            .count();
        Ok(count as u64)
    }
}

fn newest_first(a: &StoredImage, b: &StoredImage) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}
