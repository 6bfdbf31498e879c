use crate::error::Result;
use crate::stats::DrainReport;
use serde_json::json;
use shutter_search_index::{Collection, EventDocument, ImageDocument, SearchIndex};
use shutter_vector_store::{PrimaryStore, ProjectionJob, ProjectionKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    /// Attempts after which a job is left in the outbox untouched.
    pub max_attempts: i32,
    pub batch_size: usize,
    pub interval: Duration,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            batch_size: 100,
            interval: Duration::from_secs(30),
        }
    }
}

/// Applies outbox jobs to the search index.
#[derive(Clone)]
pub struct Projector {
    store: Arc<dyn PrimaryStore>,
    index: SearchIndex,
    config: ProjectorConfig,
    failures: Arc<AtomicU64>,
}

impl Projector {
    pub fn new(store: Arc<dyn PrimaryStore>, index: SearchIndex, config: ProjectorConfig) -> Self {
        Self {
            store,
            index,
            config,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &ProjectorConfig {
        &self.config
    }

    /// Failed projection attempts since startup.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Jobs still eligible for another attempt.
    pub async fn pending(&self) -> Result<u64> {
        Ok(self
            .store
            .pending_projection_count(self.config.max_attempts)
            .await?)
    }

    /// Attempts every job once. Never fails: outcomes are recorded on the outbox.
    pub async fn project(&self, jobs: &[ProjectionJob]) -> DrainReport {
        let started = Instant::now();
        let mut report = DrainReport::new();

        for job in jobs {
            match self.apply(job).await {
                Ok(()) => match self.store.complete_projection(job.id).await {
                    Ok(()) => report.add_success(),
                    Err(err) => {
                        log::error!("Projection job {} applied but not completed: {err}", job.id);
                        report.add_failure(err.to_string());
                    }
                },
                Err(err) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        "Projection job {} ({} {}) failed on attempt {}: {err}",
                        job.id,
                        job.kind.as_str(),
                        job.entity_id,
                        job.attempts + 1
                    );
                    if let Err(store_err) = self.store.fail_projection(job.id, &err.to_string()).await
                    {
                        log::error!("Could not record failure of job {}: {store_err}", job.id);
                    }
                    report.add_failure(err.to_string());
                }
            }
        }

        report.time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        report
    }

    /// Projects one batch of pending jobs, oldest first.
    pub async fn drain(&self) -> Result<DrainReport> {
        let jobs = self
            .store
            .pending_projections(self.config.max_attempts, self.config.batch_size)
            .await?;
        if jobs.is_empty() {
            return Ok(DrainReport::new());
        }
        let report = self.project(&jobs).await;
        log::info!(
            "Projected {}/{} outbox jobs ({} failed)",
            report.projected,
            report.attempted,
            report.failed
        );
        Ok(report)
    }

    /// Drains batches until the outbox has nothing eligible left.
    ///
    /// Terminates because every failure consumes one of a job's bounded attempts.
    pub async fn catch_up(&self) -> Result<DrainReport> {
        let mut total = DrainReport::new();
        loop {
            let batch = self.drain().await?;
            if batch.attempted == 0 {
                return Ok(total);
            }
            total.merge(batch);
        }
    }

    /// Drains on a fixed interval until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        log::info!(
            "Projector started (interval {:?}, batch {}, max attempts {})",
            self.config.interval,
            self.config.batch_size,
            self.config.max_attempts
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.drain().await {
                        log::error!("Projector drain failed: {err}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::info!("Projector stopped");
    }

    async fn apply(&self, job: &ProjectionJob) -> Result<()> {
        match job.kind {
            ProjectionKind::Image => self.project_image(job.entity_id).await,
            ProjectionKind::EventImageCount => self.project_event_count(job.entity_id).await,
        }
    }

    async fn project_image(&self, image_id: Uuid) -> Result<()> {
        let Some(image) = self.store.get_image(image_id).await? else {
            log::debug!("Image {image_id} no longer exists; skipping projection");
            return Ok(());
        };

        let event_name = match image.event_id {
            Some(event_id) => self.store.get_event(event_id).await?.map(|e| e.name),
            None => None,
        };
        let creator_name = self
            .store
            .get_creator(image.creator_id)
            .await?
            .and_then(|c| c.label());

        let document = ImageDocument {
            id: image.id.to_string(),
            public_id: image.object_id.clone(),
            description: image.description.clone(),
            bib_number: image.bib_number.clone(),
            plate_number: image.plate_number.clone(),
            event_id: image.event_id.map(|id| id.to_string()),
            event_name,
            creator_id: image.creator_id.to_string(),
            creator_name,
            created_at: image.created_at.timestamp_millis(),
        };
        self.index.upsert(&document).await?;
        Ok(())
    }

    async fn project_event_count(&self, event_id: Uuid) -> Result<()> {
        let Some(event) = self.store.get_event(event_id).await? else {
            log::debug!("Event {event_id} no longer exists; skipping count refresh");
            return Ok(());
        };
        let count = self.store.count_event_images(event_id).await?;
        let image_count = u32::try_from(count).unwrap_or(u32::MAX);

        let id = event_id.to_string();
        match self
            .index
            .update(Collection::Events, &id, json!({ "imageCount": image_count }))
            .await
        {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => {
                // The event was never indexed; index it whole.
                let creator_name = self
                    .store
                    .get_creator(event.created_by)
                    .await?
                    .and_then(|c| c.label());
                let document = EventDocument::from_event(&event, creator_name, image_count);
                self.index.upsert(&document).await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for Projector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projector")
            .field("config", &self.config)
            .field("failures", &self.failure_count())
            .finish_non_exhaustive()
    }
}
