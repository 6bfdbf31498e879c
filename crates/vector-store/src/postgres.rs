use crate::error::{Result, StoreError};
use crate::store::{ensure_vector, PrimaryStore};
use crate::types::{
    NeighborHit, NewImage, NewVariant, ProjectionJob, ProjectionKind, StoredImage, StoredVariant,
    VariantPatch,
};
use crate::vector::{parse_pg_vector, vector_to_pg};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shutter_protocol::{Creator, Event, PhotographyType, Price};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

const IMAGE_COLUMNS: &str = "id, object_id, description, bib_number, plate_number, \
     embedding::text AS embedding_text, creator_id, event_id, created_at, updated_at";

const VARIANT_COLUMNS: &str =
    "id, image_id, object_id, name, description, price_cents, created_at, updated_at";

const JOB_COLUMNS: &str = "id, kind, entity_id, attempts, last_error, created_at";

/// Postgres + pgvector backed [`PrimaryStore`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    dimension: usize,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32, dimension: usize) -> Result<Self> {
        log::info!("Connecting to primary store (max {max_connections} connections)");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self::from_pool(pool, dimension))
    }

    pub fn from_pool(pool: PgPool, dimension: usize) -> Self {
        Self { pool, dimension }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies bundled migrations. Safe to call on every start.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        log::debug!("Primary store migrations applied");
        Ok(())
    }

    async fn enqueue(
        tx: &mut Transaction<'_, Postgres>,
        kind: ProjectionKind,
        entity_id: Uuid,
    ) -> Result<ProjectionJob> {
        let sql = format!(
            "INSERT INTO projection_outbox (kind, entity_id) VALUES ($1, $2) RETURNING {JOB_COLUMNS}"
        );
        let row: JobRow = sqlx::query_as(&sql)
            .bind(kind.as_str())
            .bind(entity_id)
            .fetch_one(&mut **tx)
            .await?;
        row.into_job()
    }
}

#[derive(sqlx::FromRow)]
struct CreatorRow {
    id: Uuid,
    name: Option<String>,
    display_name: Option<String>,
    email: String,
    photography_type: Option<String>,
    location: Option<String>,
    bio: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CreatorRow> for Creator {
    fn from(row: CreatorRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            display_name: row.display_name,
            email: row.email,
            photography_type: row.photography_type.as_deref().and_then(PhotographyType::parse),
            location: row.location,
            bio: row.bio,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    date: DateTime<Utc>,
    location: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            date: row.date,
            location: row.location,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: Uuid,
    object_id: String,
    description: Option<String>,
    bib_number: Option<String>,
    plate_number: Option<String>,
    embedding_text: Option<String>,
    creator_id: Uuid,
    event_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ImageRow {
    fn into_image(self) -> Result<StoredImage> {
        let embedding = self.embedding_text.as_deref().map(parse_pg_vector).transpose()?;
        Ok(StoredImage {
            id: self.id,
            object_id: self.object_id,
            description: self.description,
            bib_number: self.bib_number,
            plate_number: self.plate_number,
            embedding,
            creator_id: self.creator_id,
            event_id: self.event_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NeighborRow {
    #[sqlx(flatten)]
    image: ImageRow,
    distance: f64,
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: Uuid,
    image_id: Uuid,
    object_id: String,
    name: String,
    description: Option<String>,
    price_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VariantRow {
    fn into_variant(self) -> Result<StoredVariant> {
        let price = Price::from_cents(self.price_cents)
            .map_err(|err| StoreError::Other(format!("variant {}: {err}", self.id)))?;
        Ok(StoredVariant {
            id: self.id,
            image_id: self.image_id,
            object_id: self.object_id,
            name: self.name,
            description: self.description,
            price,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    kind: String,
    entity_id: Uuid,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> Result<ProjectionJob> {
        let kind = ProjectionKind::parse(&self.kind).ok_or_else(|| {
            StoreError::Other(format!("unknown projection kind '{}' on job {}", self.kind, self.id))
        })?;
        Ok(ProjectionJob {
            id: self.id,
            kind,
            entity_id: self.entity_id,
            attempts: self.attempts,
            last_error: self.last_error,
            created_at: self.created_at,
        })
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl PrimaryStore for PgStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn get_creator(&self, id: Uuid) -> Result<Option<Creator>> {
        let row: Option<CreatorRow> = sqlx::query_as(
            "SELECT id, name, display_name, email, photography_type, location, bio, created_at \
             FROM creators WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Creator::from))
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>> {
        let row: Option<EventRow> = sqlx::query_as(
            "SELECT id, name, description, date, location, created_by, created_at \
             FROM events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Event::from))
    }

    async fn insert_image(&self, image: NewImage) -> Result<(StoredImage, Vec<ProjectionJob>)> {
        ensure_vector(self.dimension, &image.embedding)?;

        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO images \
             (id, object_id, description, bib_number, plate_number, embedding, creator_id, event_id) \
             VALUES ($1, $2, $3, $4, $5, $6::text::vector, $7, $8) \
             RETURNING {IMAGE_COLUMNS}"
        );
        let row: ImageRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(&image.object_id)
            .bind(&image.description)
            .bind(&image.bib_number)
            .bind(&image.plate_number)
            .bind(vector_to_pg(&image.embedding))
            .bind(image.creator_id)
            .bind(image.event_id)
            .fetch_one(&mut *tx)
            .await?;
        let stored = row.into_image()?;

        let mut jobs = vec![Self::enqueue(&mut tx, ProjectionKind::Image, stored.id).await?];
        if let Some(event_id) = stored.event_id {
            jobs.push(Self::enqueue(&mut tx, ProjectionKind::EventImageCount, event_id).await?);
        }

        tx.commit().await?;
        log::debug!("Inserted image {} with {} projection jobs", stored.id, jobs.len());
        Ok((stored, jobs))
    }

    async fn get_image(&self, id: Uuid) -> Result<Option<StoredImage>> {
        let sql = format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1");
        let row: Option<ImageRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ImageRow::into_image).transpose()
    }

    async fn creator_images(
        &self,
        creator_id: Uuid,
        event_id: Option<Uuid>,
    ) -> Result<Vec<StoredImage>> {
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images \
             WHERE creator_id = $1 AND ($2::uuid IS NULL OR event_id = $2) \
             ORDER BY created_at DESC, id ASC"
        );
        let rows: Vec<ImageRow> = sqlx::query_as(&sql)
            .bind(creator_id)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ImageRow::into_image).collect()
    }

    async fn event_images(
        &self,
        event_id: Uuid,
        limit: usize,
        offset: u64,
    ) -> Result<Vec<StoredImage>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE event_id = $1 \
             ORDER BY created_at DESC, id ASC LIMIT $2 OFFSET $3"
        );
        let rows: Vec<ImageRow> = sqlx::query_as(&sql)
            .bind(event_id)
            .bind(to_i64(limit))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ImageRow::into_image).collect()
    }

    async fn nearest_images(
        &self,
        event_id: Uuid,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<NeighborHit>> {
        ensure_vector(self.dimension, query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {IMAGE_COLUMNS}, (embedding <=> $2::text::vector)::float8 AS distance \
             FROM images \
             WHERE event_id = $1 AND embedding IS NOT NULL \
             ORDER BY embedding <=> $2::text::vector ASC, id ASC \
             LIMIT $3"
        );
        let rows: Vec<NeighborRow> = sqlx::query_as(&sql)
            .bind(event_id)
            .bind(vector_to_pg(query))
            .bind(to_i64(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(NeighborHit {
                    image: row.image.into_image()?,
                    distance: row.distance,
                })
            })
            .collect()
    }

    async fn count_event_images(&self, event_id: Uuid) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert_variant(&self, variant: NewVariant) -> Result<StoredVariant> {
        let sql = format!(
            "INSERT INTO variants (id, image_id, object_id, name, description, price_cents) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {VARIANT_COLUMNS}"
        );
        let row: VariantRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(variant.image_id)
            .bind(&variant.object_id)
            .bind(&variant.name)
            .bind(&variant.description)
            .bind(variant.price.cents())
            .fetch_one(&self.pool)
            .await?;
        row.into_variant()
    }

    async fn get_variant(&self, id: Uuid) -> Result<Option<StoredVariant>> {
        let sql = format!("SELECT {VARIANT_COLUMNS} FROM variants WHERE id = $1");
        let row: Option<VariantRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(VariantRow::into_variant).transpose()
    }

    async fn list_variants(&self, image_id: Uuid) -> Result<Vec<StoredVariant>> {
        let sql = format!(
            "SELECT {VARIANT_COLUMNS} FROM variants WHERE image_id = $1 ORDER BY created_at ASC, id ASC"
        );
        let rows: Vec<VariantRow> = sqlx::query_as(&sql)
            .bind(image_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(VariantRow::into_variant).collect()
    }

    async fn update_variant(
        &self,
        variant_id: Uuid,
        creator_id: Uuid,
        patch: VariantPatch,
    ) -> Result<Option<StoredVariant>> {
        let row: Option<VariantRow> = sqlx::query_as(
            "UPDATE variants AS v SET \
                 name = COALESCE($3, v.name), \
                 description = COALESCE($4, v.description), \
                 price_cents = COALESCE($5, v.price_cents), \
                 updated_at = NOW() \
             FROM images AS i \
             WHERE v.id = $1 AND v.image_id = i.id AND i.creator_id = $2 \
             RETURNING v.id, v.image_id, v.object_id, v.name, v.description, v.price_cents, \
                 v.created_at, v.updated_at",
        )
        .bind(variant_id)
        .bind(creator_id)
        .bind(patch.name)
        .bind(patch.description)
        .bind(patch.price.map(Price::cents))
        .fetch_optional(&self.pool)
        .await?;
        row.map(VariantRow::into_variant).transpose()
    }

    async fn delete_variant(
        &self,
        variant_id: Uuid,
        creator_id: Uuid,
    ) -> Result<Option<StoredVariant>> {
        let row: Option<VariantRow> = sqlx::query_as(
            "DELETE FROM variants AS v USING images AS i \
             WHERE v.id = $1 AND v.image_id = i.id AND i.creator_id = $2 \
             RETURNING v.id, v.image_id, v.object_id, v.name, v.description, v.price_cents, \
                 v.created_at, v.updated_at",
        )
        .bind(variant_id)
        .bind(creator_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(VariantRow::into_variant).transpose()
    }

    async fn pending_projections(
        &self,
        max_attempts: i32,
        limit: usize,
    ) -> Result<Vec<ProjectionJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM projection_outbox \
             WHERE attempts < $1 ORDER BY id ASC LIMIT $2"
        );
        let rows: Vec<JobRow> = sqlx::query_as(&sql)
            .bind(max_attempts)
            .bind(to_i64(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn complete_projection(&self, job_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM projection_outbox WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail_projection(&self, job_id: i64, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE projection_outbox SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("projection job {job_id}")));
        }
        Ok(())
    }

    async fn pending_projection_count(&self, max_attempts: i32) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM projection_outbox WHERE attempts < $1")
                .bind(max_attempts)
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
