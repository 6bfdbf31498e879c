//! # Shutter Vector Store
//!
//! Primary store for creators, events, images and variants, with cosine nearest-neighbor
//! search over image embeddings.
//!
//! ## Architecture
//!
//! ```text
//! PrimaryStore (trait)
//!     │
//!     ├──> PgStore      Postgres + pgvector, `<=>` cosine distance
//!     │
//!     └──> MemoryStore  brute-force cosine, local runs and tests
//!
//! insert_image ──> images row + projection_outbox rows (one transaction)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use shutter_vector_store::{PgStore, PrimaryStore};
//! use uuid::Uuid;
//!
//! # async fn run(event_id: Uuid, query: Vec<f32>) -> shutter_vector_store::Result<()> {
//! let store = PgStore::connect("postgres://localhost/shutter", 8, 1024).await?;
//! store.migrate().await?;
//!
//! for hit in store.nearest_images(event_id, &query, 10).await? {
//!     println!("{}: {:.3}", hit.image.id, hit.similarity());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod memory;
mod postgres;
mod store;
mod types;
mod vector;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::PrimaryStore;
pub use types::{
    NeighborHit, NewImage, NewVariant, ProjectionJob, ProjectionKind, StoredImage, StoredVariant,
    VariantPatch,
};
pub use vector::{cosine_distance, cosine_similarity, parse_pg_vector, vector_to_pg};
