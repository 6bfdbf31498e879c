//! # Shutter Indexer
//!
//! Turns an uploaded photo into a stored, similarity-queryable and searchable asset.
//!
//! ## Pipeline
//!
//! ```text
//! bytes
//!   │
//!   ├──> AttributeExtractor   best-effort, failures logged
//!   ├──> ImageEmbedder        required
//!   ├──> ObjectStore.put      required
//!   ├──> PrimaryStore         image row + outbox jobs, one transaction
//!   │      (insert failure ──> compensating blob delete)
//!   └──> Projector            search index writes, retried from the outbox
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use shutter_indexer::{IndexingCoordinator, IngestRequest};
//!
//! # async fn run(coordinator: IndexingCoordinator, bytes: Vec<u8>) -> shutter_indexer::Result<()> {
//! let image = coordinator
//!     .ingest(IngestRequest {
//!         image: bytes,
//!         creator_id: "5f0c6a8e-8a53-4b8e-9a0e-0c5a3c1f2d11".to_string(),
//!         event_id: None,
//!         description: Some("finish line".to_string()),
//!     })
//!     .await?;
//! println!("stored {} at {}", image.id, image.url);
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod error;
mod projector;
mod stats;

pub use coordinator::{
    CoordinatorConfig, IndexingCoordinator, IngestRequest, IngestWithVariants, VariantOutcome,
    VariantUpload, DEFAULT_GALLERY_LIMIT, MAX_GALLERY_LIMIT,
};
pub use error::{IndexerError, Result};
pub use projector::{Projector, ProjectorConfig};
pub use stats::DrainReport;
