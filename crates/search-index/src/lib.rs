//! # Shutter Search Index
//!
//! Denormalized, eventually consistent projection of the primary store into a full-text
//! search engine.
//!
//! ```text
//! SearchIndex (typed: documents, chunked import, provisioning, stats)
//!     │
//!     └──> dyn SearchEngine
//!            ├──> TypesenseClient  HTTP, X-TYPESENSE-API-KEY
//!            └──> MemoryEngine     in-process, tests and local runs
//! ```
//!
//! Collections and their schemas are fixed: see [`Collection`].

mod documents;
mod engine;
mod error;
mod index;
mod memory;
mod schema;
mod typesense;

pub use documents::{CreatorDocument, EventDocument, ImageDocument, SearchDocument};
pub use engine::{
    CollectionInfo, EngineQuery, EngineResults, ImportAction, ImportReport, SearchEngine,
    MATCH_ALL,
};
pub use error::{Result, SearchIndexError};
pub use index::{
    CollectionStats, IndexStats, ProvisionReport, SearchIndex, IMPORT_CHUNK_SIZE,
};
pub use memory::MemoryEngine;
pub use schema::{Collection, CollectionSchema, FieldSchema, FieldType};
pub use typesense::{parse_import_response, TypesenseClient, TypesenseConfig};
