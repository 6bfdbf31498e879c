//! # Shutter Providers
//!
//! Narrow adapters over the external collaborators of the ingestion pipeline.
//!
//! ```text
//! bytes ──> ObjectStore        ──> object id + retrieval URL
//!       ──> ImageEmbedder      ──> Vec<f32> (fixed dimension per provider)
//!       ──> AttributeExtractor ──> bib / plate numbers (best-effort)
//! ```
//!
//! Every adapter is an `async_trait` object so callers hold `Arc<dyn Trait>` and tests can
//! substitute fakes.

mod cloudinary;
mod embeddings;
mod error;
mod extraction;
mod face;
mod jina;
mod memory;
mod object_store;
mod source;

pub use cloudinary::{CloudinaryConfig, CloudinaryStore};
pub use embeddings::{ImageEmbedder, StubEmbedder};
pub use error::{ProviderError, Result};
pub use extraction::{
    parse_attributes, AttributeExtractor, ExtractedAttributes, NoopExtractor, VisionConfig,
    VisionExtractor,
};
pub use face::{classify_face_error, FaceConfig, FaceEmbedder};
pub use jina::{JinaConfig, JinaEmbedder, DEFAULT_JINA_DIMENSION, DEFAULT_JINA_MODEL};
pub use memory::MemoryObjectStore;
pub use object_store::{ObjectStore, StoredObject, DEFAULT_SIGNED_URL_TTL};
pub use source::{decode_base64_image, sniff_mime, strip_data_uri_prefix, ImageSource};

use std::time::Duration;

/// Shared client for AI providers and the object store.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("shutter/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Into::into)
}
