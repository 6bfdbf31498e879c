use shutter_providers::ProviderError;
use shutter_search_index::SearchIndexError;
use shutter_vector_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Search index error: {0}")]
    SearchIndexError(#[from] SearchIndexError),
}
