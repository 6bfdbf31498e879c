use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchIndexError>;

#[derive(Error, Debug)]
pub enum SearchIndexError {
    #[error("Search engine returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Search engine transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Search engine unavailable: {0}")]
    Unavailable(String),
}

impl SearchIndexError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Http { status, .. } => *status == 404,
            _ => false,
        }
    }
}
