use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("No usable subject detected: {0}")]
    NoSubjectDetected(String),

    #[error("Image could not be decoded: {0}")]
    UndecodableImage(String),

    #[error("{provider} returned HTTP {status}: {body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed response from {provider}: {reason}")]
    MalformedResponse {
        provider: &'static str,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ProviderError {
    /// Expected provider outcomes that callers report as an empty result, not a failure.
    pub const fn is_soft_signal(&self) -> bool {
        matches!(self, Self::NoSubjectDetected(_) | Self::UndecodableImage(_))
    }

    pub(crate) fn malformed(provider: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider,
            reason: reason.into(),
        }
    }
}
