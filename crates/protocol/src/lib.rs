//! Shared records exchanged between the shutter crates and the HTTP API.
//!
//! Object-store references (`object_id`) never appear in the `*View` types: views carry a
//! signed retrieval URL instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod price;

pub use price::{Price, PriceError};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotographyType {
    Marathon,
    Wildlife,
    Motorsports,
}

impl PhotographyType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Marathon => "Marathon",
            Self::Wildlife => "Wildlife",
            Self::Motorsports => "Motorsports",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "marathon" => Some(Self::Marathon),
            "wildlife" => Some(Self::Wildlife),
            "motorsports" => Some(Self::Motorsports),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub id: Uuid,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub email: String,
    pub photography_type: Option<PhotographyType>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Creator {
    pub fn summary(&self) -> CreatorSummary {
        CreatorSummary {
            id: self.id,
            name: self.name.clone(),
            display_name: self.display_name.clone(),
        }
    }

    /// Name used in denormalized search documents.
    pub fn label(&self) -> Option<String> {
        self.display_name
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.name.clone().filter(|s| !s.trim().is_empty()))
    }
}

/// Public creator fields attached to similarity hits.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreatorSummary {
    pub id: Uuid,
    pub name: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub location: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    pub id: Uuid,
    pub url: String,
    pub description: Option<String>,
    pub bib_number: Option<String>,
    pub plate_number: Option<String>,
    pub creator_id: Uuid,
    pub event_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VariantView {
    pub id: Uuid,
    pub image_id: Uuid,
    pub url: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub created_at: DateTime<Utc>,
}

/// Image as its owner sees it, with every purchasable variant.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageWithVariants {
    #[serde(flatten)]
    pub image: ImageView,
    pub variants: Vec<VariantView>,
}

/// One page of an event's public gallery. `page` is 1-based.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryPage {
    pub images: Vec<ImageView>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}
