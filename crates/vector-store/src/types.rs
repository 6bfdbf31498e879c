use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shutter_protocol::{ImageView, Price, VariantView};
use uuid::Uuid;

/// Image row ready for insertion. The embedding is mandatory: an image is never stored
/// without its vector.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub object_id: String,
    pub description: Option<String>,
    pub bib_number: Option<String>,
    pub plate_number: Option<String>,
    pub embedding: Vec<f32>,
    pub creator_id: Uuid,
    pub event_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    pub id: Uuid,
    pub object_id: String,
    pub description: Option<String>,
    pub bib_number: Option<String>,
    pub plate_number: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub creator_id: Uuid,
    pub event_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredImage {
    /// Public projection; `url` is resolved by the caller from `object_id`.
    pub fn to_view(&self, url: String) -> ImageView {
        ImageView {
            id: self.id,
            url,
            description: self.description.clone(),
            bib_number: self.bib_number.clone(),
            plate_number: self.plate_number.clone(),
            creator_id: self.creator_id,
            event_id: self.event_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// One nearest-neighbor match. `distance` is cosine distance as computed by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborHit {
    pub image: StoredImage,
    pub distance: f64,
}

impl NeighborHit {
    #[must_use]
    pub fn similarity(&self) -> f64 {
        1.0 - self.distance
    }
}

#[derive(Debug, Clone)]
pub struct NewVariant {
    pub image_id: Uuid,
    pub object_id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVariant {
    pub id: Uuid,
    pub image_id: Uuid,
    pub object_id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Price,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredVariant {
    pub fn to_view(&self, url: String) -> VariantView {
        VariantView {
            id: self.id,
            image_id: self.image_id,
            url,
            name: self.name.clone(),
            description: self.description.clone(),
            price: self.price,
            created_at: self.created_at,
        }
    }
}

/// Partial variant update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
}

impl VariantPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.price.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionKind {
    /// Upsert the image document into the search index.
    Image,
    /// Refresh the image count on the event document.
    EventImageCount,
}

impl ProjectionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::EventImageCount => "event_image_count",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "image" => Some(Self::Image),
            "event_image_count" => Some(Self::EventImageCount),
            _ => None,
        }
    }
}

/// Outbox entry describing a search-index write that still has to happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionJob {
    pub id: i64,
    pub kind: ProjectionKind,
    pub entity_id: Uuid,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn projection_kind_round_trips_through_text() {
        for kind in [ProjectionKind::Image, ProjectionKind::EventImageCount] {
            assert_eq!(ProjectionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ProjectionKind::parse("creator"), None);
    }

    #[test]
    fn similarity_is_one_minus_distance() {
        let now = Utc::now();
        let hit = NeighborHit {
            image: StoredImage {
                id: Uuid::nil(),
                object_id: "images/a".to_string(),
                description: None,
                bib_number: None,
                plate_number: None,
                embedding: None,
                creator_id: Uuid::nil(),
                event_id: None,
                created_at: now,
                updated_at: now,
            },
            distance: 0.25,
        };
        assert_eq!(hit.similarity(), 0.75);
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(VariantPatch::default().is_empty());
        assert!(!VariantPatch {
            price: Some(Price::from_cents(100).unwrap()),
            ..VariantPatch::default()
        }
        .is_empty());
    }
}
