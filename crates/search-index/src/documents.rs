use crate::schema::Collection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shutter_protocol::{Creator, Event};

/// A record that lives in exactly one collection, keyed by its primary-store id.
pub trait SearchDocument: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDocument {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unix milliseconds.
    pub date: i64,
    pub location: String,
    pub creator_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_name: Option<String>,
    pub image_count: u32,
    pub created_at: i64,
}

impl EventDocument {
    pub fn from_event(event: &Event, creator_name: Option<String>, image_count: u32) -> Self {
        Self {
            id: event.id.to_string(),
            name: event.name.clone(),
            description: event.description.clone(),
            date: event.date.timestamp_millis(),
            location: event.location.clone(),
            creator_id: event.created_by.to_string(),
            creator_name,
            image_count,
            created_at: event.created_at.timestamp_millis(),
        }
    }
}

impl SearchDocument for EventDocument {
    const COLLECTION: Collection = Collection::Events;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photography_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub events_count: u32,
    pub images_count: u32,
    pub created_at: i64,
}

impl CreatorDocument {
    pub fn from_creator(creator: &Creator, events_count: u32, images_count: u32) -> Self {
        Self {
            id: creator.id.to_string(),
            name: creator.name.clone(),
            display_name: creator.display_name.clone(),
            email: creator.email.clone(),
            photography_type: creator.photography_type.map(|t| t.as_str().to_string()),
            location: creator.location.clone(),
            bio: creator.bio.clone(),
            events_count,
            images_count,
            created_at: creator.created_at.timestamp_millis(),
        }
    }
}

impl SearchDocument for CreatorDocument {
    const COLLECTION: Collection = Collection::Creators;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDocument {
    pub id: String,
    /// Object store reference of the image.
    pub public_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bib_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    pub creator_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_name: Option<String>,
    pub created_at: i64,
}

impl SearchDocument for ImageDocument {
    const COLLECTION: Collection = Collection::Images;

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use shutter_protocol::PhotographyType;
    use uuid::Uuid;

    #[test]
    fn event_document_uses_unix_millis() {
        let event = Event {
            id: Uuid::nil(),
            name: "Harbour 10k".to_string(),
            description: None,
            date: Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap(),
            location: "Porto".to_string(),
            created_by: Uuid::nil(),
            created_at: Utc.timestamp_millis_opt(1_000).unwrap(),
        };
        let doc = EventDocument::from_event(&event, Some("Rui".to_string()), 4);
        assert_eq!(doc.date, 1_777_593_600_000);
        assert_eq!(doc.created_at, 1_000);

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["imageCount"], 4);
        assert_eq!(value["creatorName"], "Rui");
        assert!(value.get("description").is_none());
    }

    #[test]
    fn creator_document_renders_photography_type() {
        let creator = Creator {
            id: Uuid::nil(),
            name: None,
            display_name: Some("Wild Lens".to_string()),
            email: "lens@example.com".to_string(),
            photography_type: Some(PhotographyType::Wildlife),
            location: None,
            bio: None,
            created_at: Utc.timestamp_millis_opt(5).unwrap(),
        };
        let doc = CreatorDocument::from_creator(&creator, 2, 9);
        assert_eq!(doc.photography_type.as_deref(), Some("Wildlife"));
        assert_eq!(<CreatorDocument as SearchDocument>::COLLECTION, Collection::Creators);
    }
}
