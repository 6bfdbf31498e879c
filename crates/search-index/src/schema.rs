use serde::{Deserialize, Serialize};

/// The three collections the marketplace keeps in the search engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Events,
    Creators,
    Images,
}

impl Collection {
    pub const ALL: [Self; 3] = [Self::Events, Self::Creators, Self::Images];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Creators => "creators",
            Self::Images => "images",
        }
    }

    /// Comma-separated text fields a query is matched against.
    #[must_use]
    pub const fn query_by(self) -> &'static str {
        match self {
            Self::Events => "name,description,location,creatorName",
            Self::Creators => "name,displayName,email,location,bio,photographyType",
            Self::Images => "description,bibNumber,plateNumber,eventName,creatorName",
        }
    }

    /// Explicit sort for paged searches; creators use engine relevance.
    #[must_use]
    pub const fn sort_by(self) -> Option<&'static str> {
        match self {
            Self::Events => Some("date:desc"),
            Self::Creators => None,
            Self::Images => Some("createdAt:desc"),
        }
    }

    #[must_use]
    pub fn schema(self) -> CollectionSchema {
        use FieldType::{Int32, Int64, Str};

        let (fields, default_sorting_field) = match self {
            Self::Events => (
                vec![
                    FieldSchema::new("id", Str),
                    FieldSchema::new("name", Str),
                    FieldSchema::new("description", Str).optional(),
                    FieldSchema::new("date", Int64),
                    FieldSchema::new("location", Str).facet(),
                    FieldSchema::new("creatorId", Str).facet(),
                    FieldSchema::new("creatorName", Str).optional(),
                    FieldSchema::new("imageCount", Int32),
                    FieldSchema::new("createdAt", Int64),
                ],
                "date",
            ),
            Self::Creators => (
                vec![
                    FieldSchema::new("id", Str),
                    FieldSchema::new("name", Str).optional(),
                    FieldSchema::new("displayName", Str).optional(),
                    FieldSchema::new("email", Str),
                    FieldSchema::new("photographyType", Str).optional().facet(),
                    FieldSchema::new("location", Str).optional().facet(),
                    FieldSchema::new("bio", Str).optional(),
                    FieldSchema::new("eventsCount", Int32),
                    FieldSchema::new("imagesCount", Int32),
                    FieldSchema::new("createdAt", Int64),
                ],
                "createdAt",
            ),
            Self::Images => (
                vec![
                    FieldSchema::new("id", Str),
                    FieldSchema::new("publicId", Str),
                    FieldSchema::new("description", Str).optional(),
                    FieldSchema::new("bibNumber", Str).optional().facet(),
                    FieldSchema::new("plateNumber", Str).optional().facet(),
                    FieldSchema::new("eventId", Str).optional().facet(),
                    FieldSchema::new("eventName", Str).optional(),
                    FieldSchema::new("creatorId", Str).facet(),
                    FieldSchema::new("creatorName", Str).optional(),
                    FieldSchema::new("createdAt", Int64),
                ],
                "createdAt",
            ),
        };

        CollectionSchema {
            name: self.name().to_string(),
            fields,
            default_sorting_field: default_sorting_field.to_string(),
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "string")]
    Str,
    #[serde(rename = "int32")]
    Int32,
    #[serde(rename = "int64")]
    Int64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub facet: bool,
}

impl FieldSchema {
    fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            optional: false,
            facet: false,
        }
    }

    fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    fn facet(mut self) -> Self {
        self.facet = true;
        self
    }
}

/// Collection definition in the engine's create-collection wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
    pub default_sorting_field: String,
}

impl CollectionSchema {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn schema_serializes_in_engine_shape() {
        let schema = Collection::Creators.schema();
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["name"], "creators");
        assert_eq!(value["default_sorting_field"], "createdAt");
        assert_eq!(
            value["fields"][4],
            json!({"name": "photographyType", "type": "string", "optional": true, "facet": true})
        );
        assert_eq!(value["fields"][0], json!({"name": "id", "type": "string"}));
    }

    #[test]
    fn query_fields_exist_in_schema() {
        for collection in Collection::ALL {
            let schema = collection.schema();
            for field in collection.query_by().split(',') {
                assert!(schema.field(field).is_some(), "{collection}: {field}");
            }
            assert!(schema.field(&schema.default_sorting_field).is_some());
        }
    }

    #[test]
    fn names_resolve_back() {
        assert_eq!(Collection::from_name("images"), Some(Collection::Images));
        assert_eq!(Collection::from_name("photos"), None);
    }
}
