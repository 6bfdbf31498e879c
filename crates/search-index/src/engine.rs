use crate::error::Result;
use crate::schema::CollectionSchema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query text the engine treats as "match every document".
pub const MATCH_ALL: &str = "*";

/// Engine-level query, already translated from the public API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineQuery {
    pub q: String,
    pub query_by: String,
    pub filter_by: Option<String>,
    pub sort_by: Option<String>,
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
}

impl EngineQuery {
    pub fn new(q: impl Into<String>, query_by: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            query_by: query_by.into(),
            filter_by: None,
            sort_by: None,
            page: 1,
            per_page: 10,
        }
    }

    #[must_use]
    pub fn is_match_all(&self) -> bool {
        self.q.trim() == MATCH_ALL
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineResults {
    pub found: u64,
    pub hits: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub num_documents: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportAction {
    Create,
    Upsert,
    Update,
}

impl ImportAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Upsert => "upsert",
            Self::Update => "update",
        }
    }
}

/// Outcome of a bulk import. Per-document failures are counted, not raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    pub fn merge(&mut self, other: Self) {
        self.imported += other.imported;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}

/// Wire-level operations of a full-text search engine.
///
/// Missing collections and documents surface as errors for which
/// [`crate::SearchIndexError::is_not_found`] holds.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn retrieve_collection(&self, name: &str) -> Result<CollectionInfo>;

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()>;

    async fn delete_collection(&self, name: &str) -> Result<()>;

    async fn upsert_document(&self, collection: &str, document: Value) -> Result<()>;

    async fn update_document(&self, collection: &str, id: &str, partial: Value) -> Result<()>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()>;

    async fn import_documents(
        &self,
        collection: &str,
        documents: Vec<Value>,
        action: ImportAction,
    ) -> Result<ImportReport>;

    async fn search(&self, collection: &str, query: &EngineQuery) -> Result<EngineResults>;
}
