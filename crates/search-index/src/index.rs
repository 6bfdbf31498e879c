use crate::documents::SearchDocument;
use crate::engine::{EngineQuery, EngineResults, ImportAction, ImportReport, SearchEngine};
use crate::error::Result;
use crate::schema::Collection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Maximum documents per bulk import request.
pub const IMPORT_CHUNK_SIZE: usize = 1000;

/// Result of [`SearchIndex::ensure_collections`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub created: Vec<Collection>,
    pub existing: Vec<Collection>,
    pub failed: Vec<(Collection, String)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub number_of_documents: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub events: CollectionStats,
    pub creators: CollectionStats,
    pub images: CollectionStats,
}

/// Typed writer and reader over a [`SearchEngine`].
#[derive(Clone)]
pub struct SearchIndex {
    engine: Arc<dyn SearchEngine>,
}

impl SearchIndex {
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn SearchEngine> {
        &self.engine
    }

    /// Creates each missing collection. Idempotent.
    ///
    /// Lookup failures other than "not found" are logged and the collection is skipped so an
    /// unhealthy engine never blocks startup.
    pub async fn ensure_collections(&self) -> ProvisionReport {
        let mut report = ProvisionReport::default();
        for collection in Collection::ALL {
            match self.engine.retrieve_collection(collection.name()).await {
                Ok(_) => {
                    log::info!("Collection '{collection}' already exists");
                    report.existing.push(collection);
                }
                Err(err) if err.is_not_found() => {
                    match self.engine.create_collection(&collection.schema()).await {
                        Ok(()) => {
                            log::info!("Created collection '{collection}'");
                            report.created.push(collection);
                        }
                        Err(err) => {
                            log::error!("Failed to create collection '{collection}': {err}");
                            report.failed.push((collection, err.to_string()));
                        }
                    }
                }
                Err(err) => {
                    log::error!("Error checking collection '{collection}': {err}");
                    report.failed.push((collection, err.to_string()));
                }
            }
        }
        report
    }

    pub async fn upsert<D: SearchDocument>(&self, document: &D) -> Result<()> {
        let value = serde_json::to_value(document)?;
        self.engine
            .upsert_document(D::COLLECTION.name(), value)
            .await
    }

    /// Bulk upsert in chunks of [`IMPORT_CHUNK_SIZE`]. Per-document failures are logged and
    /// reported; a failed request aborts the remaining chunks.
    pub async fn upsert_many<D: SearchDocument>(&self, documents: &[D]) -> Result<ImportReport> {
        let collection = D::COLLECTION;
        let mut report = ImportReport::default();
        for chunk in documents.chunks(IMPORT_CHUNK_SIZE) {
            let values = chunk
                .iter()
                .map(serde_json::to_value)
                .collect::<std::result::Result<Vec<Value>, _>>()?;
            let chunk_report = self
                .engine
                .import_documents(collection.name(), values, ImportAction::Upsert)
                .await?;
            if chunk_report.failed > 0 {
                log::warn!(
                    "Import into '{collection}': {} of {} documents failed",
                    chunk_report.failed,
                    chunk.len()
                );
            }
            report.merge(chunk_report);
        }
        log::debug!(
            "Imported {} documents into '{collection}' ({} failed)",
            report.imported,
            report.failed
        );
        Ok(report)
    }

    /// Merges `partial` into an existing document.
    pub async fn update(&self, collection: Collection, id: &str, partial: Value) -> Result<()> {
        self.engine
            .update_document(collection.name(), id, partial)
            .await
    }

    /// Removes a document; an absent document is not an error.
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        match self.engine.delete_document(collection.name(), id).await {
            Err(err) if err.is_not_found() => {
                log::debug!("Document '{id}' already absent from '{collection}'");
                Ok(())
            }
            other => other,
        }
    }

    pub async fn search(&self, collection: Collection, query: &EngineQuery) -> Result<EngineResults> {
        self.engine.search(collection.name(), query).await
    }

    /// Drops all collections and provisions them again.
    pub async fn reset(&self) -> ProvisionReport {
        for collection in Collection::ALL {
            match self.engine.delete_collection(collection.name()).await {
                Ok(()) => log::info!("Deleted collection '{collection}'"),
                Err(err) => log::warn!("Could not delete collection '{collection}': {err}"),
            }
        }
        self.ensure_collections().await
    }

    /// Document counts per collection, fetched concurrently. Unavailable collections count 0.
    pub async fn stats(&self) -> IndexStats {
        let (events, creators, images) = tokio::join!(
            self.count(Collection::Events),
            self.count(Collection::Creators),
            self.count(Collection::Images),
        );
        IndexStats {
            events,
            creators,
            images,
        }
    }

    async fn count(&self, collection: Collection) -> CollectionStats {
        match self.engine.retrieve_collection(collection.name()).await {
            Ok(info) => CollectionStats {
                number_of_documents: info.num_documents,
            },
            Err(err) => {
                log::error!("Error getting stats for '{collection}': {err}");
                CollectionStats::default()
            }
        }
    }
}
