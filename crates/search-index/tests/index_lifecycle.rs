use pretty_assertions::assert_eq;
use shutter_search_index::{
    Collection, EngineQuery, ImageDocument, MemoryEngine, SearchIndex, IMPORT_CHUNK_SIZE,
};
use std::sync::Arc;

fn image(id: usize) -> ImageDocument {
    ImageDocument {
        id: format!("img-{id:05}"),
        public_id: format!("images/{id}"),
        description: Some("finish line sprint".to_string()),
        bib_number: Some(id.to_string()),
        plate_number: None,
        event_id: Some("event-1".to_string()),
        event_name: Some("Harbour 10k".to_string()),
        creator_id: "creator-1".to_string(),
        creator_name: Some("Rui".to_string()),
        created_at: i64::try_from(id).expect("fits"),
    }
}

#[tokio::test]
async fn provisioning_is_idempotent() {
    let index = SearchIndex::new(Arc::new(MemoryEngine::new()));

    let first = index.ensure_collections().await;
    assert_eq!(first.created, Collection::ALL.to_vec());

    let second = index.ensure_collections().await;
    assert!(second.created.is_empty());
    assert_eq!(second.existing, Collection::ALL.to_vec());
    assert!(second.failed.is_empty());
}

#[tokio::test]
async fn unhealthy_engine_does_not_block_provisioning() {
    let engine = Arc::new(MemoryEngine::new());
    engine.set_unavailable(true);
    let index = SearchIndex::new(engine);

    let report = index.ensure_collections().await;
    assert_eq!(report.failed.len(), 3);
    assert_eq!(index.stats().await.images.number_of_documents, 0);
}

#[tokio::test]
async fn upsert_replaces_by_id_and_delete_is_idempotent() {
    let index = SearchIndex::new(Arc::new(MemoryEngine::new()));
    index.ensure_collections().await;

    let mut doc = image(1);
    index.upsert(&doc).await.expect("upsert");
    doc.description = Some("medal ceremony".to_string());
    index.upsert(&doc).await.expect("upsert again");
    assert_eq!(index.stats().await.images.number_of_documents, 1);

    let results = index
        .search(
            Collection::Images,
            &EngineQuery::new("medal", Collection::Images.query_by()),
        )
        .await
        .expect("search");
    assert_eq!(results.found, 1);

    index.delete(Collection::Images, &doc.id).await.expect("delete");
    index
        .delete(Collection::Images, &doc.id)
        .await
        .expect("delete absent");
    assert_eq!(index.stats().await.images.number_of_documents, 0);
}

#[tokio::test]
async fn bulk_import_spans_chunks() {
    let index = SearchIndex::new(Arc::new(MemoryEngine::new()));
    index.ensure_collections().await;

    let documents: Vec<ImageDocument> = (0..IMPORT_CHUNK_SIZE + 5).map(image).collect();
    let report = index.upsert_many(&documents).await.expect("import");
    assert_eq!(report.imported, IMPORT_CHUNK_SIZE + 5);
    assert_eq!(report.failed, 0);

    let stats = index.stats().await;
    assert_eq!(stats.images.number_of_documents, (IMPORT_CHUNK_SIZE + 5) as u64);
    assert_eq!(stats.events.number_of_documents, 0);
}

#[tokio::test]
async fn reset_recreates_empty_collections() {
    let index = SearchIndex::new(Arc::new(MemoryEngine::new()));
    index.ensure_collections().await;
    index.upsert(&image(7)).await.expect("upsert");

    let report = index.reset().await;
    assert_eq!(report.created.len(), 3);
    assert_eq!(index.stats().await.images.number_of_documents, 0);
}
