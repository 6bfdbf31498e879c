//! Runs against a real Postgres with pgvector when `SHUTTER_TEST_DATABASE_URL` is set;
//! otherwise every test returns early.

use chrono::Utc;
use pretty_assertions::assert_eq;
use shutter_protocol::Price;
use shutter_vector_store::{NewImage, NewVariant, PgStore, PrimaryStore, ProjectionKind, StoreError};
use uuid::Uuid;

async fn store() -> Option<PgStore> {
    let url = std::env::var("SHUTTER_TEST_DATABASE_URL").ok()?;
    let store = PgStore::connect(&url, 2, 3).await.expect("connect");
    store.migrate().await.expect("migrate");
    Some(store)
}

async fn seed(store: &PgStore) -> (Uuid, Uuid) {
    let creator_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    sqlx::query("INSERT INTO creators (id, name, email) VALUES ($1, 'ana', $2)")
        .bind(creator_id)
        .bind(format!("{creator_id}@example.com"))
        .execute(store.pool())
        .await
        .expect("creator");
    sqlx::query(
        "INSERT INTO events (id, name, date, location, created_by) VALUES ($1, 'Run', $2, 'Porto', $3)",
    )
    .bind(event_id)
    .bind(Utc::now())
    .bind(creator_id)
    .execute(store.pool())
    .await
    .expect("event");
    (creator_id, event_id)
}

#[tokio::test]
async fn insert_and_nearest_round_trip() {
    let Some(store) = store().await else {
        return;
    };
    let (creator_id, event_id) = seed(&store).await;

    let mut ids = Vec::new();
    for embedding in [vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]] {
        let (image, jobs) = store
            .insert_image(NewImage {
                object_id: format!("images/{}", Uuid::new_v4()),
                description: Some("finish line".to_string()),
                bib_number: Some("1234".to_string()),
                plate_number: None,
                embedding,
                creator_id,
                event_id: Some(event_id),
            })
            .await
            .expect("insert");
        assert_eq!(jobs[0].kind, ProjectionKind::Image);
        assert_eq!(jobs[1].kind, ProjectionKind::EventImageCount);
        ids.push(image.id);
    }

    let hits = store
        .nearest_images(event_id, &[1.0, 0.0, 0.0], 10)
        .await
        .expect("nearest");
    assert_eq!(hits.iter().map(|h| h.image.id).collect::<Vec<_>>(), ids);
    assert!((hits[0].similarity() - 1.0).abs() < 1e-6);
    assert!(hits[1].similarity().abs() < 1e-6);
    assert_eq!(hits[0].image.embedding, Some(vec![1.0, 0.0, 0.0]));
    assert_eq!(store.count_event_images(event_id).await.expect("count"), 2);
}

#[tokio::test]
async fn listings_filter_by_owner_and_event() {
    let Some(store) = store().await else {
        return;
    };
    let (creator_id, event_id) = seed(&store).await;
    let image = |event_id: Option<Uuid>| NewImage {
        object_id: format!("images/{}", Uuid::new_v4()),
        description: None,
        bib_number: None,
        plate_number: None,
        embedding: vec![0.5, 0.5, 0.0],
        creator_id,
        event_id,
    };

    let (in_event, _) = store.insert_image(image(Some(event_id))).await.expect("insert");
    store.insert_image(image(None)).await.expect("insert");

    assert_eq!(store.creator_images(creator_id, None).await.expect("contents").len(), 2);
    let scoped = store
        .creator_images(creator_id, Some(event_id))
        .await
        .expect("contents");
    assert_eq!(scoped.iter().map(|i| i.id).collect::<Vec<_>>(), vec![in_event.id]);

    assert_eq!(store.event_images(event_id, 5, 0).await.expect("page").len(), 1);
    assert!(store.event_images(event_id, 5, 1).await.expect("page").is_empty());

    store
        .insert_variant(NewVariant {
            image_id: in_event.id,
            object_id: "variants/print".to_string(),
            name: "Print".to_string(),
            description: None,
            price: Price::from_cents(1200).expect("price"),
        })
        .await
        .expect("variant");
    let variants = store.list_variants(in_event.id).await.expect("variants");
    assert_eq!(variants.len(), 1);
    assert_eq!(variants[0].price.cents(), 1200);

    let err = store
        .nearest_images(event_id, &[0.0, 0.0, 0.0], 5)
        .await
        .expect_err("zero query");
    assert!(matches!(err, StoreError::InvalidVector(_)));
}
