use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use pretty_assertions::assert_eq;
use shutter_protocol::{Creator, Event};
use shutter_providers::{ImageEmbedder, ImageSource, MemoryObjectStore, ProviderError};
use shutter_search::{SearchError, SimilarityConfig, SimilaritySearch};
use shutter_vector_store::{MemoryStore, NewImage, PrimaryStore};
use std::sync::Arc;
use uuid::Uuid;

/// Embedder whose behaviour is picked by the first byte of the query image.
struct ScriptedEmbedder;

#[async_trait]
impl ImageEmbedder for ScriptedEmbedder {
    fn model_id(&self) -> &str {
        "scripted"
    }

    fn dimension(&self) -> usize {
        3
    }

    async fn embed(&self, image: &ImageSource) -> shutter_providers::Result<Vec<f32>> {
        let ImageSource::Bytes { data, .. } = image else {
            return Err(ProviderError::InvalidInput("expected bytes".to_string()));
        };
        match data.first() {
            Some(b'x') => Ok(vec![1.0, 0.0, 0.0]),
            Some(b'y') => Ok(vec![0.0, 1.0, 0.0]),
            Some(b'n') => Err(ProviderError::NoSubjectDetected(
                "Face could not be detected in numpy array".to_string(),
            )),
            Some(b'u') => Err(ProviderError::UndecodableImage(
                "cannot identify image file".to_string(),
            )),
            _ => Err(ProviderError::Http {
                provider: "scripted",
                status: 500,
                body: "boom".to_string(),
            }),
        }
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    search: SimilaritySearch,
    creator_id: Uuid,
    event_id: Uuid,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new(3));
    let creator_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    store
        .insert_creator(Creator {
            id: creator_id,
            name: Some("ines".to_string()),
            display_name: Some("Ines Photo".to_string()),
            email: "ines@example.com".to_string(),
            photography_type: None,
            location: None,
            bio: None,
            created_at: Utc::now(),
        })
        .await;
    store
        .insert_event(Event {
            id: event_id,
            name: "Trail Run".to_string(),
            description: None,
            date: Utc::now(),
            location: "Sintra".to_string(),
            created_by: creator_id,
            created_at: Utc::now(),
        })
        .await;

    let search = SimilaritySearch::new(
        store.clone(),
        Arc::new(MemoryObjectStore::new()),
        Arc::new(ScriptedEmbedder),
        SimilarityConfig::default(),
    );
    Fixture {
        store,
        search,
        creator_id,
        event_id,
    }
}

async fn add_image(f: &Fixture, embedding: Vec<f32>) -> Uuid {
    let (image, _) = f
        .store
        .insert_image(NewImage {
            object_id: format!("images/{}", Uuid::new_v4()),
            description: None,
            bib_number: None,
            plate_number: None,
            embedding,
            creator_id: f.creator_id,
            event_id: Some(f.event_id),
        })
        .await
        .expect("insert");
    image.id
}

fn encoded(first: u8) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode([first, 1, 2, 3]))
}

#[tokio::test]
async fn ranks_by_cosine_similarity() {
    let f = fixture().await;
    let same = add_image(&f, vec![1.0, 0.0, 0.0]).await;
    let orthogonal = add_image(&f, vec![0.0, 1.0, 0.0]).await;

    let response = f
        .search
        .find_similar(f.event_id, &encoded(b'x'), None)
        .await
        .expect("search");

    assert_eq!(response.message, None);
    let ranked: Vec<(Uuid, f64)> = response
        .images
        .iter()
        .map(|hit| (hit.image.id, hit.similarity))
        .collect();
    assert_eq!(ranked, vec![(same, 1.0), (orthogonal, 0.0)]);

    let creator = response.images[0].creator.as_ref().expect("creator");
    assert_eq!(creator.display_name.as_deref(), Some("Ines Photo"));
    assert!(response.images[0].image.url.starts_with("memory://images/"));
    assert!(response.images[0].image.url.contains("expires="));
}

#[tokio::test]
async fn similarity_is_non_increasing_and_limited() {
    let f = fixture().await;
    for embedding in [
        vec![0.2, 0.9, 0.1],
        vec![1.0, 0.1, 0.0],
        vec![0.5, 0.5, 0.5],
        vec![-1.0, 0.0, 0.0],
    ] {
        add_image(&f, embedding).await;
    }

    let response = f
        .search
        .find_similar(f.event_id, &encoded(b'x'), Some(3))
        .await
        .expect("search");
    assert_eq!(response.images.len(), 3);
    assert!(response
        .images
        .windows(2)
        .all(|pair| pair[0].similarity >= pair[1].similarity));
}

#[tokio::test]
async fn soft_provider_signals_become_messages() {
    let f = fixture().await;
    add_image(&f, vec![1.0, 0.0, 0.0]).await;

    for first in [b'n', b'u'] {
        let response = f
            .search
            .find_similar(f.event_id, &encoded(first), None)
            .await
            .expect("soft failure is not an error");
        assert!(response.images.is_empty());
        assert!(response.message.is_some_and(|m| !m.is_empty()));
    }
}

#[tokio::test]
async fn hard_provider_failures_propagate() {
    let f = fixture().await;
    let err = f
        .search
        .find_similar(f.event_id, &encoded(b'z'), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::ProviderError(_)));
}

#[tokio::test]
async fn unknown_event_and_bad_payloads_are_rejected() {
    let f = fixture().await;

    let err = f
        .search
        .find_similar(Uuid::new_v4(), &encoded(b'x'), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::NotFound(_)));

    for payload in ["", "data:image/png;base64,", "%%% not base64 %%%"] {
        let err = f
            .search
            .find_similar(f.event_id, payload, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)), "{payload:?}");
    }
}

#[tokio::test]
async fn raw_bytes_take_the_same_path() {
    let f = fixture().await;
    let id = add_image(&f, vec![0.0, 1.0, 0.0]).await;

    let response = f
        .search
        .find_similar_bytes(f.event_id, b"y-image".to_vec(), Some(500))
        .await
        .expect("search");
    assert_eq!(response.images[0].image.id, id);
    assert_eq!(f.search.clamp_limit(Some(500)), 50);
    assert_eq!(f.search.clamp_limit(Some(0)), 1);
    assert_eq!(f.search.clamp_limit(None), 20);
}
