use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, Method, Request, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use shutter_cli::{http_api, AppConfig, AppState, Backends};
use shutter_protocol::{Creator, Event, PhotographyType};
use shutter_providers::{MemoryObjectStore, NoopExtractor, StubEmbedder};
use shutter_search_index::MemoryEngine;
use shutter_vector_store::MemoryStore;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const DIMENSION: usize = 16;
const BOUNDARY: &str = "shutter-test-boundary";

struct Harness {
    state: Arc<AppState>,
    creator_id: Uuid,
    event_id: Uuid,
}

enum Part<'a> {
    Text(&'a str),
    File(&'a [u8]),
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new(DIMENSION));
    let creator_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    store
        .insert_creator(Creator {
            id: creator_id,
            name: Some("Tomas".to_string()),
            display_name: Some("Tomas Lens".to_string()),
            email: "tomas@example.com".to_string(),
            photography_type: Some(PhotographyType::Marathon),
            location: Some("Braga".to_string()),
            bio: None,
            created_at: Utc::now(),
        })
        .await;
    store
        .insert_event(Event {
            id: event_id,
            name: "Braga Half".to_string(),
            description: None,
            date: Utc::now(),
            location: "Braga".to_string(),
            created_by: creator_id,
            created_at: Utc::now(),
        })
        .await;

    let state = AppState::assemble(
        AppConfig::default(),
        Backends {
            store,
            objects: Arc::new(MemoryObjectStore::new()),
            embedder: Arc::new(StubEmbedder::new(DIMENSION)),
            extractor: Arc::new(NoopExtractor),
            engine: Arc::new(MemoryEngine::new()),
        },
    )
    .expect("state");
    state.lexical.provision().await;

    Harness {
        state: Arc::new(state),
        creator_id,
        event_id,
    }
}

fn multipart(parts: &[(&str, Part<'_>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, part) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.jpg\"\r\n\
                         Content-Type: image/jpeg\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

impl Harness {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = http_api::router(self.state.clone())
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        });
        (status, value)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, parts: &[(&str, Part<'_>)]) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart(parts)))
            .unwrap();
        self.send(request).await
    }

    async fn send_json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn upload(&self, bytes: &[u8]) -> Value {
        let creator = self.creator_id.to_string();
        let event = self.event_id.to_string();
        let (status, body) = self
            .post_form(
                "/creator/upload",
                &[
                    ("file", Part::File(bytes)),
                    ("creatorId", Part::Text(&creator)),
                    ("eventId", Part::Text(&event)),
                    ("description", Part::Text("finish line sprint")),
                ],
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

#[tokio::test]
async fn upload_is_stored_and_searchable() {
    let h = harness().await;
    let image = h.upload(b"photo-one").await;

    assert_eq!(image["creatorId"], json!(h.creator_id.to_string()));
    assert_eq!(image["eventId"], json!(h.event_id.to_string()));
    assert!(image["url"].as_str().is_some_and(|u| u.contains("expires=")));
    assert!(image.get("objectId").is_none());

    let (status, page) = h.get("/search/images?q=sprint").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["estimatedTotalHits"], json!(1));
    assert_eq!(page["hits"][0]["eventName"], json!("Braga Half"));
    assert_eq!(page["hits"][0]["creatorName"], json!("Tomas Lens"));
}

#[tokio::test]
async fn upload_errors_use_the_envelope() {
    let h = harness().await;

    let (status, body) = h
        .post_form(
            "/creator/upload",
            &[
                ("file", Part::File(b"photo")),
                ("creatorId", Part::Text(&Uuid::new_v4().to_string())),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("not_found"));

    let (status, body) = h
        .post_form("/creator/upload", &[("creatorId", Part::Text("abc"))])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("invalid_request"));
    assert!(body["hint"].is_string());
}

#[tokio::test]
async fn variants_are_reported_and_owned() {
    let h = harness().await;
    let creator = h.creator_id.to_string();
    let variants = json!([
        { "name": "Print A4", "price": 12.5 },
        { "name": "Digital", "description": "full resolution", "price": "4.99" }
    ])
    .to_string();

    let (status, body) = h
        .post_form(
            "/creator/upload-with-variants",
            &[
                ("file", Part::File(b"main-photo")),
                ("creatorId", Part::Text(&creator)),
                ("variants", Part::Text(&variants)),
                ("variant0", Part::File(b"a4-print")),
                ("variant1", Part::File(b"digital")),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let outcomes = body["variants"].as_array().expect("variants");
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o["status"] == json!("created")));
    assert_eq!(outcomes[0]["variant"]["price"], json!(12.5));
    let variant_id = outcomes[1]["variant"]["id"].as_str().expect("id").to_string();

    let uri = format!("/creator/variants/{variant_id}");
    let (status, _) = h
        .send_json(
            Method::PATCH,
            &uri,
            json!({ "creatorId": Uuid::new_v4().to_string(), "price": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, updated) = h
        .send_json(Method::PATCH, &uri, json!({ "creatorId": creator, "price": 6 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price"], json!(6.0));
    assert_eq!(updated["name"], json!("Digital"));

    let delete_uri = format!("{uri}?creatorId={creator}");
    let delete = || Request::delete(delete_uri.as_str()).body(Body::empty()).unwrap();
    let (status, body) = h.send(delete()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    let (status, _) = h.send(delete()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn owner_and_gallery_reads_sign_every_url() {
    let h = harness().await;
    let creator = h.creator_id.to_string();
    let variants = json!([{ "name": "Print A4", "price": 12.5 }]).to_string();
    let (status, body) = h
        .post_form(
            "/creator/upload-with-variants",
            &[
                ("file", Part::File(b"gallery-main")),
                ("creatorId", Part::Text(&creator)),
                ("eventId", Part::Text(&h.event_id.to_string())),
                ("variants", Part::Text(&variants)),
                ("variant0", Part::File(b"gallery-print")),
            ],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let image_id = body["image"]["id"].as_str().expect("id").to_string();
    h.upload(b"gallery-second").await;

    let (status, detail) = h
        .get(&format!("/creator/image/{image_id}?creatorId={creator}"))
        .await;
    assert_eq!(status, StatusCode::OK, "{detail}");
    assert_eq!(detail["id"], json!(image_id));
    assert!(detail["url"].as_str().is_some_and(|u| u.contains("expires=")));
    assert_eq!(detail["variants"][0]["name"], json!("Print A4"));
    assert!(detail["variants"][0]["url"]
        .as_str()
        .is_some_and(|u| u.contains("expires=")));
    assert!(detail.get("objectId").is_none());

    let (status, body) = h
        .get(&format!("/creator/image/{image_id}?creatorId={}", Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("not_found"));
    let (status, _) = h.get(&format!("/creator/image/{image_id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, contents) = h.get(&format!("/creator/contents?userId={creator}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(contents.as_array().map(Vec::len), Some(2));
    let (status, _) = h.get("/creator/contents").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, page) = h
        .get(&format!("/event/{}/images?page=1&limit=1", h.event_id))
        .await;
    assert_eq!(status, StatusCode::OK, "{page}");
    assert_eq!(page["total"], json!(2));
    assert_eq!(page["totalPages"], json!(2));
    assert_eq!(page["images"].as_array().map(Vec::len), Some(1));
    assert!(page["images"][0]["url"]
        .as_str()
        .is_some_and(|u| u.contains("expires=")));

    let (status, _) = h.get(&format!("/event/{}/images?page=0", h.event_id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = h.get(&format!("/event/{}/images", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn similar_routes_rank_the_same_photo_first() {
    let h = harness().await;
    let first = h.upload(b"runner-42").await;
    h.upload(b"runner-77").await;

    let uri = format!("/event/{}/similar", h.event_id);
    let (status, body) = h
        .send_json(
            Method::POST,
            &uri,
            json!({ "image": format!("data:image/jpeg;base64,{}", STANDARD.encode(b"runner-42")) }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let images = body["images"].as_array().expect("images");
    assert_eq!(images.len(), 2);
    assert_eq!(images[0]["id"], first["id"]);
    let top = images[0]["similarity"].as_f64().expect("similarity");
    assert!((top - 1.0).abs() < 1e-5);
    assert_eq!(images[0]["creator"]["displayName"], json!("Tomas Lens"));

    let (status, body) = h
        .post_form(
            &format!("/event/{}/search-similar?limit=1", h.event_id),
            &[("image", Part::File(b"runner-42"))],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["images"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["images"][0]["id"], first["id"]);

    let (status, body) = h
        .send_json(
            Method::POST,
            &format!("/event/{}/similar", Uuid::new_v4()),
            json!({ "image": STANDARD.encode(b"x") }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!("not_found"));
}

#[tokio::test]
async fn search_parameters_are_validated() {
    let h = harness().await;

    let (status, body) = h.get("/search/events?q=*&limit=20&offset=45").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("invalid_request"));

    let (status, _) = h.get("/search/events?q=*&limit=20&offset=40").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = h.get("/search/events?q=*&limit=1&offset=4294967295").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("invalid_request"));

    let (status, _) = h.get("/search/creators?q=*&photographyType=street").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = h.get("/search/images").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "hits": [], "estimatedTotalHits": 0 }));

    let (status, body) = h.get("/search?q=%20").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "events": [], "creators": [], "images": [] }));
}

#[tokio::test]
async fn stats_health_and_metrics() {
    let h = harness().await;
    h.upload(b"photo-for-stats").await;

    let (status, stats) = h.get("/search/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["images"]["numberOfDocuments"], json!(1));
    assert_eq!(stats["events"]["numberOfDocuments"], json!(1));

    let (status, health) = h.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health, json!({ "status": "ok" }));

    let (status, metrics) = h.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = metrics.as_str().expect("text exposition");
    assert!(text.contains("shutter_ingest_total{outcome=\"ok\"} 1"));
    assert!(text.contains("shutter_outbox_pending 0"));
}
