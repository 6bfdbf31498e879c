use crate::app::AppState;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use shutter_indexer::{IndexerError, IngestRequest, IngestWithVariants, VariantUpload};
use shutter_protocol::{ErrorEnvelope, ImageView, PhotographyType, Price};
use shutter_search::{
    CreatorFilters, EventFilters, ImageFilters, Pagination, SearchError, SimilarityResponse,
};
use shutter_vector_store::{StoreError, VariantPatch};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Uploads carry full-resolution photos plus up to a few variants.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/creator/upload", post(upload))
        .route("/creator/upload-with-variants", post(upload_with_variants))
        .route(
            "/creator/variants/:variant_id",
            patch(update_variant).delete(delete_variant),
        )
        .route("/creator/contents", get(creator_contents))
        .route("/creator/image/:image_id", get(image_with_variants))
        .route("/event/:event_id/images", get(event_gallery))
        .route("/event/:event_id/similar", post(find_similar))
        .route("/event/:event_id/search-similar", post(find_similar_upload))
        .route("/search", get(global_search))
        .route("/search/events", get(search_events))
        .route("/search/creators", get(search_creators))
        .route("/search/images", get(search_images))
        .route("/search/stats", get(index_stats))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    envelope: ErrorEnvelope,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        let envelope = ErrorEnvelope::new(code, message);
        let envelope = match hint_for(code) {
            Some(hint) => envelope.with_hint(hint),
            None => envelope,
        };
        Self { status, envelope }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    fn provider(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "provider_error", message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::not_found(format!("Not found: {what}")),
            other => {
                log::error!("Primary store failure: {other}");
                Self::internal(other.to_string())
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        &self.envelope.code
    }
}

fn hint_for(code: &str) -> Option<&'static str> {
    match code {
        "invalid_request" => Some("Check the request fields, ids and paging parameters."),
        "provider_error" => Some("An upstream provider failed; the request can be retried."),
        _ => None,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

impl From<IndexerError> for ApiError {
    fn from(err: IndexerError) -> Self {
        match err {
            IndexerError::Validation(msg) => Self::invalid(msg),
            IndexerError::NotFound(msg) => Self::not_found(format!("Not found: {msg}")),
            IndexerError::ProviderError(err) => Self::provider(err.to_string()),
            IndexerError::StoreError(err) => Self::from_store(err),
            IndexerError::SearchIndexError(err) => Self::internal(err.to_string()),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Validation(msg) => Self::invalid(msg),
            SearchError::NotFound(msg) => Self::not_found(format!("Not found: {msg}")),
            SearchError::ProviderError(err) => Self::provider(err.to_string()),
            SearchError::StoreError(err) => Self::from_store(err),
            SearchError::SearchIndexError(err) => Self::internal(err.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::invalid(format!("Malformed multipart body: {}", err.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        Self::invalid(err.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self::invalid(err.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        Self::invalid(err.body_text())
    }
}

fn outcome_label<T>(result: &Result<T, ApiError>) -> &str {
    match result {
        Ok(_) => "ok",
        Err(err) => err.code(),
    }
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::invalid(format!("{field} must be a UUID, got '{raw}'")))
}

/// Text fields and file parts of a multipart body, keyed by field name.
#[derive(Debug, Default)]
struct UploadForm {
    text: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
}

fn is_file_field(name: &str, has_filename: bool) -> bool {
    has_filename
        || matches!(name, "file" | "image")
        || name
            .strip_prefix("variant")
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

impl UploadForm {
    async fn read(multipart: Result<Multipart, MultipartRejection>) -> Result<Self, ApiError> {
        let mut multipart = multipart?;
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if is_file_field(&name, field.file_name().is_some()) {
                form.files.insert(name, field.bytes().await?.to_vec());
            } else {
                form.text.insert(name, field.text().await?);
            }
        }
        Ok(form)
    }

    fn text(&mut self, name: &str) -> Option<String> {
        self.text.remove(name).filter(|v| !v.trim().is_empty())
    }

    fn file(&mut self, name: &str) -> Result<Vec<u8>, ApiError> {
        self.files
            .remove(name)
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| ApiError::invalid(format!("multipart field '{name}' with the image is required")))
    }

    fn ingest_request(&mut self) -> Result<IngestRequest, ApiError> {
        Ok(IngestRequest {
            image: self.file("file")?,
            creator_id: self.text("creatorId").unwrap_or_default(),
            event_id: self.text("eventId"),
            description: self.text("description"),
        })
    }

    /// Pairs each descriptor of the `variants` JSON array with its `variant{i}` file part.
    fn variant_uploads(&mut self) -> Result<Vec<VariantUpload>, ApiError> {
        let Some(raw) = self.text("variants") else {
            return Ok(Vec::new());
        };
        let descriptors: Vec<VariantDescriptor> = serde_json::from_str(&raw)
            .map_err(|err| ApiError::invalid(format!("variants must be a JSON array: {err}")))?;
        Ok(descriptors
            .into_iter()
            .enumerate()
            .map(|(i, descriptor)| VariantUpload {
                name: descriptor.name,
                description: descriptor.description,
                price: descriptor.price,
                image: self.files.remove(&format!("variant{i}")).unwrap_or_default(),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct VariantDescriptor {
    name: String,
    #[serde(default)]
    description: Option<String>,
    price: Price,
}

async fn upload(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let result = ingest_single(&state, multipart).await;
    state.metrics.record_ingest(outcome_label(&result));
    Ok((StatusCode::CREATED, Json(result?)).into_response())
}

async fn ingest_single(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ImageView, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let request = form.ingest_request()?;
    Ok(state.coordinator.ingest(request).await?)
}

async fn upload_with_variants(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let result = ingest_with_variants(&state, multipart).await;
    state.metrics.record_ingest(outcome_label(&result));
    Ok((StatusCode::CREATED, Json(result?)).into_response())
}

async fn ingest_with_variants(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<IngestWithVariants, ApiError> {
    let mut form = UploadForm::read(multipart).await?;
    let request = form.ingest_request()?;
    let variants = form.variant_uploads()?;
    Ok(state
        .coordinator
        .ingest_with_variants(request, variants)
        .await?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateVariantBody {
    #[serde(default)]
    creator_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    price: Option<Price>,
}

async fn update_variant(
    State(state): State<SharedState>,
    Path(variant_id): Path<String>,
    body: Result<Json<UpdateVariantBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let variant_id = parse_uuid("variantId", &variant_id)?;
    let Json(body) = body?;
    let patch = VariantPatch {
        name: body.name,
        description: body.description,
        price: body.price,
    };
    let variant = state
        .coordinator
        .update_variant(&body.creator_id, variant_id, patch)
        .await?;
    Ok(Json(variant).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatorQuery {
    #[serde(default)]
    creator_id: Option<String>,
}

async fn delete_variant(
    State(state): State<SharedState>,
    Path(variant_id): Path<String>,
    query: Result<Query<CreatorQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let variant_id = parse_uuid("variantId", &variant_id)?;
    let Query(query) = query?;
    let creator_id = query
        .creator_id
        .ok_or_else(|| ApiError::invalid("creatorId query parameter is required"))?;
    state
        .coordinator
        .delete_variant(&creator_id, variant_id)
        .await?;
    Ok(Json(json!({ "success": true })).into_response())
}

async fn image_with_variants(
    State(state): State<SharedState>,
    Path(image_id): Path<String>,
    query: Result<Query<CreatorQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let image_id = parse_uuid("imageId", &image_id)?;
    let Query(query) = query?;
    let creator_id = query
        .creator_id
        .ok_or_else(|| ApiError::invalid("creatorId query parameter is required"))?;
    let image = state
        .coordinator
        .image_with_variants(&creator_id, image_id)
        .await?;
    Ok(Json(image).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentsQuery {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
}

async fn creator_contents(
    State(state): State<SharedState>,
    query: Result<Query<ContentsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let user_id = query
        .user_id
        .ok_or_else(|| ApiError::invalid("userId query parameter is required"))?;
    let images = state
        .coordinator
        .creator_contents(&user_id, query.event_id.as_deref())
        .await?;
    Ok(Json(images).into_response())
}

#[derive(Debug, Deserialize)]
struct GalleryQuery {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    limit: Option<u32>,
}

async fn event_gallery(
    State(state): State<SharedState>,
    Path(event_id): Path<String>,
    query: Result<Query<GalleryQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let event_id = parse_uuid("eventId", &event_id)?;
    let Query(query) = query?;
    let page = state
        .coordinator
        .event_gallery(event_id, query.page, query.limit)
        .await?;
    Ok(Json(page).into_response())
}

#[derive(Debug, Deserialize)]
struct SimilarBody {
    image: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    #[serde(default)]
    limit: Option<usize>,
}

fn similarity_label(result: &Result<SimilarityResponse, ApiError>) -> &str {
    match result {
        Ok(response) if response.message.is_some() => "soft",
        other => outcome_label(other),
    }
}

async fn find_similar(
    State(state): State<SharedState>,
    Path(event_id): Path<String>,
    body: Result<Json<SimilarBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let result = similar_from_json(&state, &event_id, body).await;
    state.metrics.record_similarity(similarity_label(&result));
    Ok(Json(result?).into_response())
}

async fn similar_from_json(
    state: &AppState,
    event_id: &str,
    body: Result<Json<SimilarBody>, JsonRejection>,
) -> Result<SimilarityResponse, ApiError> {
    let event_id = parse_uuid("eventId", event_id)?;
    let Json(body) = body?;
    Ok(state
        .similarity
        .find_similar(event_id, &body.image, body.limit)
        .await?)
}

async fn find_similar_upload(
    State(state): State<SharedState>,
    Path(event_id): Path<String>,
    query: Result<Query<LimitQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let result = similar_from_upload(&state, &event_id, query, multipart).await;
    state.metrics.record_similarity(similarity_label(&result));
    Ok(Json(result?).into_response())
}

async fn similar_from_upload(
    state: &AppState,
    event_id: &str,
    query: Result<Query<LimitQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<SimilarityResponse, ApiError> {
    let event_id = parse_uuid("eventId", event_id)?;
    let Query(query) = query?;
    let mut form = UploadForm::read(multipart).await?;
    let image = form.file("image")?;
    Ok(state
        .similarity
        .find_similar_bytes(event_id, image, query.limit)
        .await?)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
    #[serde(default)]
    creator_id: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    photography_type: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
}

impl SearchParams {
    fn pagination(&self) -> Result<Pagination, ApiError> {
        Ok(Pagination::new(self.limit, self.offset)?)
    }
}

async fn global_search(
    State(state): State<SharedState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    let results = state
        .lexical
        .global(params.q.as_deref(), params.limit)
        .await?;
    Ok(Json(results).into_response())
}

async fn search_events(
    State(state): State<SharedState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    let filters = EventFilters {
        creator_id: params.creator_id.clone(),
        location: params.location.clone(),
    };
    let page = state
        .lexical
        .search_events(params.q.as_deref(), params.pagination()?, &filters)
        .await;
    Ok(Json(page).into_response())
}

async fn search_creators(
    State(state): State<SharedState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    let photography_type = match params.photography_type.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(PhotographyType::parse(raw).ok_or_else(|| {
            ApiError::invalid(format!(
                "photographyType must be Marathon, Wildlife or Motorsports, got '{raw}'"
            ))
        })?),
        _ => None,
    };
    let page = state
        .lexical
        .search_creators(
            params.q.as_deref(),
            params.pagination()?,
            &CreatorFilters { photography_type },
        )
        .await;
    Ok(Json(page).into_response())
}

async fn search_images(
    State(state): State<SharedState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    let filters = ImageFilters {
        event_id: params.event_id.clone(),
    };
    let page = state
        .lexical
        .search_images(params.q.as_deref(), params.pagination()?, &filters)
        .await;
    Ok(Json(page).into_response())
}

async fn index_stats(State(state): State<SharedState>) -> Json<shutter_search_index::IndexStats> {
    Json(state.lexical.stats().await)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics(State(state): State<SharedState>) -> Result<Response, ApiError> {
    state.refresh_metrics().await;
    let body = state
        .metrics
        .render()
        .map_err(|err| ApiError::internal(format!("{err:#}")))?;
    Ok(([(CONTENT_TYPE, state.metrics.content_type())], body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_fields_are_recognized_by_name() {
        assert!(is_file_field("file", false));
        assert!(is_file_field("image", false));
        assert!(is_file_field("variant2", false));
        assert!(!is_file_field("variants", false));
        assert!(!is_file_field("creatorId", false));
        assert!(is_file_field("anything", true));
    }

    #[test]
    fn errors_map_to_status_and_code() {
        let err = ApiError::from(IndexerError::Validation("bad".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "invalid_request");

        let err = ApiError::from(SearchError::NotFound("event".to_string()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = ApiError::from(IndexerError::StoreError(StoreError::Other("down".to_string())));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "internal");
    }
}
