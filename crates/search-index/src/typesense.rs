use crate::engine::{
    CollectionInfo, EngineQuery, EngineResults, ImportAction, ImportReport, SearchEngine,
};
use crate::error::{Result, SearchIndexError};
use crate::schema::CollectionSchema;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const API_KEY_HEADER: &str = "X-TYPESENSE-API-KEY";

#[derive(Debug, Clone)]
pub struct TypesenseConfig {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub api_key: String,
    pub connection_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for TypesenseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8108,
            protocol: "http".to_string(),
            api_key: "xyz".to_string(),
            connection_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl TypesenseConfig {
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// [`SearchEngine`] over the Typesense HTTP API.
#[derive(Clone)]
pub struct TypesenseClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    found: u64,
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    document: Value,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    name: String,
    #[serde(default)]
    num_documents: u64,
}

#[derive(Debug, Deserialize)]
struct ImportLine {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

impl TypesenseClient {
    pub fn new(config: &TypesenseConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connection_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 404 {
            return Err(SearchIndexError::NotFound(format!("{what}: {body}")));
        }
        Err(SearchIndexError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Parses the JSON-lines body returned by a bulk import.
pub fn parse_import_response(body: &str) -> ImportReport {
    let mut report = ImportReport::default();
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<ImportLine>(line) {
            Ok(ImportLine { success: true, .. }) => report.imported += 1,
            Ok(ImportLine { error, .. }) => {
                report.failed += 1;
                report
                    .errors
                    .push(error.unwrap_or_else(|| "unknown import error".to_string()));
            }
            Err(err) => {
                report.failed += 1;
                report.errors.push(format!("unreadable import result: {err}"));
            }
        }
    }
    report
}

#[async_trait]
impl SearchEngine for TypesenseClient {
    async fn retrieve_collection(&self, name: &str) -> Result<CollectionInfo> {
        let path = format!("/collections/{}", encode_segment(name));
        let response = self
            .send(self.request(reqwest::Method::GET, &path), name)
            .await?;
        let parsed: CollectionResponse = response.json().await?;
        Ok(CollectionInfo {
            name: parsed.name,
            num_documents: parsed.num_documents,
        })
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let builder = self.request(reqwest::Method::POST, "/collections").json(schema);
        self.send(builder, &schema.name).await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let path = format!("/collections/{}", encode_segment(name));
        self.send(self.request(reqwest::Method::DELETE, &path), name)
            .await?;
        Ok(())
    }

    async fn upsert_document(&self, collection: &str, document: Value) -> Result<()> {
        let path = format!("/collections/{}/documents", encode_segment(collection));
        let builder = self
            .request(reqwest::Method::POST, &path)
            .query(&[("action", "upsert")])
            .json(&document);
        self.send(builder, collection).await?;
        Ok(())
    }

    async fn update_document(&self, collection: &str, id: &str, partial: Value) -> Result<()> {
        let path = format!(
            "/collections/{}/documents/{}",
            encode_segment(collection),
            encode_segment(id)
        );
        let builder = self.request(reqwest::Method::PATCH, &path).json(&partial);
        self.send(builder, &format!("{collection}/{id}")).await?;
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        let path = format!(
            "/collections/{}/documents/{}",
            encode_segment(collection),
            encode_segment(id)
        );
        self.send(
            self.request(reqwest::Method::DELETE, &path),
            &format!("{collection}/{id}"),
        )
        .await?;
        Ok(())
    }

    async fn import_documents(
        &self,
        collection: &str,
        documents: Vec<Value>,
        action: ImportAction,
    ) -> Result<ImportReport> {
        if documents.is_empty() {
            return Ok(ImportReport::default());
        }

        let mut body = String::new();
        for document in &documents {
            body.push_str(&serde_json::to_string(document)?);
            body.push('\n');
        }

        let path = format!("/collections/{}/documents/import", encode_segment(collection));
        let builder = self
            .request(reqwest::Method::POST, &path)
            .query(&[("action", action.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body);
        let response = self.send(builder, collection).await?;
        let text = response.text().await?;
        Ok(parse_import_response(&text))
    }

    async fn search(&self, collection: &str, query: &EngineQuery) -> Result<EngineResults> {
        let path = format!("/collections/{}/documents/search", encode_segment(collection));
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.q.clone()),
            ("query_by", query.query_by.clone()),
            ("page", query.page.to_string()),
            ("per_page", query.per_page.to_string()),
        ];
        if let Some(filter) = &query.filter_by {
            params.push(("filter_by", filter.clone()));
        }
        if let Some(sort) = &query.sort_by {
            params.push(("sort_by", sort.clone()));
        }

        let builder = self.request(reqwest::Method::GET, &path).query(&params);
        let response = self.send(builder, collection).await?;
        let parsed: SearchResponse = response.json().await?;
        Ok(EngineResults {
            found: parsed.found,
            hits: parsed.hits.into_iter().map(|hit| hit.document).collect(),
        })
    }
}
