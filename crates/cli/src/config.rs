use anyhow::{bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use shutter_indexer::{CoordinatorConfig, ProjectorConfig};
use shutter_providers::{DEFAULT_JINA_DIMENSION, DEFAULT_JINA_MODEL};
use shutter_search::{SimilarityConfig, DEFAULT_SIMILAR_LIMIT, MAX_SIMILAR_LIMIT};
use shutter_search_index::TypesenseConfig;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "shutter.toml";
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    Typesense,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreKind {
    Cloudinary,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    Remote,
    Stub,
}

/// Which remote model produces the vectors. Ingestion and similarity queries share one
/// provider so stored and query vectors live in the same space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Visual,
    Face,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind: String,
    pub store: StoreSection,
    pub search: SearchSection,
    pub object_store: ObjectStoreSection,
    pub embeddings: EmbeddingsSection,
    pub extraction: ExtractionSection,
    pub projector: ProjectorSection,
    pub ingest: IngestSection,
    pub similarity: SimilaritySection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub engine: EngineBackend,
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub api_key: String,
    pub connection_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreSection {
    pub kind: ObjectStoreKind,
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub url_ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsSection {
    pub mode: EmbeddingMode,
    pub provider: EmbeddingProvider,
    /// Vector length for the stub embedder; remote providers report their own.
    pub dimension: usize,
    pub timeout_secs: u64,
    pub jina_api_key: Option<String>,
    pub jina_model: String,
    pub face_url: Option<String>,
    pub face_api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSection {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorSection {
    pub max_attempts: i32,
    pub batch_size: usize,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub max_variants: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilaritySection {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            store: StoreSection::default(),
            search: SearchSection::default(),
            object_store: ObjectStoreSection::default(),
            embeddings: EmbeddingsSection::default(),
            extraction: ExtractionSection::default(),
            projector: ProjectorSection::default(),
            ingest: IngestSection::default(),
            similarity: SimilaritySection::default(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: 10,
        }
    }
}

impl Default for SearchSection {
    fn default() -> Self {
        let typesense = TypesenseConfig::default();
        Self {
            engine: EngineBackend::Memory,
            host: typesense.host,
            port: typesense.port,
            protocol: typesense.protocol,
            api_key: typesense.api_key,
            connection_timeout_secs: typesense.connection_timeout.as_secs(),
            request_timeout_secs: typesense.request_timeout.as_secs(),
        }
    }
}

impl Default for ObjectStoreSection {
    fn default() -> Self {
        Self {
            kind: ObjectStoreKind::Memory,
            cloud_name: None,
            api_key: None,
            api_secret: None,
            url_ttl_secs: 3600,
        }
    }
}

impl Default for EmbeddingsSection {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Stub,
            provider: EmbeddingProvider::Visual,
            dimension: DEFAULT_JINA_DIMENSION,
            timeout_secs: 60,
            jina_api_key: None,
            jina_model: DEFAULT_JINA_MODEL.to_string(),
            face_url: None,
            face_api_key: None,
        }
    }
}

impl Default for ExtractionSection {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            base_url: None,
            model: None,
        }
    }
}

impl Default for ProjectorSection {
    fn default() -> Self {
        let defaults = ProjectorConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            batch_size: defaults.batch_size,
            interval_secs: defaults.interval.as_secs(),
        }
    }
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            max_variants: CoordinatorConfig::default().max_variants,
        }
    }
}

impl Default for SimilaritySection {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SIMILAR_LIMIT,
            max_limit: MAX_SIMILAR_LIMIT,
        }
    }
}

impl AppConfig {
    /// Reads `path` if it exists, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(Into::into)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(Into::into)
    }

    /// Overrides fields from environment-style variables; `lookup` returns `None` when unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = get("SHUTTER_DATABASE_URL") {
            self.store.database_url = Some(url);
        }
        if let Some(bind) = get("SHUTTER_BIND") {
            self.bind = bind;
        }

        if let Some(host) = get("TYPESENSE_HOST") {
            self.search.host = host;
        }
        if let Some(port) = get("TYPESENSE_PORT") {
            match port.parse() {
                Ok(port) => self.search.port = port,
                Err(_) => log::warn!("Ignoring TYPESENSE_PORT={port}: not a port number"),
            }
        }
        if let Some(protocol) = get("TYPESENSE_PROTOCOL") {
            self.search.protocol = protocol;
        }
        if let Some(key) = get("TYPESENSE_API_KEY") {
            self.search.api_key = key;
        }

        if let Some(name) = get("CLOUDINARY_CLOUD_NAME") {
            self.object_store.cloud_name = Some(name);
        }
        if let Some(key) = get("CLOUDINARY_API_KEY") {
            self.object_store.api_key = Some(key);
        }
        if let Some(secret) = get("CLOUDINARY_API_SECRET") {
            self.object_store.api_secret = Some(secret);
        }

        if let Some(key) = get("JINA_API_KEY") {
            self.embeddings.jina_api_key = Some(key);
        }
        if let Some(url) = get("FACE_EMBEDDING_URL") {
            self.embeddings.face_url = Some(url);
        }

        if let Some(key) = get("VISION_API_KEY") {
            self.extraction.api_key = Some(key);
        }
        if let Some(url) = get("VISION_BASE_URL") {
            self.extraction.base_url = Some(url);
        }
        if let Some(model) = get("VISION_MODEL") {
            self.extraction.model = Some(model);
        }
    }

    /// Rejects backend selections whose credentials are missing.
    pub fn validate(&self) -> Result<()> {
        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            bail!("store.backend = \"postgres\" needs store.database_url or SHUTTER_DATABASE_URL");
        }
        if self.object_store.kind == ObjectStoreKind::Cloudinary
            && (self.object_store.cloud_name.is_none()
                || self.object_store.api_key.is_none()
                || self.object_store.api_secret.is_none())
        {
            bail!("object_store.kind = \"cloudinary\" needs cloud_name, api_key and api_secret");
        }
        if self.embeddings.mode == EmbeddingMode::Remote {
            match self.embeddings.provider {
                EmbeddingProvider::Visual if self.embeddings.jina_api_key.is_none() => {
                    bail!("remote visual embeddings need embeddings.jina_api_key or JINA_API_KEY")
                }
                EmbeddingProvider::Face if self.embeddings.face_url.is_none() => {
                    bail!("remote face embeddings need embeddings.face_url or FACE_EMBEDDING_URL")
                }
                _ => {}
            }
        } else if self.embeddings.dimension == 0 {
            bail!("embeddings.dimension must be positive");
        }
        if self.extraction.enabled && self.extraction.api_key.is_none() {
            bail!("extraction.enabled needs extraction.api_key or VISION_API_KEY");
        }
        if self.ingest.max_variants == 0 {
            bail!("ingest.max_variants must be positive");
        }
        if self.projector.max_attempts < 1 {
            bail!("projector.max_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn typesense(&self) -> TypesenseConfig {
        TypesenseConfig {
            host: self.search.host.clone(),
            port: self.search.port,
            protocol: self.search.protocol.clone(),
            api_key: self.search.api_key.clone(),
            connection_timeout: Duration::from_secs(self.search.connection_timeout_secs),
            request_timeout: Duration::from_secs(self.search.request_timeout_secs),
        }
    }

    pub fn projector_config(&self) -> ProjectorConfig {
        ProjectorConfig {
            max_attempts: self.projector.max_attempts,
            batch_size: self.projector.batch_size.max(1),
            interval: Duration::from_secs(self.projector.interval_secs.max(1)),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_variants: self.ingest.max_variants,
            url_ttl: self.url_ttl(),
            ..CoordinatorConfig::default()
        }
    }

    pub fn similarity_config(&self) -> SimilarityConfig {
        SimilarityConfig {
            default_limit: self.similarity.default_limit,
            max_limit: self.similarity.max_limit,
            url_ttl: self.url_ttl(),
        }
    }

    pub fn url_ttl(&self) -> Duration {
        Duration::from_secs(self.object_store.url_ttl_secs)
    }
}
