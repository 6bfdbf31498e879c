use crate::config::{
    AppConfig, EmbeddingMode, EmbeddingProvider, EngineBackend, ObjectStoreKind, StoreBackend,
};
use crate::metrics::Metrics;
use anyhow::{Context as AnyhowContext, Result};
use shutter_indexer::{IndexingCoordinator, Projector};
use shutter_providers::{
    http_client, AttributeExtractor, CloudinaryConfig, CloudinaryStore, FaceConfig,
    FaceEmbedder, ImageEmbedder, JinaConfig, JinaEmbedder, MemoryObjectStore, NoopExtractor,
    ObjectStore, StubEmbedder, VisionConfig, VisionExtractor,
};
use shutter_search::{LexicalSearch, SimilaritySearch};
use shutter_search_index::{MemoryEngine, SearchEngine, SearchIndex, TypesenseClient};
use shutter_vector_store::{MemoryStore, PgStore, PrimaryStore};
use std::sync::Arc;
use std::time::Duration;

/// Adapters the services are assembled from.
pub struct Backends {
    pub store: Arc<dyn PrimaryStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub embedder: Arc<dyn ImageEmbedder>,
    pub extractor: Arc<dyn AttributeExtractor>,
    pub engine: Arc<dyn SearchEngine>,
}

/// Composition root shared by the HTTP handlers and the operator commands.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn PrimaryStore>,
    pub index: SearchIndex,
    pub projector: Projector,
    pub coordinator: IndexingCoordinator,
    pub similarity: SimilaritySearch,
    pub lexical: LexicalSearch,
    pub metrics: Metrics,
}

impl AppState {
    /// Connects the configured backends. Postgres migrations run here.
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let backends = connect_backends(&config).await?;
        Self::assemble(config, backends)
    }

    pub fn assemble(config: AppConfig, backends: Backends) -> Result<Self> {
        let Backends {
            store,
            objects,
            embedder,
            extractor,
            engine,
        } = backends;

        let index = SearchIndex::new(engine);
        let projector = Projector::new(store.clone(), index.clone(), config.projector_config());
        let coordinator = IndexingCoordinator::new(
            store.clone(),
            objects.clone(),
            embedder.clone(),
            extractor,
            projector.clone(),
            config.coordinator_config(),
        );
        let similarity =
            SimilaritySearch::new(store.clone(), objects, embedder, config.similarity_config());
        let lexical = LexicalSearch::new(index.clone());
        let metrics = Metrics::new().context("Failed to register metrics")?;

        Ok(Self {
            config,
            store,
            index,
            projector,
            coordinator,
            similarity,
            lexical,
            metrics,
        })
    }

    /// Pulls projector state into the metric series before a scrape.
    pub async fn refresh_metrics(&self) {
        self.metrics
            .sync_projection_failures(self.projector.failure_count());
        match self.projector.pending().await {
            Ok(pending) => self.metrics.set_outbox_pending(pending),
            Err(err) => log::warn!("Could not count pending projections: {err}"),
        }
    }
}

async fn connect_backends(config: &AppConfig) -> Result<Backends> {
    let client = http_client(Duration::from_secs(config.embeddings.timeout_secs))
        .context("Failed to build HTTP client")?;

    let embedder: Arc<dyn ImageEmbedder> = match (config.embeddings.mode, config.embeddings.provider)
    {
        (EmbeddingMode::Stub, _) => Arc::new(StubEmbedder::new(config.embeddings.dimension)),
        (EmbeddingMode::Remote, EmbeddingProvider::Visual) => {
            let api_key = config
                .embeddings
                .jina_api_key
                .clone()
                .context("JINA_API_KEY is not set")?;
            let mut jina = JinaConfig::new(api_key);
            jina.model = config.embeddings.jina_model.clone();
            Arc::new(JinaEmbedder::new(client.clone(), jina))
        }
        (EmbeddingMode::Remote, EmbeddingProvider::Face) => {
            let url = config
                .embeddings
                .face_url
                .clone()
                .context("FACE_EMBEDDING_URL is not set")?;
            let mut face = FaceConfig::new(url);
            face.api_key = config.embeddings.face_api_key.clone();
            Arc::new(FaceEmbedder::new(client.clone(), face))
        }
    };
    log::info!(
        "Embeddings: {} ({} dimensions)",
        embedder.model_id(),
        embedder.dimension()
    );

    let extractor: Arc<dyn AttributeExtractor> = if config.extraction.enabled {
        let api_key = config
            .extraction
            .api_key
            .clone()
            .context("VISION_API_KEY is not set")?;
        let mut vision = VisionConfig::new(api_key);
        if let Some(base_url) = &config.extraction.base_url {
            vision.base_url = base_url.clone();
        }
        if let Some(model) = &config.extraction.model {
            vision.model = model.clone();
        }
        Arc::new(VisionExtractor::new(client.clone(), vision))
    } else {
        Arc::new(NoopExtractor)
    };

    let objects: Arc<dyn ObjectStore> = match config.object_store.kind {
        ObjectStoreKind::Memory => Arc::new(MemoryObjectStore::new()),
        ObjectStoreKind::Cloudinary => {
            let section = &config.object_store;
            let (Some(cloud_name), Some(api_key), Some(api_secret)) = (
                section.cloud_name.clone(),
                section.api_key.clone(),
                section.api_secret.clone(),
            ) else {
                anyhow::bail!("Cloudinary credentials are incomplete");
            };
            Arc::new(CloudinaryStore::new(
                client.clone(),
                CloudinaryConfig::new(cloud_name, api_key, api_secret),
            ))
        }
    };

    let store: Arc<dyn PrimaryStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new(embedder.dimension())),
        StoreBackend::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .context("SHUTTER_DATABASE_URL is not set")?;
            let pg = PgStore::connect(url, config.store.max_connections, embedder.dimension())
                .await
                .context("Failed to connect to Postgres")?;
            pg.migrate().await.context("Failed to run migrations")?;
            Arc::new(pg)
        }
    };

    let engine: Arc<dyn SearchEngine> = match config.search.engine {
        EngineBackend::Memory => Arc::new(MemoryEngine::new()),
        EngineBackend::Typesense => {
            let typesense = config.typesense();
            log::info!("Search engine: Typesense at {}", typesense.base_url());
            Arc::new(
                TypesenseClient::new(&typesense).context("Failed to build Typesense client")?,
            )
        }
    };

    Ok(Backends {
        store,
        objects,
        embedder,
        extractor,
        engine,
    })
}
