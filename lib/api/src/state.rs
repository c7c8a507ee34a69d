use anyhow::{bail, Context, Result};
use cardex_matcher::{Embedder, MatchEngine, TextRecognizer};
use cardex_storage::StorageManager;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::remote::{RemoteEmbedder, RemoteOcr};

/// Everything `serve` needs to boot
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub http_port: u16,
    pub image_type: String,
    pub model_name: String,
    pub ocr_url: String,
    pub embed_url: String,
    pub embed_dim: usize,
}

/// Largest accepted photo upload
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Shared, read-only state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchEngine>,
    pub image_type: String,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(engine: Arc<MatchEngine>, image_type: impl Into<String>) -> Self {
        Self {
            engine,
            image_type: image_type.into(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Load catalog and index from disk and wire up the remote collaborators.
    ///
    /// Builds blocking HTTP clients, so call this before entering the
    /// actix runtime.
    pub fn bootstrap(config: &ServerConfig) -> Result<Self> {
        let storage = StorageManager::new(&config.data_dir);
        let catalog = storage.load_catalog()?;
        let index = storage.load_index(&config.image_type, &config.model_name)?;

        if index.model_name() != config.model_name {
            bail!(
                "Index was built with model {}, server configured for {}",
                index.model_name(),
                config.model_name
            );
        }
        if index.dim() != config.embed_dim {
            bail!(
                "Index dimension {} does not match configured embedding dimension {}",
                index.dim(),
                config.embed_dim
            );
        }

        let recognizer: Arc<dyn TextRecognizer> =
            Arc::new(RemoteOcr::new(&config.ocr_url).context("OCR client")?);
        let embedder: Arc<dyn Embedder> = Arc::new(
            RemoteEmbedder::new(&config.embed_url, &config.model_name, config.embed_dim)
                .context("Embedding client")?,
        );

        info!(
            "Engine ready: {} catalog entries, {} index entries ({} images)",
            cardex_core::CatalogStore::len(&catalog),
            index.len(),
            config.image_type
        );

        let engine = MatchEngine::new(Arc::new(catalog), Arc::new(index), recognizer, embedder);
        Ok(Self::new(Arc::new(engine), &config.image_type))
    }
}
