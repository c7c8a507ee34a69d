use anyhow::{Context, Result};
use cardex_core::{CatalogEntry, EmbeddingIndex, InMemoryCatalog};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::snapshot::IndexSnapshot;

/// File-system layout of a Cardex data directory
///
/// ```text
/// <root>/data/all_cards.json
/// <root>/data/set_<set>.json
/// <root>/images/<set>-<number>_<name>_<type>.png
/// <root>/embeddings/search_index_<type>_<model>.bin
/// <root>/embeddings/metadata_<type>_<model>.json
/// ```
#[derive(Debug, Clone)]
pub struct StorageManager {
    root: PathBuf,
}

impl StorageManager {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir().join("all_cards.json")
    }

    pub fn set_path(&self, set_id: &str) -> PathBuf {
        self.data_dir().join(format!("set_{}.json", set_id))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn embeddings_dir(&self) -> PathBuf {
        self.root.join("embeddings")
    }

    pub fn index_path(&self, image_type: &str, model_name: &str) -> PathBuf {
        self.embeddings_dir()
            .join(format!("search_index_{}_{}.bin", image_type, model_slug(model_name)))
    }

    pub fn metadata_path(&self, image_type: &str, model_name: &str) -> PathBuf {
        self.embeddings_dir()
            .join(format!("metadata_{}_{}.json", image_type, model_slug(model_name)))
    }

    pub fn checkpoint_path(&self, image_type: &str, model_name: &str) -> PathBuf {
        self.embeddings_dir()
            .join(format!("checkpoint_{}_{}.bin", image_type, model_slug(model_name)))
    }

    pub fn load_catalog(&self) -> Result<InMemoryCatalog> {
        load_catalog(&self.catalog_path())
    }

    pub fn load_index(&self, image_type: &str, model_name: &str) -> Result<EmbeddingIndex> {
        let path = self.index_path(image_type, model_name);
        let index = IndexSnapshot::load(&path)?.into_index()?;
        info!(
            "Loaded {} index entries ({}, dim {}) from {:?}",
            index.len(),
            index.model_name(),
            index.dim(),
            path
        );
        Ok(index)
    }
}

/// Model names like `ViT-B/32` contain path separators
pub fn model_slug(model_name: &str) -> String {
    model_name.replace('/', "-")
}

/// Load the catalog export: a JSON array of card objects
pub fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    let file = File::open(path).with_context(|| format!("Card catalog not found: {:?}", path))?;
    let entries: Vec<CatalogEntry> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Malformed card catalog {:?}", path))?;

    let catalog = InMemoryCatalog::new(entries);
    info!("Loaded {} catalog entries from {:?}", cardex_core::CatalogStore::len(&catalog), path);
    Ok(catalog)
}
