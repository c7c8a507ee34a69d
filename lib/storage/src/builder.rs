//! Offline construction of the embedding index
//!
//! Walks the downloaded reference images, resolves each one to its catalog
//! entry by file name, embeds it and writes the snapshot the server loads.
//! Progress is checkpointed so an interrupted build resumes where it stopped.

use anyhow::{bail, Context, Result};
use cardex_core::{CardSummary, EmbeddingIndex, InMemoryCatalog, IndexEntry};
use cardex_matcher::{Embedder, QueryImage};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::checkpoint::Checkpoint;
use crate::manager::StorageManager;
use crate::snapshot::{IndexSnapshot, SnapshotDescription};

#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// `large` or `small`, the suffix of the image files to index
    pub image_type: String,
    pub embedding_dim: usize,
    /// Images embedded between checkpoints
    pub batch_size: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            image_type: "large".to_string(),
            embedding_dim: 512,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub indexed: usize,
    pub resumed: usize,
    pub skipped_unknown: usize,
    pub failed: usize,
    pub snapshot: SnapshotDescription,
}

pub struct IndexBuilder {
    storage: StorageManager,
    embedder: Arc<dyn Embedder>,
    config: BuildConfig,
}

impl IndexBuilder {
    pub fn new(storage: StorageManager, embedder: Arc<dyn Embedder>, config: BuildConfig) -> Self {
        Self {
            storage,
            embedder,
            config,
        }
    }

    pub fn build(&self, catalog: &InMemoryCatalog) -> Result<BuildReport> {
        let start = Instant::now();
        let model_name = self.embedder.model_name().to_string();
        let image_type = self.config.image_type.as_str();
        let checkpoint_path = self.storage.checkpoint_path(image_type, &model_name);

        let files = list_images(&self.storage.images_dir(), image_type)?;
        let by_filename = catalog.filename_lookup(image_type);
        info!(
            "Indexing {} {} images with {} ({} catalog entries have a local filename)",
            files.len(),
            image_type,
            model_name,
            by_filename.len()
        );

        let mut checkpoint = Checkpoint::load_or_new(&checkpoint_path, &model_name);
        let resumed = checkpoint.entries.len();
        if resumed > 0 {
            info!("Resuming from checkpoint with {} processed images", resumed);
        }

        let batch_size = self.config.batch_size.max(1);
        let mut since_checkpoint = 0;
        let mut skipped_unknown = 0;
        let mut failed = 0;

        for filename in &files {
            if checkpoint.is_processed(filename) {
                continue;
            }

            let Some(card) = by_filename.get(filename.as_str()) else {
                warn!("No catalog entry for image {}, skipping", filename);
                skipped_unknown += 1;
                continue;
            };

            let vector = match QueryImage::open(self.storage.images_dir().join(filename))
                .map_err(anyhow::Error::from)
                .and_then(|image| self.embedder.embed(&image).map_err(anyhow::Error::from))
            {
                Ok(vector) if vector.dim() == self.config.embedding_dim => vector,
                Ok(vector) => {
                    warn!(
                        "Embedding for {} has dimension {}, expected {}",
                        filename,
                        vector.dim(),
                        self.config.embedding_dim
                    );
                    failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Failed to embed {}: {}", filename, e);
                    failed += 1;
                    continue;
                }
            };

            checkpoint.record(
                IndexEntry::new(card.id.clone(), filename.clone(), vector)
                    .with_summary(CardSummary::from_entry(card)),
            );

            since_checkpoint += 1;
            if since_checkpoint >= batch_size {
                checkpoint.save(&checkpoint_path)?;
                info!("Processed {}/{} images", checkpoint.entries.len(), files.len());
                since_checkpoint = 0;
            }
        }

        if checkpoint.entries.is_empty() {
            bail!("No images could be indexed from {:?}", self.storage.images_dir());
        }

        let indexed = checkpoint.entries.len();
        let index = EmbeddingIndex::from_entries(model_name.clone(), self.config.embedding_dim, checkpoint.entries)
            .context("Checkpointed entries do not form a valid index")?;

        let snapshot = IndexSnapshot::from_index(&index, image_type);
        let description = snapshot.save(&self.storage.index_path(image_type, &model_name))?;
        snapshot.export_metadata_json(&self.storage.metadata_path(image_type, &model_name))?;
        Checkpoint::remove(&checkpoint_path)?;

        info!(
            "Index built in {:.2}s: {} entries ({} resumed, {} unknown, {} failed)",
            start.elapsed().as_secs_f64(),
            indexed,
            resumed,
            skipped_unknown,
            failed
        );

        Ok(BuildReport {
            indexed,
            resumed,
            skipped_unknown,
            failed,
            snapshot: description,
        })
    }
}

/// Image files ending in `_<image_type>.png`, sorted by name
fn list_images(dir: &Path, image_type: &str) -> Result<Vec<String>> {
    let suffix = format!("_{}.png", image_type);
    let mut files: Vec<String> = fs::read_dir(dir)
        .with_context(|| format!("Image directory not found: {:?}", dir))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(&suffix))
        .collect();
    files.sort();
    Ok(files)
}
