// Index snapshots: the read-only artifact the serving engine loads at boot
use anyhow::{anyhow, Context, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use cardex_core::{EmbeddingIndex, IndexEntry};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Snapshot description for logs and API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDescription {
    pub name: String,
    pub creation_time: String,
    pub size: u64,
    pub checksum: String,
    pub entries: usize,
}

/// Everything needed to rebuild an [`EmbeddingIndex`]
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub model_name: String,
    pub embedding_dim: usize,
    pub image_type: String,
    pub created_at: String,
    pub entries: Vec<IndexEntry>,
}

impl IndexSnapshot {
    pub fn from_index(index: &EmbeddingIndex, image_type: &str) -> Self {
        Self {
            model_name: index.model_name().to_string(),
            embedding_dim: index.dim(),
            image_type: image_type.to_string(),
            created_at: Utc::now().to_rfc3339(),
            entries: index.entries().to_vec(),
        }
    }

    /// Write with bincode, atomically replacing any previous snapshot
    pub fn save(&self, path: &Path) -> Result<SnapshotDescription> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
            .write(|file| {
                let mut writer = BufWriter::new(file);
                bincode::serialize_into(&mut writer, self)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                writer.flush()
            })
            .map_err(|e| anyhow!("Failed to write snapshot {:?}: {}", path, e))?;

        let description = describe(path, self.entries.len())?;
        info!(
            "Index snapshot saved: {} ({} entries, {} bytes)",
            description.name, description.entries, description.size
        );
        Ok(description)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Index snapshot not found: {:?}", path))?;
        let snapshot: IndexSnapshot = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| anyhow!("Deserialization error in {:?}: {}", path, e))?;
        Ok(snapshot)
    }

    /// Validate dimensions and build the queryable index
    pub fn into_index(self) -> Result<EmbeddingIndex> {
        EmbeddingIndex::from_entries(self.model_name, self.embedding_dim, self.entries)
            .map_err(|e| anyhow!("Corrupt index snapshot: {}", e))
    }

    /// Human-readable metadata dump next to the binary snapshot
    pub fn export_metadata_json(&self, path: &Path) -> Result<()> {
        #[derive(Serialize)]
        struct MetadataRow<'a> {
            filename: &'a str,
            card_id: &'a str,
            #[serde(flatten)]
            summary: &'a cardex_core::CardSummary,
            embedding_model: &'a str,
        }

        let rows: Vec<MetadataRow<'_>> = self
            .entries
            .iter()
            .map(|e| MetadataRow {
                filename: &e.filename,
                card_id: &e.card_id,
                summary: &e.summary,
                embedding_model: &self.model_name,
            })
            .collect();

        let json = serde_json::to_vec_pretty(&rows)?;
        AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
            .write(|file| file.write_all(&json))
            .map_err(|e| anyhow!("Failed to write metadata {:?}: {}", path, e))?;
        Ok(())
    }
}

fn describe(path: &Path, entries: usize) -> Result<SnapshotDescription> {
    let data = fs::read(path)?;
    let checksum = format!("{:x}", Sha256::digest(&data));
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    Ok(SnapshotDescription {
        name,
        creation_time: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        size: data.len() as u64,
        checksum,
        entries,
    })
}
