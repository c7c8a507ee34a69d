// Resumable progress for long index builds
use anyhow::{anyhow, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use cardex_core::IndexEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub model_name: String,
    pub entries: Vec<IndexEntry>,
    pub processed_files: BTreeSet<String>,
}

impl Checkpoint {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    pub fn is_processed(&self, filename: &str) -> bool {
        self.processed_files.contains(filename)
    }

    pub fn record(&mut self, entry: IndexEntry) {
        self.processed_files.insert(entry.filename.clone());
        self.entries.push(entry);
    }

    pub fn save(&self, path: &Path) -> Result<()> {
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
            .map_err(|e| anyhow!("Failed to write checkpoint {:?}: {}", path, e))?;
        debug!("Checkpoint saved: {} entries", self.entries.len());
        Ok(())
    }

    /// Resume state for `model_name`; a missing, unreadable or foreign
    /// checkpoint starts the build over
    pub fn load_or_new(path: &Path, model_name: &str) -> Self {
        let Ok(file) = File::open(path) else {
            return Self::new(model_name);
        };

        match bincode::deserialize_from::<_, Checkpoint>(BufReader::new(file)) {
            Ok(checkpoint) if checkpoint.model_name == model_name => checkpoint,
            Ok(checkpoint) => {
                warn!(
                    "Ignoring checkpoint for model {} (building {})",
                    checkpoint.model_name, model_name
                );
                Self::new(model_name)
            }
            Err(e) => {
                warn!("Ignoring unreadable checkpoint {:?}: {}", path, e);
                Self::new(model_name)
            }
        }
    }

    pub fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
