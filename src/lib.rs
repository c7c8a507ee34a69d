//! # Cardex
//!
//! Identifies trading cards from photos.
//!
//! A scan reads the printed text with OCR and scores every reference card
//! on three signals: the collector number (`58/102`), the card name and the
//! attack names. When several cards share the best score (reprints, alternate
//! arts), the photo is embedded and compared against the reference images of
//! the tied cards only.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! cardex download --data-dir ./store
//! cardex build-index --data-dir ./store --embed-url http://localhost:8081/embed
//! cardex serve --data-dir ./store --ocr-url http://localhost:8080/ocr \
//!     --embed-url http://localhost:8081/embed
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use cardex::prelude::*;
//!
//! let card = CatalogEntry::new("base1-58", "Pikachu")
//!     .with_number("58")
//!     .with_set("base1", "Base", 102);
//!
//! let signals = TextSignals::extract(&OcrReading::from_spans(["Pikachu", "58/102"]));
//! let breakdown = CandidateScorer::new().score(&card, &signals);
//! assert_eq!(breakdown.total(), 120);
//! ```
//!
//! ## Crate Structure
//!
//! - `cardex-core` - vectors, catalog records, the embedding index
//! - `cardex-matcher` - text signals, scoring and the disambiguation engine
//! - `cardex-storage` - catalog download and loading, index snapshots, index builds
//! - `cardex-api` - REST API and HTTP-backed OCR/embedding clients

// Re-export core types
pub use cardex_core::{
    CardSummary, CatalogEntry, CatalogStore, EmbeddingIndex, Error, InMemoryCatalog, IndexEntry,
    Neighbor, Result, Vector,
};

// Re-export matching
pub use cardex_matcher::{
    CandidateScorer, Embedder, MatchDecision, MatchEngine, MatchMethod, MatchOutcome, NoMatchReason,
    OcrReading, QueryImage, ScanError, TextRecognizer, TextSignals,
};

// Re-export storage
pub use cardex_storage::{
    BuildConfig, CatalogDownloader, CatalogSource, DownloadConfig, DownloadReport, IndexBuilder, IndexSnapshot,
    StorageManager, TcgApiClient,
};

// Re-export API
pub use cardex_api::{AppState, RemoteEmbedder, RemoteOcr, RestApi, ServerConfig};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CandidateScorer, CatalogEntry, CatalogStore, EmbeddingIndex, Embedder, InMemoryCatalog,
        IndexEntry, MatchEngine, MatchOutcome, OcrReading, QueryImage, StorageManager, TextRecognizer,
        TextSignals, Vector,
    };
}

/// SIMD-optimized vector operations
pub mod simd {
    pub use cardex_core::simd::{dot_product_simd, norm_simd};
}
