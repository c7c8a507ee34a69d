//! # Cardex Core
//!
//! Core data structures for the Cardex card identification service.
//!
//! - [`Vector`] - Dense embedding with SIMD dot product
//! - [`CatalogEntry`] / [`CatalogStore`] - Reference card metadata
//! - [`EmbeddingIndex`] - Immutable, queryable set of unit-norm image embeddings
//!
//! ## Example
//!
//! ```rust
//! use cardex_core::{EmbeddingIndex, IndexEntry, Vector};
//!
//! let index = EmbeddingIndex::from_entries(
//!     "ViT-B-32",
//!     3,
//!     vec![
//!         IndexEntry::new("sv3-125", "sv3-125_Charizard_ex_large.png", Vector::new(vec![1.0, 0.0, 0.0])),
//!         IndexEntry::new("sv3-126", "sv3-126_Gyarados_large.png", Vector::new(vec![0.0, 1.0, 0.0])),
//!     ],
//! )
//! .unwrap();
//!
//! let hits = index.top_k(&Vector::new(vec![0.9, 0.1, 0.0]), 1).unwrap();
//! assert_eq!(index.get(hits[0].position).unwrap().card_id, "sv3-125");
//! ```

pub mod catalog;
pub mod error;
pub mod index;
pub mod vector;

/// SIMD-optimized dot product and norm
///
/// - AVX2/FMA on x86_64
/// - NEON on ARM64/Apple Silicon
/// - scalar fallback elsewhere
pub mod simd;

pub use catalog::{Attack, CardImages, CardSet, CatalogEntry, CatalogStore, InMemoryCatalog, PrintedCount};
pub use error::{Error, Result};
pub use index::{CardSummary, EmbeddingIndex, IndexEntry, Neighbor};
pub use vector::Vector;
