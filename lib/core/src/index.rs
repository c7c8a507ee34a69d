//! Immutable embedding index over reference card images
//!
//! Every entry holds a unit-length vector, so cosine similarity against a
//! query is a single dot product divided by the query norm. The index is
//! built once (offline or at boot) and only read afterwards; share it
//! behind an `Arc` across concurrent scans.

use crate::{CatalogEntry, Error, Result, Vector};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Display fields copied from the catalog when the index was built
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardSummary {
    pub name: Option<String>,
    pub number: Option<String>,
    pub set_id: Option<String>,
    pub set_name: Option<String>,
    pub supertype: Option<String>,
    pub rarity: Option<String>,
    pub artist: Option<String>,
}

impl CardSummary {
    pub fn from_entry(entry: &CatalogEntry) -> Self {
        Self {
            name: entry.name.clone(),
            number: entry.number.clone(),
            set_id: entry.set.as_ref().map(|s| s.id.clone()),
            set_name: entry.set.as_ref().and_then(|s| s.name.clone()),
            supertype: entry.supertype.clone(),
            rarity: entry.rarity.clone(),
            artist: entry.artist.clone(),
        }
    }
}

/// One processed reference image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub card_id: String,
    /// Source image the vector was computed from
    pub filename: String,
    pub vector: Vector,
    pub summary: CardSummary,
}

impl IndexEntry {
    pub fn new(card_id: impl Into<String>, filename: impl Into<String>, vector: Vector) -> Self {
        Self {
            card_id: card_id.into(),
            filename: filename.into(),
            vector,
            summary: CardSummary::default(),
        }
    }

    #[must_use]
    pub fn with_summary(mut self, summary: CardSummary) -> Self {
        self.summary = summary;
        self
    }
}

/// A similarity hit, addressed by position in the index
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub position: usize,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    model_name: String,
    dim: usize,
    entries: Vec<IndexEntry>,
}

impl EmbeddingIndex {
    /// Build an index, normalizing any vector that is not already unit length.
    ///
    /// Fails if an entry has the wrong dimension or an all-zero vector.
    pub fn from_entries(
        model_name: impl Into<String>,
        dim: usize,
        mut entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("embedding dimension must be positive".to_string()));
        }

        for entry in &mut entries {
            if entry.vector.dim() != dim {
                return Err(Error::InvalidDimension {
                    expected: dim,
                    actual: entry.vector.dim(),
                });
            }
            if !entry.vector.is_unit() {
                entry.vector.normalize()?;
            }
        }

        Ok(Self {
            model_name: model_name.into(),
            dim,
            entries,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn get(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    /// Rank a subset of index positions by similarity to `query`.
    ///
    /// Ordering is by descending similarity; exact ties keep the order the
    /// positions were given in.
    pub fn nearest(&self, query: &Vector, subset: &[usize]) -> Result<Vec<Neighbor>> {
        let query_norm = self.check_query(query)?;

        let mut hits = Vec::with_capacity(subset.len());
        for &position in subset {
            let entry = self.entries.get(position).ok_or(Error::PositionOutOfRange {
                position,
                len: self.entries.len(),
            })?;
            hits.push(Neighbor {
                position,
                similarity: similarity(query, query_norm, &entry.vector)?,
            });
        }

        // stable: equal similarities stay in subset order
        hits.sort_by_key(|hit| Reverse(OrderedFloat(hit.similarity)));
        Ok(hits)
    }

    /// The `k` most similar entries in the whole index
    pub fn top_k(&self, query: &Vector, k: usize) -> Result<Vec<Neighbor>> {
        let query_norm = self.check_query(query)?;

        let mut hits: Vec<Neighbor> = self
            .entries
            .par_iter()
            .enumerate()
            .map(|(position, entry)| {
                Ok(Neighbor {
                    position,
                    similarity: similarity(query, query_norm, &entry.vector)?,
                })
            })
            .collect::<Result<_>>()?;

        hits.sort_by_key(|hit| (Reverse(OrderedFloat(hit.similarity)), hit.position));
        hits.truncate(k);
        Ok(hits)
    }

    fn check_query(&self, query: &Vector) -> Result<f32> {
        if query.dim() != self.dim {
            return Err(Error::InvalidDimension {
                expected: self.dim,
                actual: query.dim(),
            });
        }
        Ok(query.norm())
    }
}

/// Cosine similarity against a unit-length stored vector
#[inline]
fn similarity(query: &Vector, query_norm: f32, stored: &Vector) -> Result<f32> {
    if query_norm <= f32::EPSILON {
        return Ok(0.0);
    }
    Ok(query.dot(stored)? / query_norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, data: Vec<f32>) -> IndexEntry {
        IndexEntry::new(id, format!("{}_large.png", id), Vector::new(data))
    }

    fn sample_index() -> EmbeddingIndex {
        EmbeddingIndex::from_entries(
            "ViT-B-32",
            3,
            vec![
                entry("a", vec![1.0, 0.0, 0.0]),
                entry("b", vec![0.0, 1.0, 0.0]),
                entry("c", vec![0.0, 0.0, 2.0]),
                entry("d", vec![1.0, 1.0, 0.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_vectors_normalized_on_build() {
        let index = sample_index();
        assert!(index.entries().iter().all(|e| e.vector.is_unit()));
        assert_eq!(index.len(), 4);
        assert_eq!(index.dim(), 3);
    }

    #[test]
    fn test_build_rejects_wrong_dimension() {
        let result = EmbeddingIndex::from_entries("m", 3, vec![entry("a", vec![1.0, 0.0])]);
        assert!(matches!(result, Err(Error::InvalidDimension { expected: 3, actual: 2 })));
    }

    #[test]
    fn test_top_k_ranks_whole_index() {
        let index = sample_index();
        let hits = index.top_k(&Vector::new(vec![0.9, 0.1, 0.0]), 2).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 3);
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn test_nearest_restricted_subset() {
        let index = sample_index();
        let hits = index.nearest(&Vector::new(vec![0.0, 1.0, 0.0]), &[0, 2, 3]).unwrap();

        // b (position 1) is the best match globally but is not in the subset
        assert_eq!(hits.iter().map(|h| h.position).collect::<Vec<_>>(), vec![3, 0, 2]);
    }

    #[test]
    fn test_nearest_ties_keep_subset_order() {
        let index = sample_index();
        // equidistant from a and b
        let query = Vector::new(vec![1.0, 1.0, 0.0]);
        let hits = index.nearest(&query, &[1, 0]).unwrap();
        assert_eq!(hits[0].position, 1);
        assert_eq!(hits[1].position, 0);
        assert!((hits[0].similarity - hits[1].similarity).abs() < 1e-6);
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = sample_index();
        let query = Vector::new(vec![1.0, 0.0]);
        assert!(matches!(
            index.top_k(&query, 1),
            Err(Error::InvalidDimension { expected: 3, actual: 2 })
        ));
        assert!(index.nearest(&query, &[0]).is_err());
    }

    #[test]
    fn test_nearest_out_of_range() {
        let index = sample_index();
        let query = Vector::new(vec![1.0, 0.0, 0.0]);
        assert!(matches!(
            index.nearest(&query, &[9]),
            Err(Error::PositionOutOfRange { position: 9, len: 4 })
        ));
    }

    #[test]
    fn test_unnormalized_query_gives_cosine() {
        let index = sample_index();
        let hits = index.top_k(&Vector::new(vec![5.0, 0.0, 0.0]), 1).unwrap();
        assert!((hits[0].similarity - 1.0).abs() < 1e-5);
    }
}
