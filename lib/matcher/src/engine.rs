//! Disambiguation engine
//!
//! One scan is a single synchronous pass:
//!
//! ```text
//! photo ──OCR──> TextSignals ──score every index entry──> candidates
//!                                                           │
//!                 none > 0 ──> NoMatch                      │
//!                 one best ──> Matched (Scoring)  <─────────┤
//!                 tied best ──embed photo──> argmax cosine ─┘
//!                                 │            └─> Matched (Image Tie-break)
//!                                 └─ failure ──> NoMatch
//! ```
//!
//! The engine holds only read-only handles and is shared across threads
//! behind an `Arc`. No scan observes or mutates state from another scan.

use crate::collaborator::{EmbeddingError, Embedder, OcrError, TextRecognizer};
use crate::decision::{
    Derivation, MatchDecision, MatchMethod, MatchOutcome, NoMatchReason, RankedCandidate,
    TieBreakScore, DERIVATION_TOP_CANDIDATES,
};
use crate::query_image::{MalformedImage, QueryImage};
use crate::score::{CandidateScore, CandidateScorer};
use crate::text::TextSignals;
use cardex_core::{CardSummary, CatalogEntry, CatalogStore, EmbeddingIndex, IndexEntry};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] MalformedImage),

    #[error("Text recognition failed: {0}")]
    Ocr(#[from] OcrError),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index query failed: {0}")]
    Index(#[from] cardex_core::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// An index entry whose card id is not in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCatalogEntry {
    pub card_id: String,
    pub position: usize,
}

/// Candidates from one scoring sweep, best first
#[derive(Debug, Clone, Default)]
pub struct ScoredCandidates {
    pub ranked: Vec<CandidateScore>,
    pub skipped_entries: usize,
}

impl ScoredCandidates {
    /// All candidates sharing the highest score, in ranking order
    pub fn best(&self) -> &[CandidateScore] {
        let Some(top) = self.ranked.first() else {
            return &[];
        };
        let tied = self.ranked.iter().take_while(|c| c.score == top.score).count();
        &self.ranked[..tied]
    }
}

/// A visually similar reference card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarCard {
    pub similarity: f32,
    pub card_id: String,
    pub filename: String,
    pub summary: CardSummary,
}

pub struct MatchEngine {
    catalog: Arc<dyn CatalogStore>,
    index: Arc<EmbeddingIndex>,
    recognizer: Arc<dyn TextRecognizer>,
    embedder: Arc<dyn Embedder>,
    scorer: CandidateScorer,
}

impl MatchEngine {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        index: Arc<EmbeddingIndex>,
        recognizer: Arc<dyn TextRecognizer>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            catalog,
            index,
            recognizer,
            embedder,
            scorer: CandidateScorer::new(),
        }
    }

    pub fn catalog(&self) -> &dyn CatalogStore {
        self.catalog.as_ref()
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    /// Identify the card in a photo.
    ///
    /// `Ok(NoMatch)` is a normal outcome; `Err` means the scan itself could
    /// not run (OCR failure).
    pub fn scan(&self, image: &QueryImage) -> Result<MatchOutcome> {
        let reading = self.recognizer.recognize(image)?;
        let signals = TextSignals::extract(&reading);
        info!(
            "OCR produced {} unique fragments, fractions: [{}]",
            signals.fragments.len(),
            signals
                .fractions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(self.resolve(&signals, image))
    }

    /// Score, rank and resolve pre-extracted signals
    pub fn resolve(&self, signals: &TextSignals, image: &QueryImage) -> MatchOutcome {
        let scored = self.score_candidates(signals);
        let best = scored.best();

        let Some(leader) = best.first() else {
            warn!("No card scored above zero ({} index entries skipped)", scored.skipped_entries);
            return MatchOutcome::NoMatch(NoMatchReason::NoCandidates);
        };

        let top_candidates: Vec<RankedCandidate> = scored
            .ranked
            .iter()
            .take(DERIVATION_TOP_CANDIDATES)
            .map(|c| RankedCandidate::new(c, self.card_name(&c.card_id)))
            .collect();
        info!(
            "Top candidates: {}",
            top_candidates
                .iter()
                .map(|c| format!("{} ({})", c.name.as_deref().unwrap_or(&c.card_id), c.score))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let (winner, method, tie_break) = if best.len() == 1 {
            debug!("Single best card by score");
            (leader, MatchMethod::Scoring, None)
        } else {
            info!("Score tie between {} cards, breaking with image similarity", best.len());
            match self.tie_break(best, image) {
                Ok((winner, ranking)) => (winner, MatchMethod::ImageTieBreak, Some(ranking)),
                Err(e) => {
                    warn!("Tie-break failed, refusing to guess: {}", e);
                    return MatchOutcome::NoMatch(NoMatchReason::EmbeddingFailed {
                        detail: e.to_string(),
                    });
                }
            }
        };

        // candidates only exist for resolvable ids
        let Some(card) = self.catalog.get_entry(&winner.card_id) else {
            return MatchOutcome::NoMatch(NoMatchReason::NoCandidates);
        };

        info!("Final match ({}): {}", method, card.name.as_deref().unwrap_or(&card.id));
        MatchOutcome::Matched(Box::new(MatchDecision {
            card: card.clone(),
            score: winner.score,
            method,
            ocr_confirmed: !winner.breakdown.is_empty(),
            derivation: Derivation {
                fragments: signals.fragments.clone(),
                fractions: signals.fractions.clone(),
                candidates: scored.ranked.len(),
                skipped_entries: scored.skipped_entries,
                top_candidates,
                breakdown: winner.breakdown.clone(),
                tie_break,
            },
        }))
    }

    /// Score every index entry; entries scoring zero are dropped.
    ///
    /// Ranking is by descending score; equal scores keep index order.
    pub fn score_candidates(&self, signals: &TextSignals) -> ScoredCandidates {
        let swept: Vec<std::result::Result<Option<CandidateScore>, MissingCatalogEntry>> = self
            .index
            .entries()
            .par_iter()
            .enumerate()
            .map(|(position, entry)| {
                let card = self.lookup(position, entry)?;
                let breakdown = self.scorer.score(card, signals);
                let score = breakdown.total();
                Ok((score > 0).then(|| CandidateScore {
                    card_id: card.id.clone(),
                    score,
                    position,
                    breakdown,
                }))
            })
            .collect();

        let mut scored = ScoredCandidates::default();
        for result in swept {
            match result {
                Ok(Some(candidate)) => scored.ranked.push(candidate),
                Ok(None) => {}
                Err(_) => scored.skipped_entries += 1,
            }
        }
        if scored.skipped_entries > 0 {
            debug!("Skipped {} index entries with no catalog record", scored.skipped_entries);
        }

        scored.ranked.sort_by(|a, b| b.score.cmp(&a.score));
        scored
    }

    /// Rank the whole index by visual similarity to a photo
    pub fn similar(&self, image: &QueryImage, k: usize) -> Result<Vec<SimilarCard>> {
        let query = self.embedder.embed(image)?;
        let hits = self.index.top_k(&query, k)?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                self.index.get(hit.position).map(|entry| SimilarCard {
                    similarity: hit.similarity,
                    card_id: entry.card_id.clone(),
                    filename: entry.filename.clone(),
                    summary: entry.summary.clone(),
                })
            })
            .collect())
    }

    fn lookup(
        &self,
        position: usize,
        entry: &IndexEntry,
    ) -> std::result::Result<&CatalogEntry, MissingCatalogEntry> {
        self.catalog
            .get_entry(&entry.card_id)
            .ok_or_else(|| MissingCatalogEntry {
                card_id: entry.card_id.clone(),
                position,
            })
    }

    /// Pick the tied candidate closest to the photo.
    ///
    /// Strict argmax; identical similarities resolve to the earlier candidate.
    fn tie_break<'a>(
        &self,
        tied: &'a [CandidateScore],
        image: &QueryImage,
    ) -> Result<(&'a CandidateScore, Vec<TieBreakScore>)> {
        let query = self.embedder.embed(image)?;
        let positions: Vec<usize> = tied.iter().map(|c| c.position).collect();
        let neighbors = self.index.nearest(&query, &positions)?;

        let ranking: Vec<TieBreakScore> = neighbors
            .iter()
            .filter_map(|n| {
                tied.iter().find(|c| c.position == n.position).map(|c| TieBreakScore {
                    card_id: c.card_id.clone(),
                    position: c.position,
                    similarity: n.similarity,
                })
            })
            .collect();

        let winner = neighbors
            .first()
            .and_then(|best| tied.iter().find(|c| c.position == best.position))
            .ok_or_else(|| EmbeddingError::InvalidResponse("tie-break produced no ranking".to_string()))?;

        Ok((winner, ranking))
    }

    fn card_name(&self, card_id: &str) -> Option<String> {
        self.catalog.get_entry(card_id).and_then(|c| c.name.clone())
    }
}
