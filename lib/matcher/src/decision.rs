//! Match outcomes and how they were derived
//!
//! A [`MatchDecision`] carries the chosen card together with a
//! [`Derivation`] that records the signals, the leading candidates and, when
//! it ran, the visual tie-break.

use crate::score::{CandidateScore, ScoreBreakdown};
use crate::text::{NumberFraction, TextFragment};
use cardex_core::CatalogEntry;
use serde::Serialize;
use std::fmt;

/// Number of leading candidates kept in a derivation
pub const DERIVATION_TOP_CANDIDATES: usize = 3;

/// Which resolution path produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchMethod {
    /// A single candidate held the highest score
    #[serde(rename = "Scoring")]
    Scoring,
    /// Several candidates shared the highest score; image similarity picked one
    #[serde(rename = "Scoring with Image Tie-break")]
    ImageTieBreak,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMethod::Scoring => f.write_str("Scoring"),
            MatchMethod::ImageTieBreak => f.write_str("Scoring with Image Tie-break"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub card_id: String,
    pub name: Option<String>,
    pub score: u32,
    pub position: usize,
}

impl RankedCandidate {
    pub fn new(candidate: &CandidateScore, name: Option<String>) -> Self {
        Self {
            card_id: candidate.card_id.clone(),
            name,
            score: candidate.score,
            position: candidate.position,
        }
    }
}

/// Similarity of one tied candidate to the query photo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TieBreakScore {
    pub card_id: String,
    pub position: usize,
    pub similarity: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Derivation {
    pub fragments: Vec<TextFragment>,
    pub fractions: Vec<NumberFraction>,
    /// Candidates that scored above zero
    pub candidates: usize,
    /// Index entries whose card id was missing from the catalog
    pub skipped_entries: usize,
    pub top_candidates: Vec<RankedCandidate>,
    /// Winner's score breakdown
    pub breakdown: ScoreBreakdown,
    /// Present only when the tie-break ran, ordered best first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tie_break: Option<Vec<TieBreakScore>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDecision {
    #[serde(rename = "metadata")]
    pub card: CatalogEntry,
    pub score: u32,
    #[serde(rename = "match_method")]
    pub method: MatchMethod,
    /// Text evidence contributed to the decision
    pub ocr_confirmed: bool,
    pub derivation: Derivation,
}

/// Why a scan ended without a card
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NoMatchReason {
    /// No catalog entry scored above zero
    NoCandidates,
    /// Scores tied and the query embedding could not be computed
    EmbeddingFailed { detail: String },
}

impl fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoMatchReason::NoCandidates => f.write_str("no card scored above zero"),
            NoMatchReason::EmbeddingFailed { detail } => {
                write!(f, "tie-break embedding failed: {}", detail)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(Box<MatchDecision>),
    NoMatch(NoMatchReason),
}

impl MatchOutcome {
    pub fn decision(&self) -> Option<&MatchDecision> {
        match self {
            MatchOutcome::Matched(decision) => Some(&**decision),
            MatchOutcome::NoMatch(_) => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }
}
