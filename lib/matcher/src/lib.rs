//! # Cardex Matcher
//!
//! Identifies a trading card from a photo by scoring OCR text against the
//! catalog, falling back to image embedding similarity when the best text
//! scores tie.
//!
//! ## Features
//!
//! - **Text signals**: cleaned fragments and exact `number/total` readings
//! - **Additive scoring**: number (+100), name (+20), each attack (+10)
//! - **Visual tie-break**: cosine similarity among tied candidates only
//! - **Derivations**: every decision records how it was reached
//!
//! ## Example
//!
//! ```rust
//! use cardex_matcher::{CandidateScorer, OcrReading, TextSignals};
//! use cardex_core::CatalogEntry;
//!
//! let card = CatalogEntry::new("sv3-125", "Charizard ex")
//!     .with_number("125")
//!     .with_set("sv3", "Obsidian Flames", 197)
//!     .with_attack("Brave Wing");
//!
//! let reading = OcrReading::from_spans(["Charizard ex", "Brave Wing 60", "125/197"]);
//! let signals = TextSignals::extract(&reading);
//!
//! let breakdown = CandidateScorer::new().score(&card, &signals);
//! assert_eq!(breakdown.total(), 130);
//! ```

pub mod collaborator;
pub mod decision;
pub mod engine;
pub mod query_image;
pub mod score;
pub mod text;

pub use collaborator::{Embedder, EmbeddingError, OcrError, TextRecognizer};
pub use decision::{
    Derivation, MatchDecision, MatchMethod, MatchOutcome, NoMatchReason, RankedCandidate, TieBreakScore,
};
pub use engine::{MatchEngine, MissingCatalogEntry, ScanError, ScoredCandidates, SimilarCard};
pub use query_image::{MalformedImage, QueryImage};
pub use score::{CandidateScore, CandidateScorer, ScoreBreakdown};
pub use text::{
    clean_text, deduplicate_and_rank, extract_number_fractions, normalize, NumberFraction, OcrReading,
    TextFragment, TextSignals,
};
