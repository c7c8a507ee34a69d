//! Candidate scoring
//!
//! Each check is independent and additive. A number match is close to
//! proof of identity; name and attack hits corroborate it.

use crate::text::{clean_text, NumberFraction, TextFragment, TextSignals};
use cardex_core::CatalogEntry;
use serde::Serialize;

pub const NUMBER_MATCH_POINTS: u32 = 100;
pub const NAME_MATCH_POINTS: u32 = 20;
pub const ATTACK_MATCH_POINTS: u32 = 10;

/// Shorter fragments ("ex", "hp") would match far too many names
pub const MIN_NAME_FRAGMENT_LEN: usize = 4;

/// Which checks fired for one catalog entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    /// Fraction that matched both the card number and the set total
    pub number_match: Option<NumberFraction>,
    /// Fragment that matched the card name
    pub name_match: Option<TextFragment>,
    /// Every attack whose name was found in the text, one entry per attack
    pub attack_matches: Vec<String>,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        let mut score = 0;
        if self.number_match.is_some() {
            score += NUMBER_MATCH_POINTS;
        }
        if self.name_match.is_some() {
            score += NAME_MATCH_POINTS;
        }
        score + ATTACK_MATCH_POINTS * self.attack_matches.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// A catalog entry that scored above zero during a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateScore {
    pub card_id: String,
    pub score: u32,
    /// Position of the originating entry in the embedding index
    pub position: usize,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateScorer;

impl CandidateScorer {
    pub fn new() -> Self {
        Self
    }

    /// Run every check against one entry
    pub fn score(&self, entry: &CatalogEntry, signals: &TextSignals) -> ScoreBreakdown {
        ScoreBreakdown {
            number_match: self.number_match(entry, &signals.fractions),
            name_match: self.name_match(entry, &signals.fragments),
            attack_matches: self.attack_matches(entry, &signals.fragments),
        }
    }

    /// First fraction equal, as strings, to `number/printed_total`
    pub fn number_match(&self, entry: &CatalogEntry, fractions: &[NumberFraction]) -> Option<NumberFraction> {
        let number = entry.number.as_deref()?;
        let total = entry.printed_total()?;

        fractions
            .iter()
            .find(|f| f.numerator == number && f.denominator == total)
            .cloned()
    }

    /// First long-enough fragment that contains, or is contained in, the cleaned name
    pub fn name_match(&self, entry: &CatalogEntry, fragments: &[TextFragment]) -> Option<TextFragment> {
        let name = clean_text(entry.name.as_deref()?);

        fragments
            .iter()
            .filter(|f| f.len() >= MIN_NAME_FRAGMENT_LEN)
            .find(|f| name.contains(f.as_str()) || f.contains(&name))
            .cloned()
    }

    /// Every attack whose cleaned name appears inside some fragment
    pub fn attack_matches(&self, entry: &CatalogEntry, fragments: &[TextFragment]) -> Vec<String> {
        entry
            .attack_names()
            .filter(|attack| {
                let cleaned = clean_text(attack);
                !cleaned.is_empty() && fragments.iter().any(|f| f.contains(&cleaned))
            })
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::{deduplicate_and_rank, extract_number_fractions};

    fn signals(spans: &[&str], raw: &str) -> TextSignals {
        TextSignals {
            fragments: deduplicate_and_rank(spans),
            fractions: extract_number_fractions(raw),
        }
    }

    fn charizard() -> CatalogEntry {
        CatalogEntry::new("sv3-125", "Charizard ex")
            .with_number("125")
            .with_set("sv3", "Obsidian Flames", 197)
            .with_attack("Brave Wing")
            .with_attack("Explosive Vortex")
    }

    #[test]
    fn test_number_match_scores_100() {
        let scorer = CandidateScorer::new();
        let breakdown = scorer.score(&charizard(), &signals(&[], "125/197"));
        assert_eq!(breakdown.total(), 100);
        assert_eq!(breakdown.number_match, Some(NumberFraction::new("125", "197")));
    }

    #[test]
    fn test_number_match_counted_once() {
        let scorer = CandidateScorer::new();
        let breakdown = scorer.score(&charizard(), &signals(&[], "125/197 and again 125 / 197"));
        assert_eq!(breakdown.total(), 100);
    }

    #[test]
    fn test_number_match_is_string_exact() {
        let scorer = CandidateScorer::new();
        let padded = CatalogEntry::new("x-49", "Oddish").with_number("049").with_set("x", "X", 182);
        let plain = CatalogEntry::new("y-49", "Oddish").with_number("49").with_set("y", "Y", 182);

        let reading = signals(&[], "049/182");
        assert!(scorer.number_match(&padded, &reading.fractions).is_some());
        assert!(scorer.number_match(&plain, &reading.fractions).is_none());

        let reading = signals(&[], "49/182");
        assert!(scorer.number_match(&padded, &reading.fractions).is_none());
        assert!(scorer.number_match(&plain, &reading.fractions).is_some());
    }

    #[test]
    fn test_number_requires_both_fields() {
        let scorer = CandidateScorer::new();
        assert!(scorer.number_match(&charizard(), &signals(&[], "125/198").fractions).is_none());

        let no_set = CatalogEntry::new("z", "Charizard").with_number("125");
        assert!(scorer.number_match(&no_set, &signals(&[], "125/197").fractions).is_none());
    }

    #[test]
    fn test_name_match_both_directions() {
        let scorer = CandidateScorer::new();
        // fragment inside name
        assert!(scorer.name_match(&charizard(), &signals(&["Chariz"], "").fragments).is_some());
        // name inside fragment
        assert!(scorer.name_match(&charizard(), &signals(&["Charizard ex HP330"], "").fragments).is_some());
        assert!(scorer.name_match(&charizard(), &signals(&["Blastoise"], "").fragments).is_none());
    }

    #[test]
    fn test_name_match_ignores_short_fragments() {
        let scorer = CandidateScorer::new();
        let breakdown = scorer.score(&charizard(), &signals(&["ex", "Cha"], ""));
        assert!(breakdown.name_match.is_none());
        assert_eq!(breakdown.total(), 0);
    }

    #[test]
    fn test_name_match_counted_once() {
        let scorer = CandidateScorer::new();
        let breakdown = scorer.score(&charizard(), &signals(&["Charizard", "Charizard ex", "izard"], ""));
        assert_eq!(breakdown.total(), 20);
        // longest fragment is tried first
        assert_eq!(breakdown.name_match.unwrap().as_str(), "charizardex");
    }

    #[test]
    fn test_unset_name_never_matches() {
        let scorer = CandidateScorer::new();
        let mut entry = charizard();
        entry.name = None;
        assert!(scorer.name_match(&entry, &signals(&["anything long"], "").fragments).is_none());
    }

    #[test]
    fn test_name_cleaning_to_empty_matches_any_long_fragment() {
        let scorer = CandidateScorer::new();
        let glyphs = CatalogEntry::new("q-1", "???");
        let matched = scorer.name_match(&glyphs, &deduplicate_and_rank(["Pikachu"]));
        assert_eq!(matched.unwrap().as_str(), "pikachu");

        let blank = CatalogEntry::new("q-2", "");
        assert_eq!(scorer.score(&blank, &signals(&["Pikachu"], "")).total(), NAME_MATCH_POINTS);

        // still gated by fragment length
        assert!(scorer.name_match(&glyphs, &deduplicate_and_rank(["ex"])).is_none());
    }

    #[test]
    fn test_attacks_accumulate() {
        let scorer = CandidateScorer::new();
        let breakdown = scorer.score(&charizard(), &signals(&["Brave Wing 60", "Explosive Vortex 330"], ""));
        assert_eq!(breakdown.attack_matches, vec!["Brave Wing", "Explosive Vortex"]);
        assert_eq!(breakdown.total(), 20);
    }

    #[test]
    fn test_adding_matching_attack_adds_exactly_ten() {
        let scorer = CandidateScorer::new();
        let reading = signals(&["Charizard ex", "Brave Wing", "Inferno Dance"], "125/197");

        let base = scorer.score(&charizard(), &reading).total();
        let extended = scorer.score(&charizard().with_attack("Inferno Dance"), &reading).total();
        assert_eq!(extended, base + ATTACK_MATCH_POINTS);

        // other entries unaffected
        let other = CatalogEntry::new("sv3-1", "Oddish").with_attack("Ram");
        assert_eq!(scorer.score(&other, &reading).total(), 0);
    }

    #[test]
    fn test_empty_attack_name_ignored() {
        let scorer = CandidateScorer::new();
        let entry = CatalogEntry::new("a", "Unown").with_attack("???");
        assert!(scorer.attack_matches(&entry, &signals(&["hidden power"], "").fragments).is_empty());
    }

    #[test]
    fn test_all_signals_combine() {
        let scorer = CandidateScorer::new();
        let reading = signals(&["Charizard ex", "Brave Wing", "Explosive Vortex"], "125/197");
        assert_eq!(scorer.score(&charizard(), &reading).total(), 100 + 20 + 10 + 10);
    }
}
