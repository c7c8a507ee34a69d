//! Text signal extraction
//!
//! Turns raw OCR spans into the two signals the scorer consumes: cleaned
//! text fragments and `number/total` readings.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

lazy_static! {
    // "049/182", "49 / 182", "49/ 182"
    static ref NUMBER_FRACTION: Regex = Regex::new(r"([0-9]+)\s*/\s*([0-9]+)").unwrap();
}

/// Raw output of the OCR collaborator for one image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrReading {
    /// Individually detected spans, in detection order
    pub spans: Vec<String>,
    /// All spans as one blob; fractions split across spans are found here
    pub raw_text: String,
}

impl OcrReading {
    /// Build a reading whose raw text is the spans joined by single spaces
    pub fn from_spans<I, S>(spans: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spans: Vec<String> = spans.into_iter().map(Into::into).collect();
        let raw_text = spans.join(" ");
        Self { spans, raw_text }
    }
}

/// A cleaned, lowercase, ASCII alphanumeric string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TextFragment(String);

impl TextFragment {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.contains(needle)
    }
}

impl fmt::Display for TextFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keep only ASCII letters and digits, lowercased
pub fn clean_text(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub fn normalize(span: &str) -> TextFragment {
    TextFragment(clean_text(span))
}

/// Normalize, drop duplicates and empties, order longest first.
///
/// Fragments of equal length keep the order they were first seen in.
pub fn deduplicate_and_rank<I, S>(spans: I) -> Vec<TextFragment>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut fragments: Vec<TextFragment> = spans
        .into_iter()
        .map(|span| normalize(span.as_ref()))
        .filter(|fragment| !fragment.is_empty() && seen.insert(fragment.clone()))
        .collect();

    fragments.sort_by(|a, b| b.len().cmp(&a.len()));
    fragments
}

/// A printed `number/total` reading, kept as the exact digits OCR produced
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NumberFraction {
    pub numerator: String,
    pub denominator: String,
}

impl NumberFraction {
    pub fn new(numerator: impl Into<String>, denominator: impl Into<String>) -> Self {
        Self {
            numerator: numerator.into(),
            denominator: denominator.into(),
        }
    }
}

impl fmt::Display for NumberFraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// All non-overlapping `digits / digits` readings, in order of appearance
pub fn extract_number_fractions(raw_text: &str) -> Vec<NumberFraction> {
    NUMBER_FRACTION
        .captures_iter(raw_text)
        .map(|caps| NumberFraction::new(&caps[1], &caps[2]))
        .collect()
}

/// Everything the scorer needs from one scan
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextSignals {
    pub fragments: Vec<TextFragment>,
    pub fractions: Vec<NumberFraction>,
}

impl TextSignals {
    pub fn extract(reading: &OcrReading) -> Self {
        Self {
            fragments: deduplicate_and_rank(&reading.spans),
            fractions: extract_number_fractions(&reading.raw_text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty() && self.fractions.is_empty()
    }
}
