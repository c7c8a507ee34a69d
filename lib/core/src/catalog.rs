//! Reference card catalog
//!
//! [`CatalogEntry`] mirrors the card objects published by the public TCG
//! API. Fields the matcher relies on are typed; everything else is kept in
//! [`CatalogEntry::extra`] so a match can hand back the full record.
//! Missing fields stay `None` rather than collapsing to empty strings, which
//! keeps the scorer's string comparisons exact.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// A count that the upstream API may publish either as a number or a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrintedCount {
    Number(u64),
    Text(String),
}

impl fmt::Display for PrintedCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintedCount::Number(n) => write!(f, "{}", n),
            PrintedCount::Text(s) => write!(f, "{}", s),
        }
    }
}

/// The set (expansion) a card was printed in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSet {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Total printed in the bottom corner of every card, e.g. the `182` in `049/182`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printed_total: Option<PrintedCount>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A named action printed on a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardImages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large: Option<String>,
}

/// One reference card with its canonical metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Collector number within the set; not necessarily numeric (`"TG05"`, `"049"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<CardSet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attacks: Vec<Attack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supertype: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtypes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<CardImages>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogEntry {
    /// Minimal entry, mostly useful for building fixtures
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            number: None,
            set: None,
            attacks: Vec::new(),
            supertype: None,
            subtypes: Vec::new(),
            types: Vec::new(),
            hp: None,
            rarity: None,
            artist: None,
            images: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_number(mut self, number: impl Into<String>) -> Self {
        self.number = Some(number.into());
        self
    }

    #[must_use]
    pub fn with_set(mut self, id: impl Into<String>, name: impl Into<String>, printed_total: u64) -> Self {
        self.set = Some(CardSet {
            id: id.into(),
            name: Some(name.into()),
            printed_total: Some(PrintedCount::Number(printed_total)),
            extra: Map::new(),
        });
        self
    }

    #[must_use]
    pub fn with_attack(mut self, name: impl Into<String>) -> Self {
        self.attacks.push(Attack {
            name: Some(name.into()),
            extra: Map::new(),
        });
        self
    }

    /// Printed set total rendered as a string, if known
    pub fn printed_total(&self) -> Option<String> {
        self.set
            .as_ref()
            .and_then(|s| s.printed_total.as_ref())
            .map(|t| t.to_string())
    }

    pub fn attack_names(&self) -> impl Iterator<Item = &str> {
        self.attacks.iter().filter_map(|a| a.name.as_deref())
    }

    /// File name the image downloader stores this card's picture under,
    /// e.g. `sv3-49_Charizard_ex_large.png`
    pub fn local_image_filename(&self, image_type: &str) -> Option<String> {
        let set_id = &self.set.as_ref()?.id;
        let number = self.number.as_deref()?;
        let name = self.name.as_deref()?.replace(' ', "_");
        Some(format!("{}-{}_{}_{}.png", set_id, number, name, image_type))
    }
}

/// Read-only lookup from card id to metadata
pub trait CatalogStore: Send + Sync {
    fn get_entry(&self, id: &str) -> Option<&CatalogEntry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Catalog held entirely in memory, loaded once at boot
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    entries: Vec<CatalogEntry>,
    by_id: AHashMap<String, usize>,
}

impl InMemoryCatalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let mut by_id = AHashMap::with_capacity(entries.len());
        for (pos, entry) in entries.iter().enumerate() {
            if by_id.contains_key(&entry.id) {
                warn!("Duplicate catalog id {}, keeping first occurrence", entry.id);
                continue;
            }
            by_id.insert(entry.id.clone(), pos);
        }
        Self { entries, by_id }
    }

    /// Entries in load order, duplicates excluded
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(pos, entry)| self.by_id.get(&entry.id) == Some(pos))
            .map(|(_, entry)| entry)
    }

    /// Map of expected local image filename to card, for the given image size
    pub fn filename_lookup(&self, image_type: &str) -> AHashMap<String, &CatalogEntry> {
        self.iter()
            .filter_map(|entry| {
                entry
                    .local_image_filename(image_type)
                    .map(|filename| (filename, entry))
            })
            .collect()
    }
}

impl CatalogStore for InMemoryCatalog {
    fn get_entry(&self, id: &str) -> Option<&CatalogEntry> {
        self.by_id.get(id).map(|&pos| &self.entries[pos])
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_api_card() {
        let raw = json!({
            "id": "sv3-125",
            "name": "Charizard ex",
            "number": "125",
            "set": {"id": "sv3", "name": "Obsidian Flames", "printedTotal": 197, "series": "Scarlet & Violet"},
            "attacks": [{"name": "Brave Wing", "damage": "60"}, {"name": "Explosive Vortex"}],
            "hp": "330",
            "tcgplayer": {"url": "https://example.invalid"}
        });
        let entry: CatalogEntry = serde_json::from_value(raw).unwrap();

        assert_eq!(entry.number.as_deref(), Some("125"));
        assert_eq!(entry.printed_total().as_deref(), Some("197"));
        assert_eq!(entry.attack_names().collect::<Vec<_>>(), vec!["Brave Wing", "Explosive Vortex"]);
        assert!(entry.extra.contains_key("tcgplayer"));
        assert!(entry.rarity.is_none());
    }

    #[test]
    fn test_missing_fields_stay_unset() {
        let entry: CatalogEntry = serde_json::from_value(json!({"id": "x-1"})).unwrap();
        assert!(entry.name.is_none());
        assert!(entry.number.is_none());
        assert!(entry.printed_total().is_none());
        assert!(entry.attacks.is_empty());
    }

    #[test]
    fn test_round_trip_keeps_unknown_keys() {
        let raw = json!({
            "id": "base1-4",
            "name": "Charizard",
            "set": {"id": "base1", "printedTotal": "102"},
            "legalities": {"unlimited": "Legal"}
        });
        let entry: CatalogEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(entry.printed_total().as_deref(), Some("102"));
        assert_eq!(serde_json::to_value(&entry).unwrap(), raw);
    }

    #[test]
    fn test_local_image_filename() {
        let entry = CatalogEntry::new("sv3-125", "Charizard ex")
            .with_number("125")
            .with_set("sv3", "Obsidian Flames", 197);
        assert_eq!(
            entry.local_image_filename("large").as_deref(),
            Some("sv3-125_Charizard_ex_large.png")
        );
        assert!(CatalogEntry::new("x", "No Set").local_image_filename("large").is_none());
    }

    #[test]
    fn test_in_memory_lookup_and_duplicates() {
        let catalog = InMemoryCatalog::new(vec![
            CatalogEntry::new("a", "First"),
            CatalogEntry::new("b", "Second"),
            CatalogEntry::new("a", "Shadowed"),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get_entry("a").and_then(|e| e.name.as_deref()), Some("First"));
        assert!(catalog.get_entry("missing").is_none());
    }
}
