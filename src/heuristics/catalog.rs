// src/heuristics/catalog.rs

use serde::{Deserialize, Serialize};

/// Estimated price for an item the catalog does not know.
pub const DEFAULT_ESTIMATED_PRICE: f64 = 3.00;

/// One canonical item with its Dutch/English synonyms and an estimated unit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub canonical: String,
    pub price: f64,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl CatalogEntry {
    fn new(canonical: &str, price: f64, synonyms: &[&str]) -> Self {
        Self {
            canonical: canonical.to_string(),
            price,
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn answers_to(&self, word: &str) -> bool {
        self.canonical.eq_ignore_ascii_case(word)
            || self.synonyms.iter().any(|s| s.eq_ignore_ascii_case(word))
    }
}

/// Synonym table used to canonicalize item labels.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    default_price: f64,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            entries: vec![
                CatalogEntry::new("bier", 3.50, &["beer", "biertje"]),
                CatalogEntry::new("cola", 2.50, &[]),
                CatalogEntry::new("koffie", 2.00, &["coffee"]),
                CatalogEntry::new("thee", 2.00, &["tea"]),
                CatalogEntry::new("wijn", 4.50, &["wine"]),
                CatalogEntry::new("pizza", 8.50, &[]),
            ],
            default_price: DEFAULT_ESTIMATED_PRICE,
        }
    }
}

impl Catalog {
    /// Built-in table extended by `extra`. An extra entry whose canonical name
    /// already exists replaces the built-in one.
    pub fn with_entries(extra: &[CatalogEntry], default_price: f64) -> Self {
        let mut catalog = Self {
            default_price,
            ..Self::default()
        };
        for entry in extra {
            match catalog
                .entries
                .iter_mut()
                .find(|e| e.canonical.eq_ignore_ascii_case(&entry.canonical))
            {
                Some(existing) => *existing = entry.clone(),
                None => catalog.entries.push(entry.clone()),
            }
        }
        catalog
    }

    pub fn lookup(&self, word: &str) -> Option<&CatalogEntry> {
        let word = word.trim();
        self.entries.iter().find(|e| e.answers_to(word))
    }

    pub fn is_item_word(&self, word: &str) -> bool {
        self.lookup(word).is_some()
    }

    /// Canonical label and estimated price. Unknown labels are kept as typed
    /// (lowercased, whitespace collapsed) at the default price.
    pub fn canonicalize(&self, label: &str) -> (String, f64) {
        let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
        match self.lookup(&label) {
            Some(entry) => (entry.canonical.clone(), entry.price),
            None => (label.to_lowercase(), self.default_price),
        }
    }

    pub fn default_price(&self) -> f64 {
        self.default_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonyms_map_to_canonical() {
        let catalog = Catalog::default();
        assert_eq!(catalog.canonicalize("Biertje"), ("bier".to_string(), 3.50));
        assert_eq!(catalog.canonicalize("beer"), ("bier".to_string(), 3.50));
        assert_eq!(catalog.canonicalize("coffee"), ("koffie".to_string(), 2.00));
    }

    #[test]
    fn test_unknown_item_gets_default_price() {
        let catalog = Catalog::default();
        assert_eq!(
            catalog.canonicalize("Witte   Wijn"),
            ("witte wijn".to_string(), DEFAULT_ESTIMATED_PRICE)
        );
        assert!(!catalog.is_item_word("Timo"));
    }

    #[test]
    fn test_extra_entries_extend_and_override() {
        let extra = vec![
            CatalogEntry::new("bier", 4.00, &["pils", "beer"]),
            CatalogEntry::new("bitterballen", 6.50, &["bitterbal"]),
        ];
        let catalog = Catalog::with_entries(&extra, 2.75);
        assert_eq!(catalog.canonicalize("pils"), ("bier".to_string(), 4.00));
        assert_eq!(catalog.canonicalize("bitterbal").1, 6.50);
        assert_eq!(catalog.canonicalize("nachos").1, 2.75);
        // overriding replaced the synonym list
        assert!(!catalog.is_item_word("biertje"));
    }
}
