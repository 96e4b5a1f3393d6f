//! Brand vocabulary loaded once at startup from a JSON file.
//!
//! File shape:
//! ```json
//! {
//!   "Balenciaga":  { "variants": ["balenciaga", "バレンシアガ"], "multiplier": 1.5 },
//!   "Rick Owens":  { "variants": ["rick owens", "リックオウエンス"], "multiplier": 1.8 }
//! }
//! ```
//! Bad entries are rejected at load time, not defaulted at use time.

use std::collections::HashMap;

use serde::Deserialize;

use crate::config::BANNED_KEYWORDS;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct BrandEntry {
    pub variants: Vec<String>,
    pub multiplier: f64,
}

/// Immutable brand table shared by the pollers and the scorer.
#[derive(Debug, Clone)]
pub struct BrandBook {
    /// Sorted by brand name. A title matching variants of two brands must
    /// resolve to the same brand (and score) in every process, so lookup
    /// order is fixed rather than hash-dependent.
    brands: Vec<(String, BrandEntry)>,
}

impl BrandBook {
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read brands file {path}: {e}")))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let table: HashMap<String, BrandEntry> = serde_json::from_str(raw)?;

        if table.is_empty() {
            return Err(AppError::Config("brand table is empty".to_string()));
        }
        for (name, entry) in &table {
            if entry.variants.is_empty() {
                return Err(AppError::Config(format!("brand {name:?} has no variants")));
            }
            if !entry.multiplier.is_finite() || entry.multiplier <= 0.0 {
                return Err(AppError::Config(format!(
                    "brand {name:?} has invalid multiplier {}",
                    entry.multiplier
                )));
            }
        }

        let mut brands: Vec<(String, BrandEntry)> = table.into_iter().collect();
        brands.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(Self { brands })
    }

    /// Match a listing title against the brand vocabulary. Brands are checked
    /// in sorted-name order; the first whose variant appears as a
    /// case-insensitive substring wins, so overlapping vocabularies resolve
    /// the same way everywhere.
    pub fn identify(&self, title: &str) -> Option<&str> {
        let title_lower = title.to_lowercase();
        self.brands
            .iter()
            .find(|(_, entry)| {
                entry
                    .variants
                    .iter()
                    .any(|v| title_lower.contains(&v.to_lowercase()))
            })
            .map(|(name, _)| name.as_str())
    }

    /// Score multiplier for a brand. Unmatched or absent brand defaults to 1.0.
    pub fn multiplier(&self, brand: Option<&str>) -> f64 {
        brand
            .and_then(|b| self.brands.iter().find(|(name, _)| name.as_str() == b))
            .map(|(_, e)| e.multiplier)
            .unwrap_or(1.0)
    }

    pub fn len(&self) -> usize {
        self.brands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
    }
}

/// Denylist check applied to titles before any other filtering.
pub fn has_banned_keyword(title: &str) -> Option<&'static str> {
    let title_lower = title.to_lowercase();
    BANNED_KEYWORDS
        .iter()
        .find(|kw| title_lower.contains(*kw))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"{
        "Balenciaga":  { "variants": ["balenciaga", "バレンシアガ"], "multiplier": 1.5 },
        "Rick Owens":  { "variants": ["rick owens"], "multiplier": 1.8 }
    }"#;

    #[test]
    fn identifies_brand_case_insensitive() {
        let book = BrandBook::from_json(TABLE).unwrap();
        assert_eq!(book.identify("BALENCIAGA oversized tee"), Some("Balenciaga"));
        assert_eq!(book.identify("バレンシアガ Tシャツ"), Some("Balenciaga"));
        assert_eq!(book.identify("plain vintage tee"), None);
    }

    #[test]
    fn multiplier_defaults_to_one() {
        let book = BrandBook::from_json(TABLE).unwrap();
        assert_eq!(book.multiplier(Some("Rick Owens")), 1.8);
        assert_eq!(book.multiplier(Some("Unknown Brand")), 1.0);
        assert_eq!(book.multiplier(None), 1.0);
    }

    #[test]
    fn rejects_invalid_multiplier_at_load() {
        let bad = r#"{ "X": { "variants": ["x"], "multiplier": 0.0 } }"#;
        assert!(BrandBook::from_json(bad).is_err());

        let bad = r#"{ "X": { "variants": [], "multiplier": 1.2 } }"#;
        assert!(BrandBook::from_json(bad).is_err());

        assert!(BrandBook::from_json("{}").is_err());
    }

    #[test]
    fn overlapping_vocabularies_resolve_deterministically() {
        let table = r#"{
            "Raf Simons": { "variants": ["raf simons"], "multiplier": 1.8 },
            "Prada":      { "variants": ["prada"], "multiplier": 1.2 }
        }"#;
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let book = BrandBook::from_json(table).unwrap();
            let brand = book.identify("Prada by Raf Simons nylon jacket").unwrap();
            seen.insert(brand.to_string());
            assert_eq!(book.multiplier(Some(brand)), 1.2);
        }
        assert_eq!(seen.len(), 1);
        assert!(seen.contains("Prada"));
    }

    #[test]
    fn banned_keyword_matches_substring() {
        assert_eq!(has_banned_keyword("UNIQLO U crew neck"), Some("uniqlo"));
        assert!(has_banned_keyword("Balenciaga campaign hoodie").is_none());
    }
}
