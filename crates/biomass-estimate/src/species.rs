use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Allometric and shape parameters of one species.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeciesProfile {
    /// Allometric coefficient in `weight = a · length^b`.
    pub a: f64,
    /// Allometric exponent.
    pub b: f64,
    /// Flattening of the body cross-section, `1.0` is circular.
    pub cross_section_ratio: f64,
    /// Mean weight of one individual in grams.
    pub avg_weight: f64,
    /// Mean volume of one individual in cm³.
    pub avg_volume: f64,
}

impl SpeciesProfile {
    pub const fn new(a: f64, b: f64, cross_section_ratio: f64, avg_weight: f64, avg_volume: f64) -> Self {
        Self {
            a,
            b,
            cross_section_ratio,
            avg_weight,
            avg_volume,
        }
    }

    fn validate(&self, name: &str) -> Result<(), CatalogError> {
        let invalid = |reason: &'static str| CatalogError::InvalidProfile {
            name: name.to_string(),
            reason,
        };
        if !(self.a.is_finite() && self.a > 0.0) {
            return Err(invalid("a must be positive"));
        }
        if !(self.b.is_finite() && self.b > 0.0) {
            return Err(invalid("b must be positive"));
        }
        if !(self.cross_section_ratio > 0.0 && self.cross_section_ratio <= 1.0) {
            return Err(invalid("cross_section_ratio must be in (0, 1]"));
        }
        if !(self.avg_weight >= 0.0 && self.avg_volume >= 0.0) {
            return Err(invalid("average weight and volume must be non-negative"));
        }
        Ok(())
    }
}

/// Profile used when no key matches.
pub const DEFAULT_PROFILE: SpeciesProfile = SpeciesProfile::new(0.012, 3.0, 0.5, 500.0, 500.0);

const BUILTIN: [(&str, SpeciesProfile); 13] = [
    ("catfish", SpeciesProfile::new(0.0046, 3.19, 0.80, 500.0, 500.0)),
    ("catla", SpeciesProfile::new(0.0200, 3.00, 0.45, 2000.0, 1950.0)),
    ("hilsa", SpeciesProfile::new(0.0158, 2.92, 0.40, 800.0, 780.0)),
    ("mackerel", SpeciesProfile::new(0.0045, 3.22, 0.55, 200.0, 190.0)),
    ("mud crab", SpeciesProfile::new(0.4300, 2.57, 0.30, 600.0, 550.0)),
    ("pomfret", SpeciesProfile::new(0.0324, 3.00, 0.15, 300.0, 290.0)),
    ("rohu", SpeciesProfile::new(0.0130, 3.05, 0.55, 1500.0, 1450.0)),
    ("salmon", SpeciesProfile::new(0.0100, 3.05, 0.55, 2500.0, 2400.0)),
    ("sardine", SpeciesProfile::new(0.0093, 2.95, 0.50, 100.0, 95.0)),
    ("shrimp", SpeciesProfile::new(0.0039, 3.21, 0.80, 30.0, 28.0)),
    ("three spotted crab", SpeciesProfile::new(0.1340, 2.63, 0.30, 200.0, 190.0)),
    ("3 spotted crab", SpeciesProfile::new(0.1340, 2.63, 0.30, 200.0, 190.0)),
    ("tuna", SpeciesProfile::new(0.0145, 3.03, 0.60, 5000.0, 4800.0)),
];

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("species '{name}': {reason}")]
    InvalidProfile { name: String, reason: &'static str },
    #[error("species name must not be empty")]
    EmptyName,
}

/// Species profiles keyed by lowercase name, with a default fallback.
///
/// Lookup is a case-insensitive substring match of each key inside the
/// queried label. When several keys match, the longest key wins; keys of
/// equal length resolve by insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeciesCatalog {
    entries: Vec<(String, SpeciesProfile)>,
    default: SpeciesProfile,
}

impl Default for SpeciesCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SpeciesCatalog {
    /// Empty catalog; every lookup returns `default`.
    pub fn new(default: SpeciesProfile) -> Self {
        Self {
            entries: Vec::new(),
            default,
        }
    }

    /// Fish and crustacean table shipped with the engine.
    pub fn builtin() -> Self {
        let mut catalog = Self::new(DEFAULT_PROFILE);
        for (name, profile) in BUILTIN {
            catalog.entries.push((name.to_string(), profile));
        }
        catalog
    }

    /// Insert or replace a profile. Names are stored lowercased and trimmed.
    pub fn insert(&mut self, name: &str, profile: SpeciesProfile) -> Result<(), CatalogError> {
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            return Err(CatalogError::EmptyName);
        }
        profile.validate(&key)?;
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = profile,
            None => self.entries.push((key, profile)),
        }
        Ok(())
    }

    /// Parse `{"name": {a, b, cross_section_ratio, avg_weight, avg_volume}, ...}`.
    ///
    /// An optional `"default"` entry replaces the built-in default profile.
    /// Entries are inserted in lexicographic key order.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let table: BTreeMap<String, SpeciesProfile> = serde_json::from_str(json)?;
        let mut catalog = Self::new(DEFAULT_PROFILE);
        for (name, profile) in table {
            if name.trim().eq_ignore_ascii_case("default") {
                profile.validate("default")?;
                catalog.default = profile;
            } else {
                catalog.insert(&name, profile)?;
            }
        }
        Ok(catalog)
    }

    #[inline]
    pub fn default_profile(&self) -> &SpeciesProfile {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SpeciesProfile)> {
        self.entries.iter().map(|(k, p)| (k.as_str(), p))
    }

    /// Key that `label` resolves to, if any.
    pub fn resolve(&self, label: &str) -> Option<&str> {
        self.best_match(label).map(|(k, _)| k.as_str())
    }

    /// Profile for `label`; never fails.
    pub fn lookup(&self, label: &str) -> &SpeciesProfile {
        self.best_match(label).map_or(&self.default, |(_, p)| p)
    }

    fn best_match(&self, label: &str) -> Option<&(String, SpeciesProfile)> {
        let query = label.to_lowercase();
        let mut best: Option<&(String, SpeciesProfile)> = None;
        for entry in &self.entries {
            if !query.contains(entry.0.as_str()) {
                continue;
            }
            if best.is_none_or(|b| entry.0.len() > b.0.len()) {
                best = Some(entry);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_substring() {
        let catalog = SpeciesCatalog::builtin();
        assert_eq!(catalog.lookup("Rohu Fish").a, 0.0130);
        assert_eq!(catalog.lookup("ATLANTIC SALMON").avg_weight, 2500.0);
        assert_eq!(catalog.resolve("Fish"), None);
        assert_eq!(*catalog.lookup("Fish"), DEFAULT_PROFILE);
    }

    #[test]
    fn longest_key_wins() {
        let mut catalog = SpeciesCatalog::new(DEFAULT_PROFILE);
        let short = SpeciesProfile::new(1.0, 1.0, 0.5, 1.0, 1.0);
        let long = SpeciesProfile::new(2.0, 2.0, 0.5, 2.0, 2.0);
        catalog.insert("crab", short).expect("insert");
        catalog.insert("mud crab", long).expect("insert");
        assert_eq!(catalog.resolve("Mud Crab"), Some("mud crab"));
        assert_eq!(*catalog.lookup("giant mud crab"), long);
        assert_eq!(*catalog.lookup("blue crab"), short);
    }

    #[test]
    fn equal_length_keys_resolve_by_insertion_order() {
        let mut catalog = SpeciesCatalog::new(DEFAULT_PROFILE);
        let first = SpeciesProfile::new(1.0, 3.0, 0.5, 10.0, 10.0);
        let second = SpeciesProfile::new(2.0, 3.0, 0.5, 20.0, 20.0);
        catalog.insert("tuna", first).expect("insert");
        catalog.insert("rohu", second).expect("insert");
        assert_eq!(catalog.resolve("rohu tuna"), Some("tuna"));
    }

    #[test]
    fn three_spotted_crab_spellings() {
        let catalog = SpeciesCatalog::builtin();
        assert_eq!(catalog.resolve("Three Spotted Crab"), Some("three spotted crab"));
        assert_eq!(catalog.resolve("3 spotted crab"), Some("3 spotted crab"));
    }

    #[test]
    fn json_catalog_with_default() {
        let json = r#"{
            "Tilapia": {"a": 0.02, "b": 3.0, "cross_section_ratio": 0.4, "avg_weight": 400, "avg_volume": 380},
            "default": {"a": 0.01, "b": 2.9, "cross_section_ratio": 0.6, "avg_weight": 100, "avg_volume": 90}
        }"#;
        let catalog = SpeciesCatalog::from_json(json).expect("catalog");
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.resolve("Nile tilapia"), Some("tilapia"));
        assert_eq!(catalog.lookup("carp").avg_weight, 100.0);
        assert_eq!(catalog.default_profile().b, 2.9);
    }

    #[test]
    fn json_rejects_bad_profiles() {
        let json = r#"{"eel": {"a": 0.0, "b": 3.0, "cross_section_ratio": 0.4, "avg_weight": 1, "avg_volume": 1}}"#;
        assert!(matches!(
            SpeciesCatalog::from_json(json),
            Err(CatalogError::InvalidProfile { .. })
        ));
        assert!(matches!(
            SpeciesCatalog::from_json("[1, 2]"),
            Err(CatalogError::Json(_))
        ));
    }
}
