//! Read-only place index.
//!
//! Loaded once from a JSON file produced by the gazetteer ingestion
//! tooling (out of scope here); consumed by the hub seeder and the
//! priority scorer. Lookups are by id and by kind.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Administrative kind of a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceKind {
    Country,
    Adm1,
    Adm2,
    City,
}

impl PlaceKind {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "country" => Some(Self::Country),
            "adm1" => Some(Self::Adm1),
            "adm2" => Some(Self::Adm2),
            "city" => Some(Self::City),
            _ => None,
        }
    }
}

/// One place record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub id: i64,
    pub name: String,
    /// Lowercased hyphenated form used in URLs ("united-kingdom").
    pub slug: String,
    pub kind: PlaceKind,
    pub country_code: String,
    #[serde(default)]
    pub population: u64,
}

/// In-memory place index.
#[derive(Debug, Default)]
pub struct Gazetteer {
    places: Vec<Place>,
    by_id: HashMap<i64, usize>,
}

impl Gazetteer {
    /// Load from a JSON array of place records.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read gazetteer {}", path.display()))?;
        let places: Vec<Place> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid gazetteer {}", path.display()))?;
        Ok(Self::from_places(places))
    }

    #[must_use]
    pub fn from_places(places: Vec<Place>) -> Self {
        let by_id = places
            .iter()
            .enumerate()
            .map(|(idx, p)| (p.id, idx))
            .collect();
        Self { places, by_id }
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<&Place> {
        self.by_id.get(&id).map(|&idx| &self.places[idx])
    }

    /// Places of the given kinds (all places when `kinds` is empty).
    pub fn of_kinds<'a>(&'a self, kinds: &'a [PlaceKind]) -> impl Iterator<Item = &'a Place> {
        self.places
            .iter()
            .filter(move |p| kinds.is_empty() || kinds.contains(&p.kind))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.places.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Population of a place, zero when unknown.
    #[must_use]
    pub fn population(&self, id: i64) -> u64 {
        self.get(id).map(|p| p.population).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample() -> Gazetteer {
        Gazetteer::from_places(vec![
            Place {
                id: 1,
                name: "France".into(),
                slug: "france".into(),
                kind: PlaceKind::Country,
                country_code: "FR".into(),
                population: 68_000_000,
            },
            Place {
                id: 2,
                name: "Lyon".into(),
                slug: "lyon".into(),
                kind: PlaceKind::City,
                country_code: "FR".into(),
                population: 520_000,
            },
        ])
    }

    #[test]
    fn test_lookup_and_filter() {
        let gaz = sample();
        assert_eq!(gaz.get(1).unwrap().slug, "france");
        assert_eq!(gaz.of_kinds(&[PlaceKind::Country]).count(), 1);
        assert_eq!(gaz.of_kinds(&[]).count(), 2);
        assert_eq!(gaz.population(2), 520_000);
        assert_eq!(gaz.population(99), 0);
    }
}
