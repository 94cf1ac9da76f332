//! Hub seeder: learned URL patterns × gazetteer places → candidate
//! hub mappings.
//!
//! For every hub-classified pattern on a host with a single wildcard
//! slug segment, each place's slug is substituted in to produce a
//! candidate URL. Candidates land with `status = candidate`; the depth
//! prober verifies them later.

use anyhow::Result;
use log::debug;

use crate::events::{EventBus, TaskEvent};
use crate::gazetteer::{Gazetteer, Place, PlaceKind};
use crate::storage::{PageKind, Storage};

/// Page kind inferred from the place kind.
fn page_kind_for(place: &Place) -> PageKind {
    match place.kind {
        PlaceKind::Country => PageKind::CountryHub,
        _ => PageKind::PlaceHub,
    }
}

/// Expand one hub pattern template into a concrete URL for a place.
///
/// Works on templates whose final segment is a slug wildcard, e.g.
/// `^/world/[a-z0-9-]+$` → `/world/{slug}`. Returns None for templates
/// that are not place-shaped (dates, multiple wildcards, no wildcard).
#[must_use]
pub fn instantiate_template(template: &str, slug: &str) -> Option<String> {
    let inner = template.strip_prefix('^')?.strip_suffix('$')?;
    let wildcard_count = inner.matches("[a-z0-9-]+").count();
    if wildcard_count != 1 || inner.contains(r"\d{") || inner.contains("[a-f0-9]+") {
        return None;
    }
    // Only the trailing segment may be the wildcard: hub URLs put the
    // place name last.
    if !inner.ends_with("[a-z0-9-]+") {
        return None;
    }
    Some(inner.replacen("[a-z0-9-]+", slug, 1))
}

/// Seed candidate mappings for a host.
pub struct HubSeeder {
    storage: Storage,
}

impl HubSeeder {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Produce candidates for `host` from its hub patterns and the
    /// given place kinds. Returns the number of candidates written.
    pub async fn seed_host(
        &self,
        host: &str,
        gazetteer: &Gazetteer,
        kinds: &[PlaceKind],
        bus: &EventBus,
    ) -> Result<u64> {
        let patterns = self.storage.patterns_for_host(host).await?;
        let hub_patterns: Vec<_> = patterns
            .into_iter()
            .filter(|p| p.classification == "hub")
            .collect();
        if hub_patterns.is_empty() {
            debug!("no hub patterns for {host}, nothing to seed");
            return Ok(0);
        }

        let mut seeded = 0u64;
        for place in gazetteer.of_kinds(kinds) {
            for pattern in &hub_patterns {
                let Some(path) = instantiate_template(&pattern.template, &place.slug) else {
                    continue;
                };
                let url = format!("https://{host}{path}");
                self.storage
                    .insert_candidate_mapping(
                        place.id,
                        host,
                        &url,
                        page_kind_for(place),
                        Some(pattern.id),
                        pattern.accuracy,
                    )
                    .await?;
                seeded += 1;
            }
        }

        if seeded > 0 {
            bus.publish(&TaskEvent::HubSeeded {
                host: host.to_string(),
                candidates: seeded,
            });
        }
        Ok(seeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instantiate_slug_template() {
        assert_eq!(
            instantiate_template("^/world/[a-z0-9-]+$", "france"),
            Some("/world/france".to_string())
        );
    }

    #[test]
    fn test_rejects_dated_templates() {
        assert_eq!(
            instantiate_template(r"^/world/\d{4}/[a-z0-9-]+$", "france"),
            None
        );
    }

    #[test]
    fn test_rejects_mid_path_wildcards() {
        assert_eq!(
            instantiate_template("^/[a-z0-9-]+/news$", "france"),
            None
        );
    }

    #[test]
    fn test_rejects_literal_templates() {
        assert_eq!(instantiate_template("^/world/europe$", "france"), None);
    }
}
