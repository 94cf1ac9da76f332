//! Discovery strategies: archive probing, pagination speculation, hub
//! seeding, and link extraction.

pub mod archive_probe;
pub mod hub_seeder;
pub mod links;
pub mod pagination;

pub use archive_probe::{ArchiveProbe, ArchiveProbeConfig};
pub use hub_seeder::HubSeeder;
pub use links::extract_links;
pub use pagination::{PaginationConfig, PaginationPredictor};
