//! Shared test utilities for supportdesk crates.

pub mod decider;
pub mod fixtures;

pub use decider::ScriptedDecider;
pub use fixtures::{catalog_fixture, seed_support_catalogs, CatalogFixture, UnavailableCatalog};
