//! Localized messages for domain errors.

pub mod catalog;
pub mod packs;

pub use catalog::{Catalog, CatalogError, Pack, PackMessage, Translator};
pub use packs::MessagePacks;
