//! Data model for gazetteer records.

mod doc;
mod place;

pub use doc::{GeoPoint, PlaceDoc};
pub use place::{KeyCache, Place};
