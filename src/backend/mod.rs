//! Backing-store capability consumed by the loader and the query layer.
//!
//! The search engine itself is an external collaborator; this module only
//! declares the operations the service needs from it, plus the
//! Elasticsearch implementation.

mod es;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Place, PlaceDoc};

pub use es::EsBackend;

/// Failures surfaced by a backing store.
///
/// `KeyExists` is kept distinct from the other variants so the loader can
/// drive its collision-retry path off it.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("key already exists")]
    KeyExists,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

/// Indexed fields available for exact-match filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    CountryCode,
    PostalCode,
    PlaceName,
    AdminCode1,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::CountryCode => "country_code",
            Field::PostalCode => "postal_code",
            Field::PlaceName => "place_name",
            Field::AdminCode1 => "admin_code1",
        }
    }
}

/// Minimum operations required from the backing store.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Declare the index schema. Idempotent: re-creation on an existing
    /// index is tolerated and logged, not fatal.
    async fn create_index(&self) -> Result<(), BackendError>;

    /// Atomic all-or-nothing write of the full field set under `key`.
    /// Fails with [`BackendError::KeyExists`] when the key is taken.
    async fn write_record(&self, key: &str, doc: &PlaceDoc) -> Result<(), BackendError>;

    /// Register an already-written record for search.
    async fn add_to_index(&self, key: &str) -> Result<(), BackendError>;

    /// Count of documents matching a boolean AND of exact per-field filters.
    async fn count_exact(&self, filters: &[(Field, &str)]) -> Result<u64, BackendError>;

    /// Rows matching a boolean AND of exact per-field filters, in
    /// backend-defined order.
    async fn search_exact(&self, filters: &[(Field, &str)]) -> Result<Vec<Place>, BackendError>;

    /// Rows within `radius_miles` of the given point.
    async fn search_geo_radius(
        &self,
        lat: f64,
        lon: f64,
        radius_miles: f64,
    ) -> Result<Vec<Place>, BackendError>;
}
