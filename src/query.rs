//! Lookup operations over the backing store.

use crate::backend::{Backend, BackendError, Field};
use crate::geo;
use crate::models::Place;

/// Number of stored documents with an exact country-code match. Zero is a
/// valid non-error outcome.
pub async fn count_by_country<B: Backend + ?Sized>(
    backend: &B,
    country_code: &str,
) -> Result<u64, BackendError> {
    backend
        .count_exact(&[(Field::CountryCode, country_code)])
        .await
}

/// Places matching country and postal code, in backend-defined order.
/// An empty result is not an error.
pub async fn find_by_country_and_postal_code<B: Backend + ?Sized>(
    backend: &B,
    country_code: &str,
    postal_code: &str,
) -> Result<Vec<Place>, BackendError> {
    backend
        .search_exact(&[
            (Field::CountryCode, country_code),
            (Field::PostalCode, postal_code),
        ])
        .await
}

/// Places matching country, admin-level-1 area and place name.
pub async fn find_by_country_area_and_name<B: Backend + ?Sized>(
    backend: &B,
    country_code: &str,
    area: &str,
    place_name: &str,
) -> Result<Vec<Place>, BackendError> {
    backend
        .search_exact(&[
            (Field::CountryCode, country_code),
            (Field::AdminCode1, area),
            (Field::PlaceName, place_name),
        ])
        .await
}

/// Places within `radius_miles` of the basis point, excluding any result
/// that shares the basis postal code, paired with their haversine
/// distance in miles and sorted ascending by it (stable for ties).
pub async fn find_nearby<B: Backend + ?Sized>(
    backend: &B,
    lat: f64,
    lon: f64,
    radius_miles: f64,
    basis_postal_code: &str,
) -> Result<Vec<(Place, f64)>, BackendError> {
    let candidates = backend.search_geo_radius(lat, lon, radius_miles).await?;

    let mut nearby: Vec<(Place, f64)> = candidates
        .into_iter()
        .filter(|p| p.postal_code != basis_postal_code)
        .map(|p| {
            let distance = geo::haversine_miles(lat, lon, p.latitude, p.longitude);
            (p, distance)
        })
        .collect();

    nearby.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    Ok(nearby)
}
