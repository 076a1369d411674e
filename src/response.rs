//! Version-aware projection of place sequences into wire schemas.

use serde::Serialize;

use crate::models::Place;

/// Wire-format version requested by a client.
///
/// `V2` is reserved: it is accepted as a token but currently projects
/// identically to `V1`. Any unrecognized token falls back to `V1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiVersion {
    #[default]
    V1,
    V2,
}

impl ApiVersion {
    pub fn parse(token: &str) -> Self {
        match token.trim() {
            "v2" => ApiVersion::V2,
            _ => ApiVersion::V1,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PostalCodeResponse {
    #[serde(rename = "post code")]
    post_code: String,
    country: String,
    #[serde(rename = "country abbreviation")]
    country_abbreviation: String,
    places: Vec<PostalCodePlace>,
}

#[derive(Debug, Serialize)]
struct PostalCodePlace {
    #[serde(rename = "place name")]
    place_name: String,
    longitude: String,
    state: String,
    #[serde(rename = "state abbreviation")]
    state_abbreviation: String,
    latitude: String,
    county: String,
}

#[derive(Debug, Serialize)]
pub struct AreaResponse {
    country: String,
    #[serde(rename = "country abbreviation")]
    country_abbreviation: String,
    #[serde(rename = "place name")]
    place_name: String,
    state: String,
    #[serde(rename = "state abbreviation")]
    state_abbreviation: String,
    places: Vec<AreaPlace>,
}

#[derive(Debug, Serialize)]
struct AreaPlace {
    #[serde(rename = "place name")]
    place_name: String,
    #[serde(rename = "post code")]
    post_code: String,
    longitude: String,
    latitude: String,
}

#[derive(Debug, Serialize)]
pub struct NearbyResponse {
    #[serde(rename = "near latitude")]
    near_latitude: f64,
    #[serde(rename = "near longitude")]
    near_longitude: f64,
    nearby: Vec<NearbyPlace>,
}

#[derive(Debug, Serialize)]
struct NearbyPlace {
    #[serde(rename = "place name")]
    place_name: String,
    #[serde(rename = "post code")]
    post_code: String,
    state: String,
    #[serde(rename = "state abbreviation")]
    state_abbreviation: String,
    distance: f64,
}

// Coordinates are rendered with 4 decimal digits in v1 bodies.
fn coord(value: f64) -> String {
    format!("{:.4}", value)
}

/// Shape a postal-code lookup result. Returns `None` for an empty
/// sequence, which callers map to a not-found response.
pub fn project_postal_code(version: ApiVersion, places: &[Place]) -> Option<PostalCodeResponse> {
    let first = places.first()?;

    match version {
        // v2 is reserved and projects identically to v1 for now.
        ApiVersion::V1 | ApiVersion::V2 => Some(PostalCodeResponse {
            post_code: first.postal_code.clone(),
            country: first.country.clone(),
            country_abbreviation: first.country_code.clone(),
            places: places
                .iter()
                .map(|p| PostalCodePlace {
                    place_name: p.place_name.clone(),
                    longitude: coord(p.longitude),
                    state: p.admin_name1.clone(),
                    state_abbreviation: p.admin_code1.clone(),
                    latitude: coord(p.latitude),
                    county: p.admin_name2.clone(),
                })
                .collect(),
        }),
    }
}

/// Shape a country/area/place-name lookup result.
pub fn project_area(version: ApiVersion, places: &[Place]) -> Option<AreaResponse> {
    let first = places.first()?;

    match version {
        ApiVersion::V1 | ApiVersion::V2 => Some(AreaResponse {
            country: first.country.clone(),
            country_abbreviation: first.country_code.clone(),
            place_name: first.place_name.clone(),
            state: first.admin_name1.clone(),
            state_abbreviation: first.admin_code1.clone(),
            places: places
                .iter()
                .map(|p| AreaPlace {
                    place_name: p.place_name.clone(),
                    post_code: p.postal_code.clone(),
                    longitude: coord(p.longitude),
                    latitude: coord(p.latitude),
                })
                .collect(),
        }),
    }
}

/// Shape a nearby lookup result around a basis place. The caller has
/// already excluded the basis postal code and sorted by distance.
pub fn project_nearby(
    version: ApiVersion,
    basis: &Place,
    results: &[(Place, f64)],
) -> NearbyResponse {
    match version {
        ApiVersion::V1 | ApiVersion::V2 => NearbyResponse {
            near_latitude: basis.latitude,
            near_longitude: basis.longitude,
            nearby: results
                .iter()
                .map(|(p, distance)| NearbyPlace {
                    place_name: p.place_name.clone(),
                    post_code: p.postal_code.clone(),
                    state: p.admin_name1.clone(),
                    state_abbreviation: p.admin_code1.clone(),
                    distance: *distance,
                })
                .collect(),
        },
    }
}
