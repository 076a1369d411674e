//! Document shape stored in the search backend.

use serde::{Deserialize, Serialize};

use super::Place;

/// Geographic point (lat/lon)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// The full field set written atomically under one storage key.
///
/// Admin names for levels 1 and 2 are not stored; they are resolved from
/// the static code maps at serve time. `searchable` starts out false and
/// is flipped by index registration, so a record can exist under its
/// primary key while being temporarily absent from search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceDoc {
    pub place_name: String,
    pub country_code: String,
    pub postal_code: String,
    pub admin_code1: String,
    pub admin_code2: String,
    pub admin_code3: String,
    pub admin_name3: String,
    pub location: GeoPoint,
    pub accuracy: i64,
    #[serde(default)]
    pub searchable: bool,
}

impl PlaceDoc {
    pub fn from_place(place: &Place) -> Self {
        Self {
            place_name: place.place_name.clone(),
            country_code: place.country_code.clone(),
            postal_code: place.postal_code.clone(),
            admin_code1: place.admin_code1.clone(),
            admin_code2: place.admin_code2.clone(),
            admin_code3: place.admin_code3.clone(),
            admin_name3: place.admin_name3.clone(),
            location: GeoPoint {
                lat: place.latitude,
                lon: place.longitude,
            },
            accuracy: place.accuracy,
            searchable: false,
        }
    }

    pub fn into_place(self) -> Place {
        Place {
            place_name: self.place_name,
            country_code: self.country_code,
            postal_code: self.postal_code,
            admin_code1: self.admin_code1,
            admin_code2: self.admin_code2,
            admin_code3: self.admin_code3,
            admin_name3: self.admin_name3,
            latitude: self.location.lat,
            longitude: self.location.lon,
            accuracy: self.accuracy,
            ..Place::default()
        }
    }
}
