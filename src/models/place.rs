//! In-memory representation of one gazetteer row.

use std::sync::OnceLock;

use anyhow::{bail, Result};
use tracing::debug;

// Column order of a gazetteer dump row. The accuracy column is optional.
const COL_COUNTRY_CODE: usize = 0;
const COL_POSTAL_CODE: usize = 1;
const COL_PLACE_NAME: usize = 2;
const COL_ADMIN_NAME1: usize = 3;
const COL_ADMIN_CODE1: usize = 4;
const COL_ADMIN_NAME2: usize = 5;
const COL_ADMIN_CODE2: usize = 6;
const COL_ADMIN_NAME3: usize = 7;
const COL_ADMIN_CODE3: usize = 8;
const COL_LATITUDE: usize = 9;
const COL_LONGITUDE: usize = 10;
const COL_ACCURACY: usize = 11;

/// Memoized derived keys, kept in their own type so `Place` values can
/// still be built with struct-update syntax from other modules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyCache {
    admin1: OnceLock<String>,
    admin2: OnceLock<String>,
}

/// One place record.
///
/// Created per ingested row or per search-result row, so instances are
/// transient. `country`, `admin_name1` and `admin_name2` are only filled
/// at serve time by [`crate::codes::AdminCodeNames::expand`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Place {
    pub place_name: String,
    pub country_code: String,
    pub country: String,
    pub postal_code: String,
    pub admin_name1: String,
    pub admin_code1: String,
    pub admin_name2: String,
    pub admin_code2: String,
    pub admin_name3: String,
    pub admin_code3: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: i64,

    pub keys: KeyCache,
}

impl Place {
    /// Parse a tab-split gazetteer row.
    ///
    /// Unparseable latitude, longitude or accuracy values recover to zero
    /// and are logged at debug level; a row that is too short to hold the
    /// coordinate columns is an error.
    pub fn from_row(row: &[String]) -> Result<Self> {
        if row.len() <= COL_LONGITUDE {
            bail!(
                "row has {} columns, expected at least {}",
                row.len(),
                COL_LONGITUDE + 1
            );
        }

        let country_code = row[COL_COUNTRY_CODE].clone();
        let postal_code = row[COL_POSTAL_CODE].clone();
        let place_name = row[COL_PLACE_NAME].clone();

        let latitude = row[COL_LATITUDE].parse::<f64>().unwrap_or_else(|_| {
            debug!(
                %country_code,
                %postal_code,
                %place_name,
                "'{}' for latitude failed to parse as float",
                row[COL_LATITUDE]
            );
            0.0
        });

        let longitude = row[COL_LONGITUDE].parse::<f64>().unwrap_or_else(|_| {
            debug!(
                %country_code,
                %postal_code,
                %place_name,
                "'{}' for longitude failed to parse as float",
                row[COL_LONGITUDE]
            );
            0.0
        });

        let accuracy = match row.get(COL_ACCURACY) {
            Some(raw) => raw.parse::<i64>().unwrap_or_else(|_| {
                debug!(
                    %country_code,
                    %postal_code,
                    %place_name,
                    "'{}' for accuracy failed to parse as int",
                    raw
                );
                0
            }),
            None => 0,
        };

        Ok(Self {
            place_name,
            country_code,
            country: String::new(),
            postal_code,
            admin_name1: row[COL_ADMIN_NAME1].clone(),
            admin_code1: row[COL_ADMIN_CODE1].clone(),
            admin_name2: row[COL_ADMIN_NAME2].clone(),
            admin_code2: row[COL_ADMIN_CODE2].clone(),
            admin_name3: row[COL_ADMIN_NAME3].clone(),
            admin_code3: row[COL_ADMIN_CODE3].clone(),
            latitude,
            longitude,
            accuracy,
            keys: KeyCache::default(),
        })
    }

    /// Composite lookup key into the admin-level-1 code map.
    pub fn admin1_key(&self) -> &str {
        self.keys
            .admin1
            .get_or_init(|| format!("{}.{}", self.country_code, self.admin_code1))
    }

    /// Composite lookup key into the admin-level-2 code map.
    pub fn admin2_key(&self) -> &str {
        self.keys.admin2.get_or_init(|| {
            format!(
                "{}.{}.{}",
                self.country_code, self.admin_code1, self.admin_code2
            )
        })
    }

    /// Storage key under a given disambiguator.
    ///
    /// Uniqueness in the backing store is enforced by the loader assigning
    /// the disambiguator, never by the caller.
    pub fn storage_key(&self, disambiguator: u64) -> String {
        format!(
            "{}:{}.{}",
            self.country_code, self.postal_code, disambiguator
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_full_row() {
        let fields = row(&[
            "us", "10001", "New York", "NY", "NY", "New York", "NY", "", "", "40.7484",
            "-73.9967", "4",
        ]);
        let place = Place::from_row(&fields).unwrap();

        assert_eq!(place.country_code, "us");
        assert_eq!(place.postal_code, "10001");
        assert_eq!(place.place_name, "New York");
        assert_eq!(place.admin_name1, "NY");
        assert_eq!(place.admin_code2, "NY");
        assert_eq!(place.latitude, 40.7484);
        assert_eq!(place.longitude, -73.9967);
        assert_eq!(place.accuracy, 4);
    }

    #[test]
    fn test_parse_bad_numeric_fields_recover_to_zero() {
        let fields = row(&[
            "de", "10115", "Berlin", "", "BE", "", "", "", "", "not-a-float", "also-bad", "x",
        ]);
        let place = Place::from_row(&fields).unwrap();

        assert_eq!(place.latitude, 0.0);
        assert_eq!(place.longitude, 0.0);
        assert_eq!(place.accuracy, 0);
    }

    #[test]
    fn test_parse_missing_accuracy_column() {
        let fields = row(&[
            "fr", "75001", "Paris", "", "", "", "", "", "", "48.86", "2.34",
        ]);
        let place = Place::from_row(&fields).unwrap();
        assert_eq!(place.accuracy, 0);
    }

    #[test]
    fn test_parse_short_row_is_error() {
        let fields = row(&["us", "10001", "New York"]);
        assert!(Place::from_row(&fields).is_err());
    }

    #[test]
    fn test_derived_keys() {
        let fields = row(&[
            "us", "10001", "New York", "NY", "NY", "New York", "061", "", "", "40.7484",
            "-73.9967", "4",
        ]);
        let place = Place::from_row(&fields).unwrap();

        assert_eq!(place.admin1_key(), "us.NY");
        assert_eq!(place.admin2_key(), "us.NY.061");
        assert_eq!(place.storage_key(0), "us:10001.0");
        assert_eq!(place.storage_key(42), "us:10001.42");
        // Memoized value is stable across calls
        assert_eq!(place.admin1_key(), "us.NY");
    }
}
