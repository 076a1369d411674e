//! In-memory backing store used by loader and query tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Backend, BackendError, Field};
use crate::geo;
use crate::models::{Place, PlaceDoc};

#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, PlaceDoc>>,
    indexed: Mutex<HashSet<String>>,
    fail_indexing: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupy a key up front to force the collision-retry path.
    pub fn seed_key(&self, key: &str, doc: PlaceDoc) {
        self.records
            .lock()
            .unwrap()
            .insert(key.to_string(), doc);
    }

    /// Make every subsequent `add_to_index` call fail.
    pub fn fail_indexing(&self) {
        self.fail_indexing.store(true, Ordering::SeqCst);
    }

    pub fn record_keys(&self) -> Vec<String> {
        self.records.lock().unwrap().keys().cloned().collect()
    }

    pub fn indexed_keys(&self) -> Vec<String> {
        self.indexed.lock().unwrap().iter().cloned().collect()
    }

    fn searchable_docs(&self) -> Vec<PlaceDoc> {
        let records = self.records.lock().unwrap();
        let indexed = self.indexed.lock().unwrap();
        records
            .iter()
            .filter(|(key, _)| indexed.contains(*key))
            .map(|(_, doc)| doc.clone())
            .collect()
    }
}

fn matches(doc: &PlaceDoc, filters: &[(Field, &str)]) -> bool {
    filters.iter().all(|(field, value)| {
        let actual = match field {
            Field::CountryCode => &doc.country_code,
            Field::PostalCode => &doc.postal_code,
            Field::PlaceName => &doc.place_name,
            Field::AdminCode1 => &doc.admin_code1,
        };
        actual == value
    })
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn create_index(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn write_record(&self, key: &str, doc: &PlaceDoc) -> Result<(), BackendError> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(key) {
            return Err(BackendError::KeyExists);
        }
        records.insert(key.to_string(), doc.clone());
        Ok(())
    }

    async fn add_to_index(&self, key: &str) -> Result<(), BackendError> {
        if self.fail_indexing.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("index registration refused".into()));
        }
        self.indexed.lock().unwrap().insert(key.to_string());
        Ok(())
    }

    async fn count_exact(&self, filters: &[(Field, &str)]) -> Result<u64, BackendError> {
        let count = self
            .searchable_docs()
            .iter()
            .filter(|doc| matches(doc, filters))
            .count();
        Ok(count as u64)
    }

    async fn search_exact(&self, filters: &[(Field, &str)]) -> Result<Vec<Place>, BackendError> {
        Ok(self
            .searchable_docs()
            .into_iter()
            .filter(|doc| matches(doc, filters))
            .map(PlaceDoc::into_place)
            .collect())
    }

    async fn search_geo_radius(
        &self,
        lat: f64,
        lon: f64,
        radius_miles: f64,
    ) -> Result<Vec<Place>, BackendError> {
        Ok(self
            .searchable_docs()
            .into_iter()
            .filter(|doc| {
                geo::haversine_miles(lat, lon, doc.location.lat, doc.location.lon) <= radius_miles
            })
            .map(PlaceDoc::into_place)
            .collect())
    }
}
