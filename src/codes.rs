//! Static code-to-display-name tables and admin name expansion.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::models::Place;
use crate::tsv::TsvReader;

/// Immutable mapping from a composite code to a display name.
///
/// Loaded once at process start and never mutated afterward. Lookup of a
/// missing key returns an empty string, never an error.
#[derive(Debug, Clone, Default)]
pub struct CodeMap(HashMap<String, String>);

impl CodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_name(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Load a two-column projection of a TSV file, keyed on `key_col`.
    pub async fn load(path: &Path, key_col: usize, value_col: usize) -> Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("unable to open {}", path.display()))?;

        let entries = Arc::new(Mutex::new(HashMap::new()));
        let sink = entries.clone();

        let reader = TsvReader::new(1, 64);
        reader
            .run(BufReader::new(file), move |row: Vec<String>| {
                let sink = sink.clone();
                async move {
                    if let (Some(key), Some(value)) = (row.get(key_col), row.get(value_col)) {
                        sink.lock().unwrap().insert(key.clone(), value.clone());
                    }
                }
            })
            .await
            .with_context(|| format!("unable to parse {}", path.display()))?;

        // Workers are joined by run(), so no handler clone still holds the map.
        let entries = std::mem::take(&mut *entries.lock().unwrap());

        Ok(Self(entries))
    }
}

impl FromIterator<(String, String)> for CodeMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The three static tables merged into a [`Place`] at serve time.
#[derive(Debug, Clone, Default)]
pub struct AdminCodeNames {
    pub countries: CodeMap,
    pub admin1: CodeMap,
    pub admin2: CodeMap,
}

impl AdminCodeNames {
    /// Load the sidecar tables from a data directory. A missing or
    /// unreadable file degrades to an empty map with a warning.
    pub async fn load(dir: &Path) -> Self {
        Self {
            countries: Self::load_or_empty(&dir.join("countries.txt"), 0, 4).await,
            admin1: Self::load_or_empty(&dir.join("admin_1.txt"), 0, 1).await,
            admin2: Self::load_or_empty(&dir.join("admin_2.txt"), 0, 1).await,
        }
    }

    async fn load_or_empty(path: &Path, key_col: usize, value_col: usize) -> CodeMap {
        match CodeMap::load(path, key_col, value_col).await {
            Ok(map) => {
                info!("Loaded {} entries from {}", map.len(), path.display());
                map
            }
            Err(e) => {
                warn!("{:#}, continuing with empty code map", e);
                CodeMap::new()
            }
        }
    }

    /// Fill the display-name fields of a place from its derived keys.
    /// An unresolved key leaves the corresponding field empty.
    pub fn expand(&self, place: &mut Place) {
        place.admin_name1 = self.admin1.get_name(place.admin1_key()).to_string();
        place.admin_name2 = self.admin2.get_name(place.admin2_key()).to_string();
        place.country = self.countries.get_name(&place.country_code).to_string();
    }
}
