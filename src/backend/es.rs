//! Elasticsearch implementation of the backing-store capability.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use elasticsearch::cluster::ClusterHealthParts;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::http::StatusCode;
use elasticsearch::indices::{IndicesCreateParts, IndicesExistsParts, IndicesRefreshParts};
use elasticsearch::{CountParts, CreateParts, Elasticsearch, SearchParts, UpdateParts};
use serde_json::{json, Value};
use tracing::{info, warn};
use url::Url;

use super::{Backend, BackendError, Field};
use crate::models::{Place, PlaceDoc};

/// Schema JSON embedded at compile time
const PLACES_MAPPING: &str = include_str!("../../schema/places_mapping.json");

/// Upper bound on rows returned by one exact or geo search.
const MAX_RESULTS: usize = 500;

const CONNECT_ATTEMPTS: u64 = 3;

/// Elasticsearch client wrapper with connection configuration
#[derive(Clone)]
pub struct EsBackend {
    client: Elasticsearch,
    pub index_name: String,
}

impl From<elasticsearch::Error> for BackendError {
    fn from(e: elasticsearch::Error) -> Self {
        BackendError::Unavailable(e.to_string())
    }
}

impl EsBackend {
    /// Create a new Elasticsearch-backed store
    pub fn new(es_url: &str, index_name: &str) -> Result<Self> {
        let url = Url::parse(es_url)?;
        let conn_pool = SingleNodeConnectionPool::new(url);
        let transport = TransportBuilder::new(conn_pool).disable_proxy().build()?;

        Ok(Self {
            client: Elasticsearch::new(transport),
            index_name: index_name.to_string(),
        })
    }

    /// Check if cluster is healthy
    pub async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await?;

        Ok(response.status_code().is_success())
    }

    /// Block until the cluster answers a health check, retrying a bounded
    /// number of times with linearly growing back-off. Exhausting the
    /// attempts is fatal to the caller.
    pub async fn wait_until_ready(&self) -> Result<()> {
        for attempt in 1..=CONNECT_ATTEMPTS {
            match self.health_check().await {
                Ok(true) => {
                    info!("Elasticsearch is ready");
                    return Ok(());
                }
                Ok(false) | Err(_) if attempt < CONNECT_ATTEMPTS => {
                    let delay = 5 * attempt;
                    warn!(
                        "Failed to connect to Elasticsearch, will try again in {} seconds",
                        delay
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
                Ok(false) => anyhow::bail!(
                    "Elasticsearch cluster not healthy after {} tries",
                    CONNECT_ATTEMPTS
                ),
                Err(e) => {
                    return Err(e.context(format!(
                        "failed to connect to Elasticsearch after {} tries",
                        CONNECT_ATTEMPTS
                    )))
                }
            }
        }
        unreachable!("connect loop always returns");
    }

    /// Get document count in index
    pub async fn doc_count(&self) -> Result<u64> {
        let response = self
            .client
            .count(CountParts::Index(&[&self.index_name]))
            .send()
            .await?;

        let body = response.json::<Value>().await?;
        Ok(body["count"].as_u64().unwrap_or(0))
    }

    /// Make recently written documents visible to search. Useful at the
    /// end of an ingest run; serving relies on the default refresh cycle.
    pub async fn refresh(&self) -> Result<()> {
        self.client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[&self.index_name]))
            .send()
            .await?;
        Ok(())
    }

    async fn run_search(&self, body: Value) -> Result<Vec<Place>, BackendError> {
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index_name]))
            .body(body)
            .send()
            .await?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(BackendError::Rejected(format!(
                "search returned {}",
                status
            )));
        }

        let body = response.json::<Value>().await?;
        let hits = body["hits"]["hits"].as_array().cloned().unwrap_or_default();

        let mut places = Vec::with_capacity(hits.len());
        for hit in hits {
            match serde_json::from_value::<PlaceDoc>(hit["_source"].clone()) {
                Ok(doc) => places.push(doc.into_place()),
                Err(e) => warn!("dropping malformed search hit: {}", e),
            }
        }

        Ok(places)
    }
}

/// Exact-match filter clauses plus the searchable-flag guard.
fn exact_clauses(filters: &[(Field, &str)]) -> Vec<Value> {
    let mut clauses: Vec<Value> = filters
        .iter()
        .map(|(field, value)| {
            let mut inner = serde_json::Map::new();
            inner.insert(field.as_str().to_string(), Value::String(value.to_string()));
            json!({ "term": Value::Object(inner) })
        })
        .collect();
    clauses.push(json!({ "term": { "searchable": true } }));
    clauses
}

#[async_trait]
impl Backend for EsBackend {
    async fn create_index(&self) -> Result<(), BackendError> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[&self.index_name]))
            .send()
            .await?
            .status_code()
            .is_success();

        if exists {
            info!("Index {} already exists, skipping creation", self.index_name);
            return Ok(());
        }

        let mapping: Value = serde_json::from_str(PLACES_MAPPING)
            .map_err(|e| BackendError::Rejected(format!("invalid index mapping: {}", e)))?;

        info!("Creating index: {}", self.index_name);
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index_name))
            .body(mapping)
            .send()
            .await?;

        if !response.status_code().is_success() {
            let error_body = response.text().await?;
            return Err(BackendError::Rejected(format!(
                "failed to create index: {}",
                error_body
            )));
        }

        info!("Index {} created successfully", self.index_name);
        Ok(())
    }

    async fn write_record(&self, key: &str, doc: &PlaceDoc) -> Result<(), BackendError> {
        let response = self
            .client
            .create(CreateParts::IndexId(&self.index_name, key))
            .body(doc)
            .send()
            .await?;

        let status = response.status_code();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::CONFLICT {
            Err(BackendError::KeyExists)
        } else {
            Err(BackendError::Rejected(format!(
                "write of {} returned {}",
                key, status
            )))
        }
    }

    async fn add_to_index(&self, key: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .update(UpdateParts::IndexId(&self.index_name, key))
            .body(json!({ "doc": { "searchable": true } }))
            .send()
            .await?;

        let status = response.status_code();
        if status.is_success() {
            Ok(())
        } else {
            Err(BackendError::Rejected(format!(
                "index registration of {} returned {}",
                key, status
            )))
        }
    }

    async fn count_exact(&self, filters: &[(Field, &str)]) -> Result<u64, BackendError> {
        let body = json!({
            "query": { "bool": { "filter": exact_clauses(filters) } }
        });

        let response = self
            .client
            .count(CountParts::Index(&[&self.index_name]))
            .body(body)
            .send()
            .await?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(BackendError::Rejected(format!(
                "count returned {}",
                status
            )));
        }

        let body = response.json::<Value>().await?;
        Ok(body["count"].as_u64().unwrap_or(0))
    }

    async fn search_exact(&self, filters: &[(Field, &str)]) -> Result<Vec<Place>, BackendError> {
        let body = json!({
            "query": { "bool": { "filter": exact_clauses(filters) } },
            "size": MAX_RESULTS
        });

        self.run_search(body).await
    }

    async fn search_geo_radius(
        &self,
        lat: f64,
        lon: f64,
        radius_miles: f64,
    ) -> Result<Vec<Place>, BackendError> {
        let body = json!({
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "searchable": true } },
                        {
                            "geo_distance": {
                                "distance": format!("{}mi", radius_miles),
                                "location": { "lat": lat, "lon": lon }
                            }
                        }
                    ]
                }
            },
            "size": MAX_RESULTS
        });

        self.run_search(body).await
    }
}
