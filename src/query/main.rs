//! Query server for postal-code lookups.
//!
//! Serves versioned JSON lookups by country+postal code, by
//! country+area+place-name, and radius-based nearby queries ordered by
//! distance.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::Json,
    routing::{get, head},
    Router,
};
use clap::Parser;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use larch::backend::EsBackend;
use larch::codes::AdminCodeNames;
use larch::response::{self, ApiVersion};
use larch::{query, Place};

/// Fixed search radius for nearby lookups.
const NEARBY_RADIUS_MILES: f64 = 10.0;

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Postal-code lookup server")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Elasticsearch URL
    #[arg(long, default_value = "http://localhost:9200")]
    es_url: String,

    /// Elasticsearch index name
    #[arg(long, default_value = "places")]
    index: String,

    /// Directory holding the countries/admin code tables
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

/// Application state shared across handlers
struct AppState {
    backend: EsBackend,
    names: AdminCodeNames,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Larch Query Server");
    info!("Connecting to Elasticsearch at {}", args.es_url);

    let backend = EsBackend::new(&args.es_url, &args.index)?;

    if !backend.health_check().await? {
        anyhow::bail!("Elasticsearch cluster is not healthy");
    }

    let doc_count = backend.doc_count().await?;
    info!(
        "Connected to index '{}' with {} documents",
        args.index, doc_count
    );

    let names = AdminCodeNames::load(&args.data_dir).await;

    let state = Arc::new(AppState { backend, names });

    // Static routes take priority over the parameterized country routes.
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/nearby/{country_code}/{postal_code}", get(nearby_handler))
        .route("/{country_code}", head(country_available_handler))
        .route("/{country_code}/", head(country_available_handler))
        .route("/{country_code}/{postal_code}", get(postal_code_handler))
        .route("/{country_code}/{area}/{place}", get(area_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Starting server on {}", args.listen);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Request-scoped wire-format version, taken from the `X-Api-Version`
/// header or the `api-version` query parameter, defaulting to v1.
struct RequestVersion(ApiVersion);

impl<S: Send + Sync> FromRequestParts<S> for RequestVersion {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("x-api-version")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .or_else(|| {
                parts.uri.query().and_then(|q| {
                    q.split('&')
                        .find_map(|pair| pair.strip_prefix("api-version="))
                        .map(String::from)
                })
            });

        Ok(RequestVersion(ApiVersion::parse(
            token.as_deref().unwrap_or("v1"),
        )))
    }
}

#[derive(Serialize)]
struct IndexResponse {
    service: &'static str,
    version: &'static str,
}

async fn index_handler() -> Json<IndexResponse> {
    Json(IndexResponse {
        service: "larch",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    elasticsearch: bool,
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let healthy = state.backend.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        elasticsearch: healthy,
    })
}

fn internal_error(context: &str, e: impl std::fmt::Display) -> StatusCode {
    error!("{}: {}", context, e);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// HEAD availability probe: 200 if the country has at least one record.
async fn country_available_handler(
    State(state): State<Arc<AppState>>,
    Path(country_code): Path<String>,
) -> StatusCode {
    match query::count_by_country(&state.backend, &country_code).await {
        Ok(0) => StatusCode::NOT_FOUND,
        Ok(_) => StatusCode::OK,
        Err(e) => internal_error("country availability check failed", e),
    }
}

async fn postal_code_handler(
    State(state): State<Arc<AppState>>,
    Path((country_code, postal_code)): Path<(String, String)>,
    RequestVersion(version): RequestVersion,
) -> Result<Json<response::PostalCodeResponse>, StatusCode> {
    let mut places =
        query::find_by_country_and_postal_code(&state.backend, &country_code, &postal_code)
            .await
            .map_err(|e| internal_error("postal code lookup failed", e))?;

    hydrate(&state, &mut places);

    response::project_postal_code(version, &places)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn area_handler(
    State(state): State<Arc<AppState>>,
    // `place` arrives percent-decoded from the path extractor
    Path((country_code, area, place)): Path<(String, String, String)>,
    RequestVersion(version): RequestVersion,
) -> Result<Json<response::AreaResponse>, StatusCode> {
    let mut places =
        query::find_by_country_area_and_name(&state.backend, &country_code, &area, &place)
            .await
            .map_err(|e| internal_error("area lookup failed", e))?;

    hydrate(&state, &mut places);

    response::project_area(version, &places)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn nearby_handler(
    State(state): State<Arc<AppState>>,
    Path((country_code, postal_code)): Path<(String, String)>,
    RequestVersion(version): RequestVersion,
) -> Result<Json<response::NearbyResponse>, StatusCode> {
    let basis_places =
        query::find_by_country_and_postal_code(&state.backend, &country_code, &postal_code)
            .await
            .map_err(|e| internal_error("nearby basis lookup failed", e))?;

    let Some(basis) = basis_places.first() else {
        return Err(StatusCode::NOT_FOUND);
    };

    let mut nearby = query::find_nearby(
        &state.backend,
        basis.latitude,
        basis.longitude,
        NEARBY_RADIUS_MILES,
        &basis.postal_code,
    )
    .await
    .map_err(|e| internal_error("nearby search failed", e))?;

    for (place, _) in &mut nearby {
        state.names.expand(place);
    }

    Ok(Json(response::project_nearby(version, basis, &nearby)))
}

/// Merge the static display names into each result row.
fn hydrate(state: &AppState, places: &mut [Place]) {
    for place in places {
        state.names.expand(place);
    }
}
