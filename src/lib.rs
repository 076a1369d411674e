//! Larch - a postal-code gazetteer service backed by Elasticsearch
//!
//! This library provides the shared ingestion pipeline, data model and
//! query layer for the ingest and query binaries.

pub mod backend;
pub mod codes;
pub mod geo;
pub mod loader;
pub mod models;
pub mod query;
pub mod response;
pub mod tsv;

pub use models::{Place, PlaceDoc};
