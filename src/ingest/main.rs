//! Gazetteer dump ingest pipeline.
//!
//! Streams a tab-separated dump from stdin or a file through parsing
//! workers into the collision-safe loader, then reports totals.

use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use larch::backend::{Backend, EsBackend};
use larch::loader::Loader;
use larch::models::Place;
use larch::tsv::TsvReader;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Ingest a gazetteer TSV dump into Elasticsearch")]
struct Args {
    /// Gazetteer TSV file to import (reads stdin when omitted)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Elasticsearch URL
    #[arg(long, default_value = "http://localhost:9200")]
    es_url: String,

    /// Elasticsearch index name
    #[arg(long, default_value = "places")]
    index: String,

    /// Number of record-parsing workers
    #[arg(long, default_value = "1")]
    readers: usize,

    /// Number of loading workers
    #[arg(long, default_value = "10")]
    workers: usize,

    /// Capacity of the hand-off channels between pipeline stages
    #[arg(long, default_value = "1024")]
    channel_capacity: usize,

    /// Skip index creation
    #[arg(long)]
    skip_create_index: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Larch Ingest Pipeline");

    let backend = EsBackend::new(&args.es_url, &args.index)
        .context("Failed to configure Elasticsearch client")?;

    // Unreachable backend after the bounded retry loop ends the run here.
    backend.wait_until_ready().await?;

    if !args.skip_create_index {
        if let Err(e) = backend.create_index().await {
            warn!("Index creation failed, continuing: {}", e);
        }
    }

    let start = Instant::now();
    let backend = Arc::new(backend);

    let (tx, rx) = mpsc::channel::<Place>(args.channel_capacity);

    let loader = Loader::new(backend.clone(), args.workers, Arc::new(AtomicU64::new(0)));
    let loader_handle = tokio::spawn(async move { loader.run(rx).await });

    let reader = TsvReader::new(args.readers, args.channel_capacity);
    let handler = move |row: Vec<String>| {
        let tx = tx.clone();
        async move {
            match Place::from_row(&row) {
                // A closed channel means the loader bailed out; the
                // reader drains to completion and the error surfaces
                // from the loader join below.
                Ok(place) => {
                    let _ = tx.send(place).await;
                }
                Err(e) => debug!("skipping row: {:#}", e),
            }
        }
    };

    let dispatched = match &args.file {
        Some(path) => {
            info!("Reading from {}", path.display());
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("unable to open {}", path.display()))?;
            reader.run(BufReader::new(file), handler).await?
        }
        None => {
            info!("Reading from stdin");
            reader.run(BufReader::new(tokio::io::stdin()), handler).await?
        }
    };

    let stats = loader_handle
        .await
        .context("loader task failed")??;

    info!(
        "Parsed {} records in {:?}: {} written, {} indexed, {} index failures, {} write failures",
        dispatched,
        start.elapsed(),
        stats.written,
        stats.indexed,
        stats.index_failures,
        stats.write_failures
    );

    backend.refresh().await?;
    let doc_count = backend.doc_count().await?;
    info!("Total documents in index: {}", doc_count);

    Ok(())
}
