use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use spatial_extraction::{ExtractionCoordinator, ExtractionTracker, HttpExtractionClient};
use spatial_geometry::Point3;
use spatial_graph::Neo4jGraphSource;
use spatial_placement::{HttpPlacementClient, PlacementResolver};
use spatial_protocol::ExtractionCallback;
use spatial_reindexer::Reconciler;
use spatial_store::{PgSpatialStore, SpatialStore};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::SpatialIndexConfig;
use crate::serve::{ReindexTarget, Server};
use crate::{
    CompleteExtractionArgs, LocationArgs, ReindexArgs, SearchArgs, SearchSampleArgs, ServeArgs,
};

async fn connect_store(config: &SpatialIndexConfig) -> Result<Arc<PgSpatialStore>> {
    let store = PgSpatialStore::connect(&config.store)
        .await
        .context("Failed to connect to the spatial store")?;
    Ok(Arc::new(store))
}

fn coordinator(
    config: &SpatialIndexConfig,
    store: Arc<dyn SpatialStore>,
    tracker: Arc<ExtractionTracker>,
) -> Result<ExtractionCoordinator> {
    let client = HttpExtractionClient::new(&config.extraction)
        .context("Failed to build extraction client")?;
    Ok(
        ExtractionCoordinator::new(Arc::new(client), store, tracker)
            .with_unknown_names_file(config.extraction.unknown_names_file.clone()),
    )
}

fn print_ids(ids: &[String]) {
    if ids.is_empty() {
        println!("{} No samples found", "✗".bright_red());
        return;
    }
    println!(
        "{} Found {} samples",
        "✓".bright_green(),
        ids.len().to_string().bright_cyan()
    );
    for id in ids {
        println!("  {id}");
    }
}

pub(crate) async fn run_migrate(config: &SpatialIndexConfig) -> Result<()> {
    let store = connect_store(config).await?;
    store.migrate().await.context("Migration failed")?;
    println!(
        "{} Schema ready (table {})",
        "✓".bright_green(),
        config.store.table.bright_cyan()
    );
    Ok(())
}

/// Everything a reindex needs, sharing one tracker.
struct Indexing {
    reconciler: Reconciler,
    coordinator: Arc<ExtractionCoordinator>,
}

async fn indexing(config: &SpatialIndexConfig, tracker: Arc<ExtractionTracker>) -> Result<Indexing> {
    let store = connect_store(config).await?;
    let graph = Neo4jGraphSource::connect(config.graph.clone())
        .await
        .context("Failed to connect to the graph")?;
    let placement = HttpPlacementClient::new(&config.placement)
        .context("Failed to build placement client")?;
    let resolver = PlacementResolver::new(Arc::new(placement), &config.placement);
    let coordinator = Arc::new(coordinator(config, store.clone(), tracker)?);

    let reconciler = Reconciler::new(
        Arc::new(graph),
        store,
        resolver,
        coordinator.clone(),
        config.reindex.clone(),
    )?;
    Ok(Indexing {
        reconciler,
        coordinator,
    })
}

pub(crate) async fn run_reindex(config: &SpatialIndexConfig, args: ReindexArgs) -> Result<()> {
    let tracker = Arc::new(ExtractionTracker::new());
    let shutdown = CancellationToken::new();
    let sweeper = tracker.clone().spawn_sweeper(
        config.extraction.sweep_interval(),
        config.extraction.timeout(),
        shutdown.clone(),
    );
    let Indexing { reconciler, .. } = indexing(config, tracker.clone()).await?;

    let dispatch = ReindexTarget::from(&args).dispatch(&reconciler).await?;
    println!(
        "{} {} samples selected",
        "▶".bright_blue(),
        dispatch.selected.to_string().bright_cyan()
    );
    let stats = dispatch.wait().await?;

    shutdown.cancel();
    sweeper.await.context("Extraction sweeper failed")?;

    println!("\n{} Reindex complete!", "✓".bright_green());
    println!("  Samples processed: {}", stats.samples_processed.bright_cyan());
    println!("  Samples failed: {}", stats.samples_failed.bright_cyan());
    println!("  Placements skipped: {}", stats.placements_skipped.bright_cyan());
    println!(
        "  Extractions requested: {}",
        stats.extractions_requested.bright_cyan()
    );
    if tracker.count() > 0 {
        warn!(
            "{} extraction callbacks will not be matched after exit; use `serve` to track them",
            tracker.count()
        );
    }
    Ok(())
}

pub(crate) async fn run_serve(config: &SpatialIndexConfig, args: ServeArgs) -> Result<()> {
    let tracker = Arc::new(ExtractionTracker::new());
    let shutdown = CancellationToken::new();
    let sweeper = tracker.clone().spawn_sweeper(
        config.extraction.sweep_interval(),
        config.extraction.timeout(),
        shutdown.clone(),
    );
    let Indexing {
        reconciler,
        coordinator,
    } = indexing(config, tracker).await?;

    let server = Server::new(reconciler, coordinator)
        .with_reindex_every(args.reindex_every.map(Duration::from_secs));
    let served = server
        .run(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown.clone(),
        )
        .await;

    shutdown.cancel();
    sweeper.await.context("Extraction sweeper failed")?;
    served
}

pub(crate) async fn run_search(config: &SpatialIndexConfig, args: SearchArgs) -> Result<()> {
    let store = connect_store(config).await?;
    let origin = Point3::new(args.x, args.y, args.z);
    let ids = match &args.cell_type {
        Some(cell_type) => {
            store
                .find_within_radius_by_annotation(&args.frame, args.radius, origin, cell_type)
                .await?
        }
        None => {
            store
                .find_within_radius(&args.frame, args.radius, origin)
                .await?
        }
    };
    print_ids(&ids);
    Ok(())
}

pub(crate) async fn run_search_sample(
    config: &SpatialIndexConfig,
    args: SearchSampleArgs,
) -> Result<()> {
    let store = connect_store(config).await?;
    let ids = store
        .find_within_radius_of_sample(&args.frame, args.radius, &args.hubmap_id)
        .await?;
    print_ids(&ids);
    Ok(())
}

pub(crate) async fn run_location(config: &SpatialIndexConfig, args: LocationArgs) -> Result<()> {
    let store = connect_store(config).await?;
    let location = store.location_of(&args.hubmap_id, &args.frame).await?;
    println!("{}", serde_json::to_string_pretty(&location)?);
    Ok(())
}

pub(crate) async fn run_complete_extraction(
    config: &SpatialIndexConfig,
    args: CompleteExtractionArgs,
) -> Result<()> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let callback: ExtractionCallback = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid extraction callback in {}", args.file.display()))?;

    // A one-shot process has no pending requests to match; `serve` does.
    let store = connect_store(config).await?;
    let coordinator = coordinator(config, store, Arc::new(ExtractionTracker::new()))?;
    let report = coordinator.complete(&callback).await?;

    println!(
        "{} Stored {} cell-type counts for sample {}",
        "✓".bright_green(),
        report.stored.bright_cyan(),
        callback.sample_uuid
    );
    if !report.unknown.is_empty() {
        println!(
            "{} Unknown cell types: {}",
            "!".bright_yellow(),
            report.unknown.join(", ")
        );
    }
    Ok(())
}
