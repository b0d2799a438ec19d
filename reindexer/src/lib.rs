/*!
# Spatial Reindexer

Keeps the spatial store in step with the provenance graph.

## Features

- **Incremental reindex**: only samples whose own timestamp or analysis datasets changed
- **Full, per-organ and single-sample reindex**
- **Two frames per sample**: the organ frame, plus the donor's whole-body frame when the sex is known
- **Concurrent processing**: bounded by `ReindexConfig::max_concurrent`
- **Extraction hand-off**: every processed sample with datasets gets a cell-type count extraction requested

## Example

```rust,no_run
use std::sync::Arc;

use spatial_extraction::ExtractionCoordinator;
use spatial_graph::GraphSource;
use spatial_placement::PlacementResolver;
use spatial_reindexer::{Reconciler, ReindexConfig, ReindexMode};
use spatial_store::SpatialStore;

async fn run(
    graph: Arc<dyn GraphSource>,
    store: Arc<dyn SpatialStore>,
    resolver: PlacementResolver,
    extraction: Arc<ExtractionCoordinator>,
) -> anyhow::Result<()> {
    let reconciler = Reconciler::new(graph, store, resolver, extraction, ReindexConfig::default())?;
    let dispatch = reconciler.reconcile(ReindexMode::Incremental).await?;
    println!("{} samples selected", dispatch.selected);

    let stats = dispatch.wait().await?;
    println!("{} processed, {} failed", stats.samples_processed, stats.samples_failed);
    Ok(())
}
```
*/

mod config;
mod error;
mod reconciler;
mod snapshot;

pub use config::ReindexConfig;
pub use error::{ReindexError, Result};
pub use reconciler::{Reconciler, ReindexDispatch, ReindexMode, ReindexStats};
pub use snapshot::{LocalSnapshot, ReindexReason};
