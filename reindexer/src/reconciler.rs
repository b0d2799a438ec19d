use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, error, info, warn};
use spatial_extraction::ExtractionCoordinator;
use spatial_graph::GraphSource;
use spatial_placement::PlacementResolver;
use spatial_protocol::DatasetIndex;
use spatial_protocol::DatasetTimestamps;
use spatial_protocol::ReferenceFrame;
use spatial_protocol::SampleRecord;
use spatial_store::SpatialStore;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::ReindexConfig;
use crate::error::{ReindexError, Result};
use crate::snapshot::{LocalSnapshot, ReindexReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexMode {
    /// Only samples that changed since they were last indexed
    Incremental,
    /// Every sample the graph returns
    Full,
}

/// Statistics about a reindex run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReindexStats {
    pub samples_processed: usize,
    pub samples_failed: usize,
    pub placements_skipped: usize,
    pub extractions_requested: usize,
}

/// A reindex that has been scheduled. `selected` is known up front; the
/// handle resolves once every sample has been processed.
#[derive(Debug)]
pub struct ReindexDispatch {
    pub selected: usize,
    pub handle: JoinHandle<ReindexStats>,
}

impl ReindexDispatch {
    pub async fn wait(self) -> Result<ReindexStats> {
        self.handle
            .await
            .map_err(|e| ReindexError::Task(e.to_string()))
    }
}

#[derive(Debug, Default)]
struct SampleOutcome {
    placement_skipped: bool,
    extraction_requested: bool,
}

struct Inner {
    graph: Arc<dyn GraphSource>,
    store: Arc<dyn SpatialStore>,
    resolver: PlacementResolver,
    extraction: Arc<ExtractionCoordinator>,
    config: ReindexConfig,
}

/// Brings the spatial store in line with the provenance graph.
///
/// Every entry point selects samples, returns a [`ReindexDispatch`]
/// immediately and processes the selection in the background.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

impl Reconciler {
    pub fn new(
        graph: Arc<dyn GraphSource>,
        store: Arc<dyn SpatialStore>,
        resolver: PlacementResolver,
        extraction: Arc<ExtractionCoordinator>,
        config: ReindexConfig,
    ) -> Result<Self> {
        config.validate().map_err(ReindexError::Config)?;
        Ok(Self {
            inner: Arc::new(Inner {
                graph,
                store,
                resolver,
                extraction,
                config,
            }),
        })
    }

    /// Reindex all samples, or only the changed ones.
    pub async fn reconcile(&self, mode: ReindexMode) -> Result<ReindexDispatch> {
        let batch = self.inner.graph.sample_records(None).await?;
        let graph_datasets = self.inner.graph.sample_datasets(None).await?;

        let selected: Vec<(SampleRecord, ReindexReason)> = match mode {
            ReindexMode::Incremental => {
                let local = LocalSnapshot::load(self.inner.store.as_ref()).await?;
                local
                    .changed_samples(&batch.records, &graph_datasets)
                    .into_iter()
                    .map(|(record, reason)| (record.clone(), reason))
                    .collect()
            }
            ReindexMode::Full => batch
                .records
                .into_iter()
                .map(|record| (record, ReindexReason::Requested))
                .collect(),
        };

        let work = with_datasets(selected, &graph_datasets);
        info!(
            "{mode:?} reindex: {} of {} graph samples selected",
            work.len(),
            batch.rows
        );
        Ok(self.dispatch(work))
    }

    /// Reindex one sample unconditionally. The graph must return exactly
    /// one record for it.
    pub async fn reindex_sample(&self, sample_uuid: &str) -> Result<ReindexDispatch> {
        let mut batch = self.inner.graph.sample_record(sample_uuid).await?;
        let record = match batch.records.len() {
            0 => return Err(ReindexError::SampleNotFound(sample_uuid.to_string())),
            1 => batch.records.remove(0),
            count => {
                return Err(ReindexError::AmbiguousSample {
                    sample_uuid: sample_uuid.to_string(),
                    count,
                });
            }
        };
        let graph_datasets = self.inner.graph.sample_datasets(Some(sample_uuid)).await?;

        info!("Reindexing sample {sample_uuid}");
        let work = with_datasets(
            vec![(record, ReindexReason::Requested)],
            &graph_datasets,
        );
        Ok(self.dispatch(work))
    }

    /// Reindex every sample taken from one organ.
    pub async fn reindex_organ(&self, organ_code: &str) -> Result<ReindexDispatch> {
        let batch = self.inner.graph.sample_records(Some(organ_code)).await?;
        let graph_datasets = self.inner.graph.sample_datasets(None).await?;

        info!(
            "Reindexing {} samples of organ {organ_code}",
            batch.records.len()
        );
        let selected = batch
            .records
            .into_iter()
            .map(|record| (record, ReindexReason::Requested))
            .collect();
        let work = with_datasets(selected, &graph_datasets);
        Ok(self.dispatch(work))
    }

    fn dispatch(&self, work: Vec<(SampleRecord, DatasetTimestamps)>) -> ReindexDispatch {
        let selected = work.len();
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { Self::process_all(inner, work).await });
        ReindexDispatch { selected, handle }
    }

    /// Process samples concurrently, bounded by `max_concurrent`.
    async fn process_all(
        inner: Arc<Inner>,
        work: Vec<(SampleRecord, DatasetTimestamps)>,
    ) -> ReindexStats {
        let mut stats = ReindexStats::default();
        let semaphore = Arc::new(Semaphore::new(inner.config.max_concurrent));
        let mut tasks = Vec::new();

        for (record, datasets) in work {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Semaphore error: {e}");
                    break;
                }
            };

            let inner = inner.clone();
            let task = tokio::spawn(async move {
                let uuid = record.sample.uuid.clone();
                let result = Self::process_sample(&inner, &record, &datasets).await;
                drop(permit);
                (uuid, result)
            });
            tasks.push(task);
        }

        // Wait for all tasks
        for task in tasks {
            match task.await {
                Ok((_, Ok(outcome))) => {
                    stats.samples_processed += 1;
                    if outcome.placement_skipped {
                        stats.placements_skipped += 1;
                    }
                    if outcome.extraction_requested {
                        stats.extractions_requested += 1;
                    }
                }
                Ok((uuid, Err(e))) => {
                    error!("Failed to reindex sample {uuid}: {e}");
                    stats.samples_failed += 1;
                }
                Err(e) => {
                    error!("Reindex task panicked: {e}");
                    stats.samples_failed += 1;
                }
            }
        }

        info!(
            "Reindex complete: {} processed, {} failed, {} placements skipped, {} extractions requested",
            stats.samples_processed,
            stats.samples_failed,
            stats.placements_skipped,
            stats.extractions_requested
        );
        stats
    }

    /// Refresh both frames of one sample, then request its extraction.
    async fn process_sample(
        inner: &Inner,
        record: &SampleRecord,
        datasets: &DatasetTimestamps,
    ) -> Result<SampleOutcome> {
        let uuid = &record.sample.uuid;
        let mut outcome = SampleOutcome::default();

        let organ_frame = ReferenceFrame::organ(record.organ.code.clone());
        inner.store.upsert(&organ_frame, record).await?;

        match ReferenceFrame::whole_body(record.donor.sex) {
            Some(body) => match inner.resolver.resolve(&body, record).await {
                Ok(location) => {
                    inner
                        .store
                        .upsert(&body, &record.with_rui_location(location))
                        .await?;
                }
                Err(e) => {
                    warn!("Skipping {body} placement of sample {uuid}: {e}");
                    outcome.placement_skipped = true;
                }
            },
            None => debug!("Donor sex of sample {uuid} is unknown, indexing organ frame only"),
        }

        outcome.extraction_requested = inner.extraction.begin(uuid, datasets).await?;
        Ok(outcome)
    }
}

/// Pair each selected record with its graph datasets. The graph can return
/// a sample more than once; only its first record is kept.
fn with_datasets(
    selected: Vec<(SampleRecord, ReindexReason)>,
    graph_datasets: &DatasetIndex,
) -> Vec<(SampleRecord, DatasetTimestamps)> {
    let mut seen = HashSet::new();
    selected
        .into_iter()
        .filter_map(|(record, _)| {
            if !seen.insert(record.sample.uuid.clone()) {
                debug!("Skipping duplicate graph record of sample {}", record.sample.uuid);
                return None;
            }
            let datasets = graph_datasets
                .get(&record.sample.uuid)
                .cloned()
                .unwrap_or_default();
            Some((record, datasets))
        })
        .collect()
}
