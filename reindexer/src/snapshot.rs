use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;

use log::debug;
use spatial_protocol::DatasetIndex;
use spatial_protocol::DatasetTimestamps;
use spatial_protocol::Sample;
use spatial_protocol::SampleRecord;
use spatial_store::SpatialStore;

use crate::error::Result;

/// Why a sample was selected for reprocessing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReindexReason {
    NeverIndexed,
    SampleNewer { graph: i64, local: i64 },
    DatasetsMissingLocally,
    DatasetCountChanged { graph: usize, local: usize },
    DatasetAdded(String),
    DatasetNewer { dataset_uuid: String, graph: i64, local: i64 },
    Requested,
}

impl fmt::Display for ReindexReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReindexReason::NeverIndexed => write!(f, "never indexed"),
            ReindexReason::SampleNewer { graph, local } => {
                write!(f, "sample modified ({local} -> {graph})")
            }
            ReindexReason::DatasetsMissingLocally => write!(f, "no datasets recorded locally"),
            ReindexReason::DatasetCountChanged { graph, local } => {
                write!(f, "dataset count changed ({local} -> {graph})")
            }
            ReindexReason::DatasetAdded(uuid) => write!(f, "new dataset {uuid}"),
            ReindexReason::DatasetNewer {
                dataset_uuid,
                graph,
                local,
            } => write!(f, "dataset {dataset_uuid} modified ({local} -> {graph})"),
            ReindexReason::Requested => write!(f, "requested"),
        }
    }
}

/// What the spatial store currently knows: sample timestamps and the
/// datasets recorded per sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSnapshot {
    pub sample_timestamps: HashMap<String, i64>,
    pub datasets: DatasetIndex,
}

impl LocalSnapshot {
    pub async fn load(store: &dyn SpatialStore) -> Result<Self> {
        Ok(Self {
            sample_timestamps: store.sample_timestamps().await?,
            datasets: store.sample_datasets().await?,
        })
    }

    /// Check whether a graph sample differs from what was indexed.
    ///
    /// Samples without analysis datasets in the graph are compared on their
    /// own timestamp only.
    pub fn needs_reindex(
        &self,
        sample: &Sample,
        graph_datasets: Option<&DatasetTimestamps>,
    ) -> Option<ReindexReason> {
        let Some(&local) = self.sample_timestamps.get(&sample.uuid) else {
            return Some(ReindexReason::NeverIndexed);
        };
        if sample.last_modified_timestamp > local {
            return Some(ReindexReason::SampleNewer {
                graph: sample.last_modified_timestamp,
                local,
            });
        }

        let graph_datasets = graph_datasets.filter(|d| !d.is_empty())?;
        let Some(local_datasets) = self.datasets.get(&sample.uuid).filter(|d| !d.is_empty())
        else {
            return Some(ReindexReason::DatasetsMissingLocally);
        };
        if local_datasets.len() != graph_datasets.len() {
            return Some(ReindexReason::DatasetCountChanged {
                graph: graph_datasets.len(),
                local: local_datasets.len(),
            });
        }

        for (dataset_uuid, &graph_ts) in graph_datasets {
            match local_datasets.get(dataset_uuid) {
                None => return Some(ReindexReason::DatasetAdded(dataset_uuid.clone())),
                Some(&local_ts) if graph_ts > local_ts => {
                    return Some(ReindexReason::DatasetNewer {
                        dataset_uuid: dataset_uuid.clone(),
                        graph: graph_ts,
                        local: local_ts,
                    });
                }
                Some(_) => {}
            }
        }
        None
    }

    /// Samples that need reprocessing, each listed once, in graph order.
    pub fn changed_samples<'a>(
        &self,
        records: &'a [SampleRecord],
        graph_datasets: &DatasetIndex,
    ) -> Vec<(&'a SampleRecord, ReindexReason)> {
        let mut seen = HashSet::new();
        let mut changed = Vec::new();
        for record in records {
            if !seen.insert(record.sample.uuid.as_str()) {
                continue;
            }
            let datasets = graph_datasets.get(&record.sample.uuid);
            if let Some(reason) = self.needs_reindex(&record.sample, datasets) {
                debug!("Reindexing sample {}: {reason}", record.sample.uuid);
                changed.push((record, reason));
            }
        }
        changed
    }
}
