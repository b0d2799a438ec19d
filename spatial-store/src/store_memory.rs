use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use log::{debug, error, info};
use spatial_geometry::{PlacedSolid, Point3, Solid};
use spatial_protocol::{DatasetDigest, DatasetIndex, ReferenceFrame, RuiLocation, SampleRecord};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::record::SpatialRecord;
use crate::{SpatialStore, check_radius};

#[derive(Debug, Clone)]
struct StoredRecord {
    record: SpatialRecord,
    solid: Solid,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    samples: HashMap<(String, ReferenceFrame), StoredRecord>,
    datasets: HashMap<String, i64>,
    sample_datasets: HashMap<String, BTreeSet<String>>,
    annotations: HashSet<String>,
    cell_types: HashMap<String, BTreeMap<String, u64>>,
}

/// In-memory spatial store.
///
/// Solids are placed in process and radius checks use the distance to the
/// solid's surface, the same measure `ST_3DDWithin` applies.
#[derive(Debug, Default)]
pub struct MemorySpatialStore {
    tables: RwLock<Tables>,
}

impl MemorySpatialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the given cell-type names present in the annotation table.
    pub fn with_annotations<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tables = Tables {
            annotations: names.into_iter().map(Into::into).collect(),
            ..Tables::default()
        };
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// The record persisted for (sample, frame), if any.
    pub async fn record(&self, sample_uuid: &str, frame: &ReferenceFrame) -> Option<SpatialRecord> {
        let tables = self.tables.read().await;
        tables
            .samples
            .get(&(sample_uuid.to_string(), frame.clone()))
            .map(|stored| stored.record.clone())
    }

    /// Every persisted record, ordered by id.
    pub async fn records(&self) -> Vec<SpatialRecord> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .samples
            .values()
            .map(|stored| stored.record.clone())
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub async fn cell_type_counts(&self, sample_uuid: &str) -> BTreeMap<String, u64> {
        let tables = self.tables.read().await;
        tables.cell_types.get(sample_uuid).cloned().unwrap_or_default()
    }

    async fn search(
        &self,
        frame: &ReferenceFrame,
        radius: f64,
        origin: Point3,
        cell_type: Option<&str>,
    ) -> Result<Vec<String>> {
        check_radius(radius)?;
        let tables = self.tables.read().await;
        let mut ids: Vec<String> = tables
            .samples
            .iter()
            .filter(|((_, f), _)| f == frame)
            .filter(|(_, stored)| stored.solid.distance_to(origin) <= radius)
            .filter(|((uuid, _), _)| {
                cell_type.is_none_or(|name| {
                    tables
                        .cell_types
                        .get(uuid)
                        .is_some_and(|counts| counts.contains_key(name))
                })
            })
            .map(|(_, stored)| stored.record.sample.hubmap_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

#[async_trait]
impl SpatialStore for MemorySpatialStore {
    async fn upsert(&self, frame: &ReferenceFrame, record: &SampleRecord) -> Result<i64> {
        let solid = PlacedSolid::from_location(&record.sample.rui_location)?.world();
        let mut tables = self.tables.write().await;
        let key = (record.sample.uuid.clone(), frame.clone());
        let existing = tables.samples.get(&key).map(|stored| stored.record.id);
        let id = match existing {
            Some(id) => id,
            None => {
                tables.next_id += 1;
                tables.next_id
            }
        };
        tables.samples.insert(
            key,
            StoredRecord {
                record: SpatialRecord::new(id, frame.clone(), record),
                solid,
            },
        );
        debug!("Upserted sample {} in {frame} as id={id}", record.sample.uuid);
        Ok(id)
    }

    async fn find_within_radius(
        &self,
        frame: &ReferenceFrame,
        radius: f64,
        origin: Point3,
    ) -> Result<Vec<String>> {
        self.search(frame, radius, origin, None).await
    }

    async fn find_within_radius_by_annotation(
        &self,
        frame: &ReferenceFrame,
        radius: f64,
        origin: Point3,
        cell_type: &str,
    ) -> Result<Vec<String>> {
        self.search(frame, radius, origin, Some(cell_type)).await
    }

    async fn location_of(&self, hubmap_id: &str, frame: &ReferenceFrame) -> Result<RuiLocation> {
        let tables = self.tables.read().await;
        let mut matches: Vec<&SpatialRecord> = tables
            .samples
            .values()
            .map(|stored| &stored.record)
            .filter(|r| r.sample.hubmap_id == hubmap_id && &r.reference_frame == frame)
            .collect();
        matches.sort_by_key(|r| r.id);
        if matches.len() > 1 {
            error!(
                "Query for a single sample_hubmap_id={hubmap_id} in {frame} returned {} rows; using the first",
                matches.len()
            );
        }
        matches
            .first()
            .map(|r| r.sample.rui_location.clone())
            .ok_or_else(|| StoreError::NotFound {
                hubmap_id: hubmap_id.to_string(),
                reference_frame: frame.to_string(),
            })
    }

    async fn sample_timestamps(&self) -> Result<HashMap<String, i64>> {
        let tables = self.tables.read().await;
        let mut timestamps: HashMap<String, i64> = HashMap::new();
        for ((uuid, _), stored) in &tables.samples {
            let ts = stored.record.sample.last_modified_timestamp;
            timestamps
                .entry(uuid.clone())
                .and_modify(|current| *current = (*current).max(ts))
                .or_insert(ts);
        }
        Ok(timestamps)
    }

    async fn sample_datasets(&self) -> Result<DatasetIndex> {
        let tables = self.tables.read().await;
        let mut index = DatasetIndex::new();
        for (sample_uuid, dataset_uuids) in &tables.sample_datasets {
            let entry = index.entry(sample_uuid.clone()).or_default();
            for dataset_uuid in dataset_uuids {
                if let Some(ts) = tables.datasets.get(dataset_uuid) {
                    entry.insert(dataset_uuid.clone(), *ts);
                }
            }
        }
        Ok(index)
    }

    async fn record_sample_datasets(
        &self,
        sample_uuid: &str,
        datasets: &[DatasetDigest],
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        for digest in datasets {
            tables
                .datasets
                .insert(digest.dataset_uuid.clone(), digest.last_modified_timestamp);
        }
        let linked: BTreeSet<String> = datasets.iter().map(|d| d.dataset_uuid.clone()).collect();
        if linked.is_empty() {
            tables.sample_datasets.remove(sample_uuid);
        } else {
            tables.sample_datasets.insert(sample_uuid.to_string(), linked);
        }
        info!("Recorded {} datasets for sample {sample_uuid}", datasets.len());
        Ok(())
    }

    async fn replace_cell_type_counts(
        &self,
        sample_uuid: &str,
        counts: &BTreeMap<String, u64>,
    ) -> Result<Vec<String>> {
        let mut tables = self.tables.write().await;
        let (known, unknown): (BTreeMap<String, u64>, BTreeMap<String, u64>) = counts
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .partition(|(name, _)| tables.annotations.contains(name));
        tables.cell_types.insert(sample_uuid.to_string(), known);
        Ok(unknown.into_keys().collect())
    }
}
