use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use spatial_extraction::{ExtractionCoordinator, ExtractionService, ExtractionTracker};
use spatial_graph::{GraphSource, SampleBatch};
use spatial_placement::{PlacementConfig, PlacementError, PlacementResolver, PlacementService};
use spatial_protocol::{
    DatasetIndex, DatasetTimestamps, Donor, ExtractionRequest, Organ, Placement, ReferenceFrame,
    RuiLocation, Sample, SampleRecord, Sex,
};
use spatial_reindexer::{Reconciler, ReindexConfig, ReindexError, ReindexMode};
use spatial_store::{MemorySpatialStore, SpatialStore};

/// Graph source whose contents the test edits between runs
#[derive(Default)]
struct ScriptedGraph {
    records: Mutex<Vec<SampleRecord>>,
    datasets: Mutex<DatasetIndex>,
}

impl ScriptedGraph {
    fn add(&self, record: SampleRecord, datasets: &[(&str, i64)]) {
        let uuid = record.sample.uuid.clone();
        self.records.lock().unwrap().push(record);
        if !datasets.is_empty() {
            let timestamps: DatasetTimestamps = datasets
                .iter()
                .map(|(d, ts)| (d.to_string(), *ts))
                .collect();
            self.datasets.lock().unwrap().insert(uuid, timestamps);
        }
    }

    fn set_dataset(&self, sample_uuid: &str, dataset_uuid: &str, ts: i64) {
        self.datasets
            .lock()
            .unwrap()
            .entry(sample_uuid.to_string())
            .or_default()
            .insert(dataset_uuid.to_string(), ts);
    }

    fn drop_dataset(&self, sample_uuid: &str, dataset_uuid: &str) {
        if let Some(datasets) = self.datasets.lock().unwrap().get_mut(sample_uuid) {
            datasets.remove(dataset_uuid);
        }
    }

    fn touch(&self, sample_uuid: &str, ts: i64) {
        for record in self.records.lock().unwrap().iter_mut() {
            if record.sample.uuid == sample_uuid {
                record.sample.last_modified_timestamp = ts;
            }
        }
    }

    fn batch(&self, keep: impl Fn(&SampleRecord) -> bool) -> SampleBatch {
        let records: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| keep(r))
            .cloned()
            .collect();
        SampleBatch {
            rows: records.len(),
            bad_parse: 0,
            records,
        }
    }
}

#[async_trait]
impl GraphSource for ScriptedGraph {
    async fn sample_records(&self, organ_code: Option<&str>) -> spatial_graph::Result<SampleBatch> {
        Ok(self.batch(|r| organ_code.is_none_or(|code| r.organ.code == code)))
    }

    async fn sample_record(&self, sample_uuid: &str) -> spatial_graph::Result<SampleBatch> {
        Ok(self.batch(|r| r.sample.uuid == sample_uuid))
    }

    async fn sample_datasets(
        &self,
        sample_uuid: Option<&str>,
    ) -> spatial_graph::Result<DatasetIndex> {
        let datasets = self.datasets.lock().unwrap();
        Ok(datasets
            .iter()
            .filter(|(uuid, _)| sample_uuid.is_none_or(|s| s == uuid.as_str()))
            .map(|(uuid, ds)| (uuid.clone(), ds.clone()))
            .collect())
    }
}

/// Places every sample at a fixed offset in the requested frame, except for
/// targets listed in `reject`.
#[derive(Default)]
struct ScriptedPlacement {
    reject: HashSet<String>,
    targets: Mutex<Vec<String>>,
}

#[async_trait]
impl PlacementService for ScriptedPlacement {
    async fn place(
        &self,
        target_iri: &str,
        rui_location: &RuiLocation,
    ) -> spatial_placement::Result<Placement> {
        self.targets
            .lock()
            .unwrap()
            .push(rui_location.placement.target.clone());
        if self.reject.contains(target_iri) {
            return Err(PlacementError::Rejected {
                status: 500,
                target_iri: target_iri.to_string(),
                body: "no path to target".to_string(),
            });
        }
        Ok(serde_json::from_value(json!({
            "@type": "SpatialPlacement",
            "target": target_iri,
            "x_translation": 100,
            "y_translation": 800,
            "z_translation": 50
        }))
        .unwrap())
    }
}

#[derive(Default)]
struct RecordingExtraction {
    requests: Mutex<Vec<ExtractionRequest>>,
}

#[async_trait]
impl ExtractionService for RecordingExtraction {
    async fn begin(&self, request: &ExtractionRequest) -> spatial_extraction::Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

struct Harness {
    graph: Arc<ScriptedGraph>,
    store: Arc<MemorySpatialStore>,
    placement: Arc<ScriptedPlacement>,
    extraction: Arc<RecordingExtraction>,
    tracker: Arc<ExtractionTracker>,
    reconciler: Reconciler,
}

impl Harness {
    fn new() -> Self {
        Self::with_placement(ScriptedPlacement::default())
    }

    fn with_placement(placement: ScriptedPlacement) -> Self {
        let graph = Arc::new(ScriptedGraph::default());
        let store = Arc::new(MemorySpatialStore::new());
        let placement = Arc::new(placement);
        let extraction = Arc::new(RecordingExtraction::default());
        let tracker = Arc::new(ExtractionTracker::new());

        let resolver = PlacementResolver::new(
            placement.clone(),
            &PlacementConfig::new("http://placement.invalid/get-spatial-placement"),
        );
        let coordinator = Arc::new(ExtractionCoordinator::new(
            extraction.clone(),
            store.clone(),
            tracker.clone(),
        ));
        let reconciler = Reconciler::new(
            graph.clone(),
            store.clone(),
            resolver,
            coordinator,
            ReindexConfig { max_concurrent: 2 },
        )
        .unwrap();

        Self {
            graph,
            store,
            placement,
            extraction,
            tracker,
            reconciler,
        }
    }

    fn extraction_count(&self) -> usize {
        self.extraction.requests.lock().unwrap().len()
    }
}

fn record(uuid: &str, organ: &str, sex: Sex, ts: i64) -> SampleRecord {
    let rui_location: RuiLocation = serde_json::from_value(json!({
        "@type": "SpatialEntity",
        "x_dimension": 10, "y_dimension": 10, "z_dimension": 4,
        "placement": {
            "@type": "SpatialPlacement",
            "target": "http://purl.org/ccf/latest/ccf.owl#VHLeftKidney",
            "x_translation": 20, "y_translation": 30, "z_translation": 40
        }
    }))
    .unwrap();
    SampleRecord {
        sample: Sample {
            uuid: uuid.to_string(),
            hubmap_id: format!("HBM-{uuid}"),
            category: Some("block".to_string()),
            last_modified_timestamp: ts,
            rui_location,
        },
        organ: Organ {
            uuid: format!("organ-{organ}"),
            code: organ.to_string(),
        },
        donor: Donor {
            uuid: format!("donor-{uuid}"),
            sex,
        },
    }
}

#[tokio::test]
async fn never_indexed_sample_is_placed_in_both_frames() -> anyhow::Result<()> {
    let h = Harness::new();
    h.graph.add(record("S", "LK", Sex::Male, 100), &[("D", 40)]);

    let dispatch = h.reconciler.reconcile(ReindexMode::Incremental).await?;
    assert_eq!(dispatch.selected, 1);
    let stats = dispatch.wait().await?;
    assert_eq!(stats.samples_processed, 1);
    assert_eq!(stats.samples_failed, 0);
    assert_eq!(stats.extractions_requested, 1);

    let organ = h
        .store
        .record("S", &ReferenceFrame::organ("LK"))
        .await
        .unwrap();
    assert_eq!(
        organ.sample.rui_location.placement.target_code(),
        "VHLeftKidney"
    );

    let body = h.store.record("S", &ReferenceFrame::MaleBody).await.unwrap();
    assert_eq!(body.sample.rui_location.placement.target_code(), "VHMale");
    assert_eq!(
        body.sample.rui_location.placement.translation(),
        [100.0, 800.0, 50.0]
    );

    // The legacy kidney target was corrected before placement.
    assert_eq!(
        h.placement.targets.lock().unwrap().clone(),
        vec!["http://purl.org/ccf/latest/ccf.owl#VHMLeftKidney_Patch".to_string()]
    );

    let requests = h.extraction.requests.lock().unwrap().clone();
    assert_eq!(requests[0].dataset_uuids, vec!["D"]);
    assert_eq!(h.tracker.count(), 1);
    Ok(())
}

#[tokio::test]
async fn unchanged_sample_is_not_selected_again() -> anyhow::Result<()> {
    let h = Harness::new();
    h.graph.add(record("S", "LK", Sex::Male, 100), &[("D", 40)]);
    h.reconciler
        .reconcile(ReindexMode::Incremental)
        .await?
        .wait()
        .await?;

    let dispatch = h.reconciler.reconcile(ReindexMode::Incremental).await?;
    assert_eq!(dispatch.selected, 0);
    assert_eq!(dispatch.wait().await?.samples_processed, 0);
    assert_eq!(h.extraction_count(), 1);
    Ok(())
}

#[tokio::test]
async fn newer_dataset_selects_sample() -> anyhow::Result<()> {
    let h = Harness::new();
    h.graph.add(record("S", "LK", Sex::Male, 100), &[("D", 40)]);
    h.reconciler
        .reconcile(ReindexMode::Incremental)
        .await?
        .wait()
        .await?;

    h.graph.set_dataset("S", "D", 50);
    let dispatch = h.reconciler.reconcile(ReindexMode::Incremental).await?;
    assert_eq!(dispatch.selected, 1);
    dispatch.wait().await?;

    let local = h.store.sample_datasets().await?;
    assert_eq!(local["S"]["D"], 50);
    Ok(())
}

#[tokio::test]
async fn dropped_dataset_is_reindexed_once() -> anyhow::Result<()> {
    let h = Harness::new();
    h.graph
        .add(record("S", "LK", Sex::Male, 100), &[("D1", 40), ("D2", 40)]);
    h.reconciler
        .reconcile(ReindexMode::Incremental)
        .await?
        .wait()
        .await?;

    h.graph.drop_dataset("S", "D2");
    let dispatch = h.reconciler.reconcile(ReindexMode::Incremental).await?;
    assert_eq!(dispatch.selected, 1);
    dispatch.wait().await?;

    let local = h.store.sample_datasets().await?;
    assert_eq!(local["S"], DatasetTimestamps::from([("D1".to_string(), 40)]));
    assert_eq!(
        h.reconciler
            .reconcile(ReindexMode::Incremental)
            .await?
            .selected,
        0
    );

    // Losing the last dataset settles the same way.
    h.graph.drop_dataset("S", "D1");
    h.graph.touch("S", 101);
    h.reconciler
        .reconcile(ReindexMode::Incremental)
        .await?
        .wait()
        .await?;
    assert!(!h.store.sample_datasets().await?.contains_key("S"));
    assert_eq!(
        h.reconciler
            .reconcile(ReindexMode::Incremental)
            .await?
            .selected,
        0
    );
    Ok(())
}

#[tokio::test]
async fn duplicate_graph_rows_are_dispatched_once() -> anyhow::Result<()> {
    let h = Harness::new();
    h.graph.add(record("S", "LK", Sex::Male, 100), &[("D", 1)]);
    h.graph.add(record("S", "LK", Sex::Male, 100), &[("D", 1)]);

    let dispatch = h.reconciler.reconcile(ReindexMode::Full).await?;
    assert_eq!(dispatch.selected, 1);
    assert_eq!(dispatch.wait().await?.samples_processed, 1);

    let dispatch = h.reconciler.reindex_organ("LK").await?;
    assert_eq!(dispatch.selected, 1);
    dispatch.wait().await?;

    let requests = h.extraction.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.dataset_uuids == vec!["D"]));
    Ok(())
}

#[tokio::test]
async fn newer_sample_without_datasets_is_selected() -> anyhow::Result<()> {
    let h = Harness::new();
    h.graph.add(record("S", "LK", Sex::Female, 100), &[]);
    let stats = h
        .reconciler
        .reconcile(ReindexMode::Incremental)
        .await?
        .wait()
        .await?;
    // Nothing to extract without datasets.
    assert_eq!(stats.extractions_requested, 0);
    assert_eq!(h.tracker.count(), 0);

    assert_eq!(
        h.reconciler
            .reconcile(ReindexMode::Incremental)
            .await?
            .selected,
        0
    );

    h.graph.touch("S", 101);
    assert_eq!(
        h.reconciler
            .reconcile(ReindexMode::Incremental)
            .await?
            .selected,
        1
    );
    Ok(())
}

#[tokio::test]
async fn full_reindex_selects_everything() -> anyhow::Result<()> {
    let h = Harness::new();
    h.graph.add(record("S1", "LK", Sex::Male, 100), &[("D1", 1)]);
    h.graph.add(record("S2", "RK", Sex::Female, 100), &[("D2", 1)]);
    h.reconciler
        .reconcile(ReindexMode::Incremental)
        .await?
        .wait()
        .await?;

    let dispatch = h.reconciler.reconcile(ReindexMode::Full).await?;
    assert_eq!(dispatch.selected, 2);
    assert_eq!(dispatch.wait().await?.samples_processed, 2);
    assert_eq!(h.extraction_count(), 4);

    // Upserts replace rows instead of adding new ones.
    assert_eq!(h.store.records().await.len(), 4);
    Ok(())
}

#[tokio::test]
async fn whole_body_frame_follows_donor_sex() -> anyhow::Result<()> {
    let h = Harness::new();
    h.graph.add(record("F", "LK", Sex::Female, 1), &[]);
    h.graph.add(record("U", "LK", Sex::Unknown, 1), &[]);
    h.reconciler.reconcile(ReindexMode::Full).await?.wait().await?;

    assert!(h.store.record("F", &ReferenceFrame::FemaleBody).await.is_some());
    assert!(h.store.record("F", &ReferenceFrame::MaleBody).await.is_none());

    assert!(h.store.record("U", &ReferenceFrame::organ("LK")).await.is_some());
    assert!(h.store.record("U", &ReferenceFrame::MaleBody).await.is_none());
    assert!(h.store.record("U", &ReferenceFrame::FemaleBody).await.is_none());

    // Only the female donor needed a placement.
    assert_eq!(
        h.placement.targets.lock().unwrap().clone(),
        vec!["http://purl.org/ccf/latest/ccf.owl#VHFLeftKidney_Patch".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn rejected_placement_skips_only_that_frame() -> anyhow::Result<()> {
    let placement = ScriptedPlacement {
        reject: HashSet::from([ReferenceFrame::MaleBody.iri()]),
        ..Default::default()
    };
    let h = Harness::with_placement(placement);
    h.graph.add(record("S", "LK", Sex::Male, 100), &[("D", 1)]);

    let stats = h.reconciler.reconcile(ReindexMode::Full).await?.wait().await?;
    assert_eq!(stats.samples_processed, 1);
    assert_eq!(stats.placements_skipped, 1);
    assert_eq!(stats.extractions_requested, 1);

    assert!(h.store.record("S", &ReferenceFrame::organ("LK")).await.is_some());
    assert!(h.store.record("S", &ReferenceFrame::MaleBody).await.is_none());
    Ok(())
}

#[tokio::test]
async fn single_sample_reindex() -> anyhow::Result<()> {
    let h = Harness::new();
    h.graph.add(record("S", "LK", Sex::Male, 100), &[("D", 1)]);
    h.graph.add(record("T", "LK", Sex::Male, 100), &[("E", 1)]);

    let dispatch = h.reconciler.reindex_sample("S").await?;
    assert_eq!(dispatch.selected, 1);
    dispatch.wait().await?;
    assert!(h.store.record("T", &ReferenceFrame::organ("LK")).await.is_none());
    assert_eq!(
        h.extraction.requests.lock().unwrap()[0].sample_uuid,
        "S"
    );

    let missing = h.reconciler.reindex_sample("nope").await.unwrap_err();
    assert!(matches!(missing, ReindexError::SampleNotFound(ref uuid) if uuid == "nope"));

    h.graph.add(record("S", "LK", Sex::Male, 100), &[]);
    let ambiguous = h.reconciler.reindex_sample("S").await.unwrap_err();
    assert!(matches!(
        ambiguous,
        ReindexError::AmbiguousSample { count: 2, .. }
    ));
    Ok(())
}

#[tokio::test]
async fn organ_reindex_is_limited_to_the_organ() -> anyhow::Result<()> {
    let h = Harness::new();
    h.graph.add(record("L", "LK", Sex::Male, 1), &[("D1", 1)]);
    h.graph.add(record("R", "RK", Sex::Male, 1), &[("D2", 1)]);

    let dispatch = h.reconciler.reindex_organ("RK").await?;
    assert_eq!(dispatch.selected, 1);
    dispatch.wait().await?;

    assert!(h.store.record("R", &ReferenceFrame::organ("RK")).await.is_some());
    assert!(h.store.record("L", &ReferenceFrame::organ("LK")).await.is_none());
    let counts: BTreeMap<_, _> = h
        .extraction
        .requests
        .lock()
        .unwrap()
        .iter()
        .map(|r| (r.sample_uuid.clone(), r.dataset_uuids.clone()))
        .collect();
    assert_eq!(
        counts,
        BTreeMap::from([("R".to_string(), vec!["D2".to_string()])])
    );
    Ok(())
}
