use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use spatial_protocol::DatasetTimestamps;
use spatial_protocol::ExtractionCallback;
use spatial_protocol::ExtractionRequest;
use spatial_protocol::digests_of;
use spatial_store::SpatialStore;
use tokio::io::AsyncWriteExt;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::client::ExtractionService;
use crate::error::Result;
use crate::tracker::ExtractionTracker;

/// Outcome of handling one extraction callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionReport {
    /// Time since the matching request, if one was pending.
    pub turnaround: Option<Duration>,
    /// Number of counts written.
    pub stored: usize,
    /// Names missing from the annotation table, skipped.
    pub unknown: Vec<String>,
}

/// Ties the extraction collaborator, the store and the tracker together:
/// `begin` sends a request and records it as pending, `complete` closes it
/// out when the collaborator calls back.
pub struct ExtractionCoordinator {
    service: Arc<dyn ExtractionService>,
    store: Arc<dyn SpatialStore>,
    tracker: Arc<ExtractionTracker>,
    unknown_names_file: Option<PathBuf>,
}

impl ExtractionCoordinator {
    pub fn new(
        service: Arc<dyn ExtractionService>,
        store: Arc<dyn SpatialStore>,
        tracker: Arc<ExtractionTracker>,
    ) -> Self {
        Self {
            service,
            store,
            tracker,
            unknown_names_file: None,
        }
    }

    pub fn with_unknown_names_file(mut self, path: Option<PathBuf>) -> Self {
        self.unknown_names_file = path;
        self
    }

    pub fn tracker(&self) -> &Arc<ExtractionTracker> {
        &self.tracker
    }

    /// Request an extraction for the sample's datasets. Returns `false`
    /// without contacting the collaborator when the sample has no datasets;
    /// any links left from an earlier run are dropped.
    ///
    /// A failure to record the dataset links is logged; the request is
    /// still tracked since the collaborator already accepted it.
    pub async fn begin(&self, sample_uuid: &str, datasets: &DatasetTimestamps) -> Result<bool> {
        if datasets.is_empty() {
            info!("Sample {sample_uuid} has no analysis datasets, nothing to extract");
            self.store.record_sample_datasets(sample_uuid, &[]).await?;
            return Ok(false);
        }

        let request = ExtractionRequest {
            sample_uuid: sample_uuid.to_string(),
            dataset_uuids: datasets.keys().cloned().collect(),
        };
        self.service.begin(&request).await?;

        if let Err(err) = self
            .store
            .record_sample_datasets(sample_uuid, &digests_of(datasets))
            .await
        {
            error!("Failed to record datasets of sample {sample_uuid}: {err}");
        }

        self.tracker.register(sample_uuid);
        Ok(true)
    }

    /// Handle the collaborator's callback for one sample.
    pub async fn complete(&self, callback: &ExtractionCallback) -> Result<CompletionReport> {
        let sample_uuid = &callback.sample_uuid;
        let turnaround = self.tracker.resolve(sample_uuid).map(|at| at.elapsed());
        match turnaround {
            Some(elapsed) => info!(
                "Extraction for sample {sample_uuid} returned after {}s",
                elapsed.as_secs()
            ),
            None => warn!("Extraction callback for sample {sample_uuid} without a pending request"),
        }

        let unknown = self
            .store
            .replace_cell_type_counts(sample_uuid, &callback.cell_type_counts)
            .await?;
        for name in &unknown {
            error!("Cell type '{name}' of sample {sample_uuid} is not in the annotation table");
        }
        if !unknown.is_empty() {
            self.save_unknown(&unknown).await?;
        }

        Ok(CompletionReport {
            turnaround,
            stored: callback.cell_type_counts.len() - unknown.len(),
            unknown,
        })
    }

    async fn save_unknown(&self, names: &[String]) -> Result<()> {
        let Some(path) = &self.unknown_names_file else {
            return Ok(());
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let mut contents = names.join("\n");
        contents.push('\n');
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use spatial_store::MemorySpatialStore;

    use crate::error::ExtractionError;

    #[derive(Default)]
    struct RecordingService {
        requests: Mutex<Vec<ExtractionRequest>>,
        reject: bool,
    }

    #[async_trait]
    impl ExtractionService for RecordingService {
        async fn begin(&self, request: &ExtractionRequest) -> Result<()> {
            if self.reject {
                return Err(ExtractionError::Rejected {
                    sample_uuid: request.sample_uuid.clone(),
                    status: 500,
                    body: String::new(),
                });
            }
            self.requests.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn datasets() -> DatasetTimestamps {
        BTreeMap::from([("ds-1".to_string(), 10), ("ds-2".to_string(), 20)])
    }

    fn coordinator(
        service: Arc<RecordingService>,
        store: Arc<MemorySpatialStore>,
    ) -> ExtractionCoordinator {
        ExtractionCoordinator::new(service, store, Arc::new(ExtractionTracker::new()))
    }

    #[tokio::test]
    async fn test_begin_records_and_registers() {
        let service = Arc::new(RecordingService::default());
        let store = Arc::new(MemorySpatialStore::new());
        let coordinator = coordinator(service.clone(), store.clone());

        assert!(coordinator.begin("s-1", &datasets()).await.unwrap());

        let requests = service.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].dataset_uuids, vec!["ds-1", "ds-2"]);
        assert_eq!(coordinator.tracker().count(), 1);

        let local = store.sample_datasets().await.unwrap();
        assert_eq!(local["s-1"], datasets());
    }

    #[tokio::test]
    async fn test_begin_without_datasets_sends_nothing() {
        let service = Arc::new(RecordingService::default());
        let coordinator = coordinator(service.clone(), Arc::new(MemorySpatialStore::new()));

        assert!(!coordinator.begin("s-1", &BTreeMap::new()).await.unwrap());
        assert!(service.requests.lock().unwrap().is_empty());
        assert_eq!(coordinator.tracker().count(), 0);
    }

    #[tokio::test]
    async fn test_begin_without_datasets_drops_old_links() {
        let service = Arc::new(RecordingService::default());
        let store = Arc::new(MemorySpatialStore::new());
        let coordinator = coordinator(service.clone(), store.clone());

        coordinator.begin("s-1", &datasets()).await.unwrap();
        assert!(!coordinator.begin("s-1", &BTreeMap::new()).await.unwrap());

        assert_eq!(service.requests.lock().unwrap().len(), 1);
        assert!(store.sample_datasets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_begin_is_not_tracked() {
        let service = Arc::new(RecordingService {
            reject: true,
            ..Default::default()
        });
        let store = Arc::new(MemorySpatialStore::new());
        let coordinator = coordinator(service, store.clone());

        assert!(coordinator.begin("s-1", &datasets()).await.is_err());
        assert_eq!(coordinator.tracker().count(), 0);
        assert!(store.sample_datasets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_complete_resolves_and_reports_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        let unknown_file = tmp.path().join("unknown.txt");

        let store = Arc::new(MemorySpatialStore::with_annotations(["T cell", "B cell"]));
        let coordinator = coordinator(Arc::new(RecordingService::default()), store.clone())
            .with_unknown_names_file(Some(unknown_file.clone()));
        coordinator.begin("s-1", &datasets()).await.unwrap();

        let callback = ExtractionCallback {
            sample_uuid: "s-1".to_string(),
            cell_type_counts: BTreeMap::from([
                ("T cell".to_string(), 12),
                ("Podocyte?".to_string(), 3),
            ]),
        };
        let report = coordinator.complete(&callback).await.unwrap();

        assert!(report.turnaround.is_some());
        assert_eq!(report.stored, 1);
        assert_eq!(report.unknown, vec!["Podocyte?"]);
        assert_eq!(coordinator.tracker().count(), 0);
        assert_eq!(
            store.cell_type_counts("s-1").await,
            BTreeMap::from([("T cell".to_string(), 12)])
        );
        assert_eq!(
            std::fs::read_to_string(&unknown_file).unwrap(),
            "Podocyte?\n"
        );
    }

    #[tokio::test]
    async fn test_unsolicited_callback_still_stores() {
        let store = Arc::new(MemorySpatialStore::with_annotations(["T cell"]));
        let coordinator = coordinator(Arc::new(RecordingService::default()), store.clone());

        let callback = ExtractionCallback {
            sample_uuid: "s-9".to_string(),
            cell_type_counts: BTreeMap::from([("T cell".to_string(), 4)]),
        };
        let report = coordinator.complete(&callback).await.unwrap();
        assert_eq!(report.turnaround, None);
        assert_eq!(report.stored, 1);
        assert_eq!(store.cell_type_counts("s-9").await["T cell"], 4);
    }
}
