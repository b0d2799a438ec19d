use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

/// An extraction that was requested and has not called back yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExtraction {
    pub sample_uuid: String,
    pub requested_at: Instant,
}

/// Registry of in-flight extraction requests, keyed by sample uuid.
///
/// All access goes through one mutex that is never held across an await.
/// Re-registering a sample restarts its clock.
#[derive(Debug, Default)]
pub struct ExtractionTracker {
    pending: Mutex<HashMap<String, Instant>>,
}

impl ExtractionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, sample_uuid: &str) {
        self.lock().insert(sample_uuid.to_string(), Instant::now());
    }

    /// Remove the entry and return when it was requested.
    pub fn resolve(&self, sample_uuid: &str) -> Option<Instant> {
        self.lock().remove(sample_uuid)
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn pending(&self) -> Vec<PendingExtraction> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(uuid, at)| PendingExtraction {
                sample_uuid: uuid.clone(),
                requested_at: *at,
            })
            .collect();
        entries.sort_by(|a, b| a.sample_uuid.cmp(&b.sample_uuid));
        entries
    }

    /// Drop every entry older than `timeout`, logging each as lost.
    pub fn sweep_expired(&self, timeout: Duration) -> Vec<PendingExtraction> {
        let now = Instant::now();
        let mut expired = Vec::new();
        let remaining = {
            let mut pending = self.lock();
            pending.retain(|uuid, requested_at| {
                if now.duration_since(*requested_at) > timeout {
                    expired.push(PendingExtraction {
                        sample_uuid: uuid.clone(),
                        requested_at: *requested_at,
                    });
                    false
                } else {
                    true
                }
            });
            pending.len()
        };

        expired.sort_by(|a, b| a.sample_uuid.cmp(&b.sample_uuid));
        for entry in &expired {
            error!(
                "Extraction for sample {} has not called back within {}s",
                entry.sample_uuid,
                timeout.as_secs()
            );
        }
        info!("Pending extractions: {remaining}");
        expired
    }

    /// Run [`ExtractionTracker::sweep_expired`] every `interval` until
    /// `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        timeout: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep_expired(timeout);
                    }
                }
            }
            info!("Extraction sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

    #[tokio::test(start_paused = true)]
    async fn test_register_and_resolve() {
        let tracker = ExtractionTracker::new();
        tracker.register("s-1");
        tracker.register("s-2");
        assert_eq!(tracker.count(), 2);

        let requested_at = tracker.resolve("s-1");
        assert!(requested_at.is_some());
        assert_eq!(tracker.resolve("s-1"), None);
        assert_eq!(tracker.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let tracker = ExtractionTracker::new();
        tracker.register("old");
        tokio::time::advance(Duration::from_secs(2 * 60 * 60 - 60)).await;
        tracker.register("young");
        tokio::time::advance(Duration::from_secs(120)).await;

        let expired = tracker.sweep_expired(TIMEOUT);
        let uuids: Vec<_> = expired.iter().map(|e| e.sample_uuid.as_str()).collect();
        assert_eq!(uuids, vec!["old"]);
        assert_eq!(tracker.count(), 1);
        assert_eq!(tracker.pending()[0].sample_uuid, "young");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_entry_is_not_swept() {
        let tracker = ExtractionTracker::new();
        tracker.register("s-1");
        tracker.resolve("s-1");
        tokio::time::advance(TIMEOUT + Duration::from_secs(1)).await;
        assert!(tracker.sweep_expired(TIMEOUT).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reregister_restarts_clock() {
        let tracker = ExtractionTracker::new();
        tracker.register("s-1");
        tokio::time::advance(TIMEOUT).await;
        tracker.register("s-1");
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(tracker.sweep_expired(TIMEOUT).is_empty());
        assert_eq!(tracker.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper() {
        let tracker = Arc::new(ExtractionTracker::new());
        tracker.register("s-1");

        let shutdown = CancellationToken::new();
        let handle = tracker.clone().spawn_sweeper(
            Duration::from_secs(300),
            TIMEOUT,
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_secs(7000)).await;
        assert_eq!(tracker.count(), 1);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(tracker.count(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
