//! Long-running mode. One process owns the extraction tracker, so callbacks
//! are matched against the requests it sent and the timeout sweep sees every
//! request. Requests arrive as JSON lines on the input; every outcome is
//! written back as one JSON line.
//!
//! ```text
//! {"type":"reindex","target":{"scope":"organ","code":"LK"}}
//! {"type":"complete_extraction","sample_uuid":"...","cell_type_counts":{"T cell":12}}
//! {"type":"status"}
//! {"type":"shutdown"}
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use spatial_extraction::ExtractionCoordinator;
use spatial_protocol::ExtractionCallback;
use spatial_reindexer::Reconciler;
use spatial_reindexer::ReindexDispatch;
use spatial_reindexer::ReindexMode;
use spatial_reindexer::ReindexStats;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

/// Which samples a reindex covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ReindexTarget {
    /// Samples that changed since they were last indexed
    #[default]
    Changed,
    All,
    Organ {
        code: String,
    },
    Sample {
        uuid: String,
    },
}

impl ReindexTarget {
    pub async fn dispatch(
        &self,
        reconciler: &Reconciler,
    ) -> spatial_reindexer::Result<ReindexDispatch> {
        match self {
            ReindexTarget::Changed => reconciler.reconcile(ReindexMode::Incremental).await,
            ReindexTarget::All => reconciler.reconcile(ReindexMode::Full).await,
            ReindexTarget::Organ { code } => reconciler.reindex_organ(code).await,
            ReindexTarget::Sample { uuid } => reconciler.reindex_sample(uuid).await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServeRequest {
    Reindex {
        #[serde(default)]
        target: ReindexTarget,
    },
    CompleteExtraction(ExtractionCallback),
    Status,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServeEvent {
    ReindexStarted {
        target: ReindexTarget,
        selected: usize,
    },
    ReindexFinished {
        target: ReindexTarget,
        samples_processed: usize,
        samples_failed: usize,
        placements_skipped: usize,
        extractions_requested: usize,
    },
    ExtractionCompleted {
        sample_uuid: String,
        stored: usize,
        unknown: Vec<String>,
        /// Absent when no request for the sample was pending
        turnaround_secs: Option<f64>,
    },
    Status {
        pending_extractions: usize,
    },
    Error {
        message: String,
    },
}

impl ServeEvent {
    fn finished(target: ReindexTarget, stats: ReindexStats) -> Self {
        ServeEvent::ReindexFinished {
            target,
            samples_processed: stats.samples_processed,
            samples_failed: stats.samples_failed,
            placements_skipped: stats.placements_skipped,
            extractions_requested: stats.extractions_requested,
        }
    }
}

type EventSender = mpsc::UnboundedSender<ServeEvent>;

pub struct Server {
    reconciler: Reconciler,
    coordinator: Arc<ExtractionCoordinator>,
    reindex_every: Option<Duration>,
}

impl Server {
    /// `coordinator` must be the one `reconciler` begins extractions with.
    pub fn new(reconciler: Reconciler, coordinator: Arc<ExtractionCoordinator>) -> Self {
        Self {
            reconciler,
            coordinator,
            reindex_every: None,
        }
    }

    /// Also reindex changed samples on a fixed period.
    pub fn with_reindex_every(mut self, every: Option<Duration>) -> Self {
        self.reindex_every = every;
        self
    }

    /// Serve until the input ends, a `shutdown` request arrives or
    /// `shutdown` is cancelled. Reindexes still running at that point are
    /// awaited so their results are written.
    pub async fn run<R, W>(&self, input: R, mut output: W, shutdown: CancellationToken) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut lines = input.lines();
        let mut schedule = self.reindex_every.map(|every| {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        info!("Serving requests");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(event) = events_rx.recv() => write_event(&mut output, &event).await?,
                _ = next_tick(&mut schedule) => {
                    self.reindex(ReindexTarget::Changed, &events_tx).await;
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ServeRequest>(line) {
                        Ok(ServeRequest::Shutdown) => break,
                        Ok(request) => self.handle(request, &events_tx).await,
                        Err(err) => send(
                            &events_tx,
                            ServeEvent::Error {
                                message: format!("Invalid request: {err}"),
                            },
                        ),
                    }
                }
            }
        }

        drop(events_tx);
        while let Some(event) = events_rx.recv().await {
            write_event(&mut output, &event).await?;
        }
        info!(
            "Stopped serving with {} extractions pending",
            self.coordinator.tracker().count()
        );
        Ok(())
    }

    async fn handle(&self, request: ServeRequest, events: &EventSender) {
        match request {
            ServeRequest::Reindex { target } => self.reindex(target, events).await,
            ServeRequest::CompleteExtraction(callback) => {
                let event = match self.coordinator.complete(&callback).await {
                    Ok(report) => ServeEvent::ExtractionCompleted {
                        sample_uuid: callback.sample_uuid,
                        stored: report.stored,
                        unknown: report.unknown,
                        turnaround_secs: report.turnaround.map(|d| d.as_secs_f64()),
                    },
                    Err(err) => ServeEvent::Error {
                        message: format!(
                            "Extraction callback for sample {} failed: {err}",
                            callback.sample_uuid
                        ),
                    },
                };
                send(events, event);
            }
            ServeRequest::Status => send(
                events,
                ServeEvent::Status {
                    pending_extractions: self.coordinator.tracker().count(),
                },
            ),
            // Ends the read loop in `run`.
            ServeRequest::Shutdown => {}
        }
    }

    /// Select samples now, report their processing once it is done.
    async fn reindex(&self, target: ReindexTarget, events: &EventSender) {
        let dispatch = match target.dispatch(&self.reconciler).await {
            Ok(dispatch) => dispatch,
            Err(err) => {
                send(
                    events,
                    ServeEvent::Error {
                        message: format!("Reindex failed: {err}"),
                    },
                );
                return;
            }
        };
        send(
            events,
            ServeEvent::ReindexStarted {
                target: target.clone(),
                selected: dispatch.selected,
            },
        );

        let events = events.clone();
        tokio::spawn(async move {
            let event = match dispatch.wait().await {
                Ok(stats) => ServeEvent::finished(target, stats),
                Err(err) => ServeEvent::Error {
                    message: format!("Reindex failed: {err}"),
                },
            };
            send(&events, event);
        });
    }
}

fn send(events: &EventSender, event: ServeEvent) {
    if events.send(event).is_err() {
        warn!("Dropping serve event, output is closed");
    }
}

async fn next_tick(schedule: &mut Option<Interval>) {
    match schedule {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn write_event<W: AsyncWrite + Unpin>(output: &mut W, event: &ServeEvent) -> Result<()> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    output.write_all(line.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[test]
    fn requests_parse_from_json_lines() {
        let request: ServeRequest =
            serde_json::from_str(r#"{"type":"reindex","target":{"scope":"organ","code":"LK"}}"#)
                .unwrap();
        assert_eq!(
            request,
            ServeRequest::Reindex {
                target: ReindexTarget::Organ {
                    code: "LK".to_string()
                }
            }
        );

        let request: ServeRequest = serde_json::from_str(r#"{"type":"reindex"}"#).unwrap();
        assert_eq!(
            request,
            ServeRequest::Reindex {
                target: ReindexTarget::Changed
            }
        );

        let request: ServeRequest = serde_json::from_str(
            r#"{"type":"complete_extraction","sample_uuid":"s-1","cell_type_counts":{"T cell":3}}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            ServeRequest::CompleteExtraction(ExtractionCallback {
                sample_uuid: "s-1".to_string(),
                cell_type_counts: BTreeMap::from([("T cell".to_string(), 3)]),
            })
        );

        assert!(serde_json::from_str::<ServeRequest>(r#"{"type":"reboot"}"#).is_err());
    }

    #[test]
    fn events_are_tagged() {
        let event = ServeEvent::Status {
            pending_extractions: 2,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"event": "status", "pending_extractions": 2})
        );
    }
}
