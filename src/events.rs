//! Event Log (§4.7 "Events emitted", §6 "Event sink", §13 in the component
//! table). Lifecycle events are broadcast through a publish-only, non-
//! blocking `EventSink` trait and mirrored into an append-only `LOG.md`
//! narrative so a run can be reconstructed without parsing the JSON state
//! (§6 "Persisted state layout").

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// One lifecycle event (§4.7). Carries just enough context for a
/// subscriber to narrate or dispatch a notification without re-querying
/// the full `PipelineState`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    PipelineStarted { run_id: Uuid, pipeline: String },
    StageStarted { run_id: Uuid, stage: String },
    StageCompleted { run_id: Uuid, stage: String, status: String },
    StageFailed { run_id: Uuid, stage: String, message: String },
    /// A stage ran despite a failed dependency under `onFail: warn` (§7
    /// "`warn` is equivalent to `continue` plus an event").
    StageWarning { run_id: Uuid, stage: String, message: String },
    PipelineCompleted { run_id: Uuid, status: String },
    PipelineFailed { run_id: Uuid, status: String },
    PrCreated { run_id: Uuid, url: String },
    PipelineAborted { run_id: Uuid },
}

impl Event {
    /// A one-line human rendering, used by [`EventLog`] and the tracing sink.
    pub fn narrate(&self) -> String {
        match self {
            Event::PipelineStarted { pipeline, .. } => format!("pipeline `{pipeline}` started"),
            Event::StageStarted { stage, .. } => format!("stage `{stage}` started"),
            Event::StageCompleted { stage, status, .. } => {
                format!("stage `{stage}` completed ({status})")
            }
            Event::StageFailed { stage, message, .. } => {
                format!("stage `{stage}` failed: {message}")
            }
            Event::StageWarning { stage, message, .. } => {
                format!("stage `{stage}` warning: {message}")
            }
            Event::PipelineCompleted { status, .. } => format!("pipeline finished: {status}"),
            Event::PipelineFailed { status, .. } => format!("pipeline finished: {status}"),
            Event::PrCreated { url, .. } => format!("pull request opened: {url}"),
            Event::PipelineAborted { .. } => "pipeline aborted".to_string(),
        }
    }
}

/// Publish-only, non-blocking event broadcast (§6, §9 "replaced with the
/// `EventSink` publish-only trait rather than a callback registry").
/// Emission is synchronous with respect to the Runner; a slow subscriber is
/// responsible for its own buffering, not the Runner's.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: Event);
}

/// In-memory sink for tests and for subscribers that poll rather than push.
#[derive(Default)]
pub struct BufferingEventSink {
    events: Mutex<Vec<Event>>,
}

impl BufferingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for BufferingEventSink {
    async fn publish(&self, event: Event) {
        self.events.lock().await.push(event);
    }
}

/// Logs every event at `info` level via `tracing`, for binaries that just
/// want the engine's events to show up alongside its other log output.
#[derive(Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, event: Event) {
        tracing::info!(event = %event.narrate());
    }
}

/// Fans a single publish out to multiple sinks, so the Runner can always
/// hold one `Arc<dyn EventSink>` while still feeding both the narrative
/// log and whatever subscriber the caller configured.
pub struct FanOutEventSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl FanOutEventSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl EventSink for FanOutEventSink {
    async fn publish(&self, event: Event) {
        for sink in &self.sinks {
            sink.publish(event.clone()).await;
        }
    }
}

/// Append-only narrative log at `<repo>/.agent-pipeline/runs/<runId>/LOG.md`
/// (§6). One markdown bullet per event, timestamped.
pub struct EventLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(repo_root: &Path, run_id: Uuid) -> Self {
        let path = repo_root
            .join(".agent-pipeline")
            .join("runs")
            .join(run_id.to_string())
            .join("LOG.md");
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub async fn append(&self, event: &Event) -> Result<(), std::io::Error> {
        self.append_line(Utc::now(), &event.narrate()).await
    }

    async fn append_line(&self, at: DateTime<Utc>, line: &str) -> Result<(), std::io::Error> {
        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("- {} — {line}\n", at.to_rfc3339()).as_bytes())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event::StageCompleted {
            run_id: Uuid::now_v7(),
            stage: "plan".to_string(),
            status: "success".to_string(),
        }
    }

    #[tokio::test]
    async fn buffering_sink_records_events_in_order() {
        let sink = BufferingEventSink::new();
        sink.publish(sample_event()).await;
        sink.publish(Event::PipelineAborted {
            run_id: Uuid::now_v7(),
        })
        .await;
        let events = sink.events().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::StageCompleted { .. }));
        assert!(matches!(events[1], Event::PipelineAborted { .. }));
    }

    #[tokio::test]
    async fn fan_out_sink_feeds_every_child() {
        let a = std::sync::Arc::new(BufferingEventSink::new());
        let b = std::sync::Arc::new(BufferingEventSink::new());
        let fan_out = FanOutEventSink::new(vec![a.clone(), b.clone()]);
        fan_out.publish(sample_event()).await;
        assert_eq!(a.events().await.len(), 1);
        assert_eq!(b.events().await.len(), 1);
    }

    #[tokio::test]
    async fn event_log_appends_a_narrated_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = Uuid::now_v7();
        let log = EventLog::new(dir.path(), run_id);
        log.append(&sample_event()).await.unwrap();
        log.append(&Event::PipelineAborted { run_id }).await.unwrap();

        let path = dir
            .path()
            .join(".agent-pipeline")
            .join("runs")
            .join(run_id.to_string())
            .join("LOG.md");
        let content = tokio::fs::read_to_string(path).await.unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("stage `plan` completed (success)"));
        assert!(content.contains("pipeline aborted"));
    }
}
