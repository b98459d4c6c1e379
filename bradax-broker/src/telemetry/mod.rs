//! Append-only telemetry persistence.
//!
//! Three segregated streams — main telemetry, guardrail events, interaction
//! stages — plus the raw-response store. Each stream is a single JSON array
//! regrown on every write through the atomic temp-file + fsync + rename
//! path, so an append is durable before the call returns and a reader never
//! observes a torn file. One `tokio::sync::Mutex` per stream serializes
//! appends; callers on distinct streams never block each other.
//!
//! The interaction stream is bounded: after an append, entries beyond the
//! configured cap are trimmed oldest-first in one compaction pass.

pub mod aggregate;
pub mod events;

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::stores::StoreError;
use crate::stores::fsio;

pub use aggregate::ProjectUsage;
pub use events::{
    AuthOutcome, GuardrailEvent, InteractionStage, StageKind, TelemetryEvent, TelemetryPayload,
    ViolationDetails,
};

/// File names under the data directory.
const MAIN_FILE: &str = "telemetry.json";
const GUARDRAIL_FILE: &str = "guardrail_events.json";
const INTERACTION_FILE: &str = "interactions.json";
const RAW_DIR: &str = "raw/responses";

/// Failures raised by the writer.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Underlying file store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An event failed to serialize.
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only writer over the three streams and the raw-response store.
pub struct TelemetryWriter {
    main_path: PathBuf,
    guard_path: PathBuf,
    interaction_path: PathBuf,
    raw_dir: PathBuf,
    main_lock: Mutex<()>,
    guard_lock: Mutex<()>,
    interaction_lock: Mutex<()>,
    interaction_cap: usize,
}

impl TelemetryWriter {
    /// Open the writer rooted at `data_dir`, creating the layout as needed.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when the directory layout or stream files
    /// cannot be created.
    pub fn open(data_dir: impl AsRef<Path>, interaction_cap: usize) -> Result<Self, TelemetryError> {
        let data_dir = data_dir.as_ref();
        let writer = Self {
            main_path: data_dir.join(MAIN_FILE),
            guard_path: data_dir.join(GUARDRAIL_FILE),
            interaction_path: data_dir.join(INTERACTION_FILE),
            raw_dir: data_dir.join(RAW_DIR),
            main_lock: Mutex::new(()),
            guard_lock: Mutex::new(()),
            interaction_lock: Mutex::new(()),
            interaction_cap,
        };
        writer.ensure_layout()?;
        Ok(writer)
    }

    /// Re-create any stream file an external rotation moved away.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when the layout cannot be re-created.
    pub fn reload(&self) -> Result<(), TelemetryError> {
        self.ensure_layout()
    }

    fn ensure_layout(&self) -> Result<(), TelemetryError> {
        std::fs::create_dir_all(&self.raw_dir).map_err(|source| StoreError::Io {
            path: self.raw_dir.clone(),
            source,
        })?;
        for path in [&self.main_path, &self.guard_path, &self.interaction_path] {
            if !path.exists() {
                fsio::write_json_atomic(path, &Vec::<Value>::new())?;
            }
        }
        Ok(())
    }

    /// Append to the main stream; durable before returning.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when the append fails; the stream is left
    /// unchanged in that case.
    pub async fn record_event(&self, event: TelemetryEvent) -> Result<(), TelemetryError> {
        let _guard = self.main_lock.lock().await;
        append(&self.main_path, &event)
    }

    /// Append to the guardrail stream.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when the append fails.
    pub async fn record_guardrail(&self, event: GuardrailEvent) -> Result<(), TelemetryError> {
        let _guard = self.guard_lock.lock().await;
        append(&self.guard_path, &event)
    }

    /// Append to the bounded interaction stream, trimming oldest entries
    /// beyond the cap in the same write.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when the append fails.
    pub async fn record_interaction(&self, stage: InteractionStage) -> Result<(), TelemetryError> {
        let _guard = self.interaction_lock.lock().await;
        let mut entries: Vec<Value> = read_stream(&self.interaction_path);
        entries.push(serde_json::to_value(&stage)?);
        if entries.len() > self.interaction_cap {
            let excess = entries.len() - self.interaction_cap;
            entries.drain(..excess);
        }
        fsio::write_json_atomic(&self.interaction_path, &entries)?;
        Ok(())
    }

    /// Persist a raw provider capture for an error or blocked outcome.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when the write fails.
    pub async fn store_raw_response(
        &self,
        request_id: Uuid,
        raw: &Value,
    ) -> Result<(), TelemetryError> {
        let path = self.raw_dir.join(format!("{request_id}.json"));
        fsio::write_json_atomic(&path, raw)?;
        Ok(())
    }

    /// Scan the main stream and summarize usage for one project.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when the stream cannot be read.
    pub async fn aggregate(&self, project_id: &str) -> Result<ProjectUsage, TelemetryError> {
        Ok(aggregate::summarize(
            &self.read_main().await,
            project_id,
        ))
    }

    /// Current contents of the main stream. Entries that fail to parse are
    /// skipped with a warning rather than poisoning the scan.
    pub async fn read_main(&self) -> Vec<TelemetryEvent> {
        let _guard = self.main_lock.lock().await;
        parse_entries(&self.main_path)
    }

    /// Current contents of the guardrail stream.
    pub async fn read_guardrails(&self) -> Vec<GuardrailEvent> {
        let _guard = self.guard_lock.lock().await;
        parse_entries(&self.guard_path)
    }

    /// Current contents of the interaction stream.
    pub async fn read_interactions(&self) -> Vec<InteractionStage> {
        let _guard = self.interaction_lock.lock().await;
        parse_entries(&self.interaction_path)
    }
}

fn append<T: Serialize>(path: &Path, item: &T) -> Result<(), TelemetryError> {
    let mut entries: Vec<Value> = read_stream(path);
    entries.push(serde_json::to_value(item)?);
    fsio::write_json_atomic(path, &entries)?;
    Ok(())
}

/// Read a stream file; a missing or torn file reads as empty rather than
/// wedging the pipeline.
fn read_stream(path: &Path) -> Vec<Value> {
    match fsio::read_json::<Vec<Value>>(path) {
        Ok(entries) => entries,
        Err(error) => {
            if path.exists() {
                tracing::warn!(path = %path.display(), %error, "stream unreadable, treating as empty");
            }
            Vec::new()
        }
    }
}

fn parse_entries<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    read_stream(path)
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "skipping malformed stream entry");
                None
            }
        })
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use events::{StageKind, TelemetryPayload};

    fn writer(cap: usize) -> (tempfile::TempDir, TelemetryWriter) {
        let dir = tempfile::tempdir().unwrap();
        let writer = TelemetryWriter::open(dir.path(), cap).unwrap();
        (dir, writer)
    }

    fn start_event(project: &str) -> TelemetryEvent {
        TelemetryEvent::now(TelemetryPayload::RequestStart {
            request_id: Uuid::new_v4(),
            project_id: project.into(),
            model_id: "m".into(),
            payload_hash: "00".into(),
        })
    }

    #[tokio::test]
    async fn append_is_visible_to_subsequent_reads() {
        let (_dir, writer) = writer(100);
        let event = start_event("proj");
        writer.record_event(event.clone()).await.unwrap();
        let events = writer.read_main().await;
        assert_eq!(events, vec![event]);
    }

    #[tokio::test]
    async fn interaction_stream_settles_at_cap_after_burst() {
        let (_dir, writer) = writer(5);
        for i in 0..12 {
            writer
                .record_interaction(InteractionStage::now(
                    Uuid::new_v4(),
                    StageKind::Auth,
                    format!("step {i}"),
                    "ok",
                    None,
                ))
                .await
                .unwrap();
        }
        let entries = writer.read_interactions().await;
        assert_eq!(entries.len(), 5);
        // The oldest entries were trimmed, the newest kept.
        assert_eq!(entries.last().unwrap().summary, "step 11");
        assert_eq!(entries.first().unwrap().summary, "step 7");
    }

    #[tokio::test]
    async fn raw_response_stored_per_request() {
        let (dir, writer) = writer(10);
        let id = Uuid::new_v4();
        writer
            .store_raw_response(id, &serde_json::json!({"error": "boom"}))
            .await
            .unwrap();
        let path = dir.path().join("raw/responses").join(format!("{id}.json"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn reload_recreates_rotated_stream() {
        let (dir, writer) = writer(10);
        let main = dir.path().join("telemetry.json");
        std::fs::remove_file(&main).unwrap();
        writer.reload().unwrap();
        assert!(main.exists());
        assert!(writer.read_main().await.is_empty());
    }

    #[tokio::test]
    async fn aggregate_scans_main_stream() {
        let (_dir, writer) = writer(10);
        writer.record_event(start_event("proj")).await.unwrap();
        writer
            .record_event(TelemetryEvent::now(TelemetryPayload::RequestComplete {
                request_id: Uuid::new_v4(),
                project_id: "proj".into(),
                success: true,
                model_used: "m".into(),
                duration_ms: 10,
                prompt_tokens: None,
                completion_tokens: None,
                total_tokens: Some(7),
                cost_usd: None,
                guardrails_triggered: false,
            }))
            .await
            .unwrap();
        let usage = writer.aggregate("proj").await.unwrap();
        assert_eq!(usage.total_requests, 1);
        assert_eq!(usage.total_tokens, 7);
    }
}
