//! Per-request ephemeral state.
//!
//! A [`RequestContext`] is owned by the handling task for the lifetime of one
//! invocation and dropped when the response is written. It carries the
//! correlation id, the inbound payload fingerprint, both clocks (wall for
//! telemetry timestamps, monotonic for durations), and the telemetry headers
//! the SDK attached.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Telemetry headers every protected request must carry.
///
/// Parsed by the telemetry-validation middleware and stashed as a request
/// extension; handlers and the orchestrator read it, never the raw headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryHeaders {
    /// SDK release, e.g. `1.4.2`.
    pub client_version: String,
    /// Client OS/platform label.
    pub platform: String,
    /// Stable per-process fingerprint.
    pub fingerprint: String,
    /// SDK session id.
    pub session_id: String,
    /// Caller-declared environment label.
    pub environment: String,
    /// Client interpreter/runtime version.
    pub interpreter_version: String,
}

/// Per-request record, exclusive to the handling task.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id across all three telemetry streams.
    pub request_id: Uuid,
    /// Project the verified principal belongs to.
    pub project_id: String,
    /// Model requested by the caller.
    pub model_id: String,
    /// SHA-256 hex fingerprint of the inbound payload.
    pub payload_hash: String,
    /// Wall-clock ingress timestamp, recorded in telemetry.
    pub received_at: DateTime<Utc>,
    /// Monotonic ingress instant, used for durations.
    pub started: Instant,
    /// Headers attached by the SDK.
    pub telemetry: TelemetryHeaders,
}

impl RequestContext {
    /// Build a context at ingress time.
    #[must_use]
    pub fn new(
        request_id: Uuid,
        project_id: impl Into<String>,
        model_id: impl Into<String>,
        payload: &serde_json::Value,
        telemetry: TelemetryHeaders,
    ) -> Self {
        Self {
            request_id,
            project_id: project_id.into(),
            model_id: model_id.into(),
            payload_hash: sha256_hex(payload.to_string().as_bytes()),
            received_at: Utc::now(),
            started: Instant::now(),
            telemetry,
        }
    }

    /// Milliseconds elapsed since ingress, monotonic.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// SHA-256 fingerprint as lowercase hex.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> TelemetryHeaders {
        TelemetryHeaders {
            client_version: "1.0.0".into(),
            platform: "linux".into(),
            fingerprint: "fp".into(),
            session_id: "sess".into(),
            environment: "test".into(),
            interpreter_version: "3.12".into(),
        }
    }

    #[test]
    fn payload_hash_is_stable() {
        let payload = serde_json::json!({"prompt": "hi"});
        let a = RequestContext::new(Uuid::new_v4(), "p", "m", &payload, headers());
        let b = RequestContext::new(Uuid::new_v4(), "p", "m", &payload, headers());
        assert_eq!(a.payload_hash, b.payload_hash);
        assert_eq!(a.payload_hash.len(), 64);
    }

    #[test]
    fn sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
