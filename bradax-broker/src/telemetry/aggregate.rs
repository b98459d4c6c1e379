//! Per-project aggregation over the main telemetry stream.

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::events::{TelemetryEvent, TelemetryPayload};

/// Usage summary for one project.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectUsage {
    /// Project the summary covers.
    pub project_id: String,
    /// Completed requests, successful or not.
    pub total_requests: u64,
    /// Completions with `success=true`.
    pub successful: u64,
    /// `error` events attributed to the project.
    pub errors: u64,
    /// Errors over completions-plus-errors, 0.0 when idle.
    pub error_rate: f64,
    /// Sum of reported total token counts.
    pub total_tokens: u64,
    /// Sum of reported cost estimates.
    pub total_cost_usd: f64,
    /// Mean completion duration in milliseconds.
    pub mean_duration_ms: f64,
    /// Completions per `model_used` label.
    pub model_mix: FxHashMap<String, u64>,
}

/// Fold the stream into a [`ProjectUsage`] for `project_id`.
#[must_use]
pub fn summarize(events: &[TelemetryEvent], project_id: &str) -> ProjectUsage {
    let mut usage = ProjectUsage {
        project_id: project_id.to_string(),
        ..ProjectUsage::default()
    };
    let mut duration_total: u64 = 0;

    for event in events {
        match &event.payload {
            TelemetryPayload::RequestComplete {
                project_id: pid,
                success,
                model_used,
                duration_ms,
                total_tokens,
                cost_usd,
                ..
            } if pid == project_id => {
                usage.total_requests += 1;
                if *success {
                    usage.successful += 1;
                }
                duration_total += *duration_ms;
                usage.total_tokens += total_tokens.unwrap_or(0);
                usage.total_cost_usd += cost_usd.unwrap_or(0.0);
                *usage.model_mix.entry(model_used.clone()).or_insert(0) += 1;
            }
            TelemetryPayload::Error {
                project_id: Some(pid),
                ..
            } if pid == project_id => {
                usage.errors += 1;
            }
            _ => {}
        }
    }

    if usage.total_requests > 0 {
        usage.mean_duration_ms = duration_total as f64 / usage.total_requests as f64;
    }
    let observed = usage.total_requests + usage.errors;
    if observed > 0 {
        usage.error_rate = usage.errors as f64 / observed as f64;
    }
    usage
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn complete(project: &str, model: &str, success: bool, ms: u64, tokens: u64) -> TelemetryEvent {
        TelemetryEvent::now(TelemetryPayload::RequestComplete {
            request_id: Uuid::new_v4(),
            project_id: project.into(),
            success,
            model_used: model.into(),
            duration_ms: ms,
            prompt_tokens: Some(tokens / 2),
            completion_tokens: Some(tokens / 2),
            total_tokens: Some(tokens),
            cost_usd: Some(0.01),
            guardrails_triggered: false,
        })
    }

    #[test]
    fn summarize_counts_only_the_project() {
        let events = vec![
            complete("a", "m1", true, 100, 50),
            complete("a", "m2", false, 300, 10),
            complete("b", "m1", true, 999, 99),
            TelemetryEvent::now(TelemetryPayload::Error {
                request_id: None,
                project_id: Some("a".into()),
                category: "provider_error".into(),
                code: "provider_timeout".into(),
            }),
        ];
        let usage = summarize(&events, "a");
        assert_eq!(usage.total_requests, 2);
        assert_eq!(usage.successful, 1);
        assert_eq!(usage.errors, 1);
        assert!((usage.mean_duration_ms - 200.0).abs() < f64::EPSILON);
        assert_eq!(usage.total_tokens, 60);
        assert_eq!(usage.model_mix.get("m1"), Some(&1));
        assert!((usage.error_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn idle_project_is_all_zeroes() {
        let usage = summarize(&[], "ghost");
        assert_eq!(usage.total_requests, 0);
        assert!(usage.error_rate.abs() < f64::EPSILON);
    }
}
