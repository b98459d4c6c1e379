//! Shared harness for the HTTP integration suites.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use bradax_broker::app::AppState;
use bradax_broker::config::{Environment, Settings};
use bradax_broker::http::build_router;
use bradax_broker::provider::{
    ChatMessage, InvocationParams, ProviderAdapter, ProviderError, ProviderReply, TokenUsage,
};

pub const MASTER_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const API_KEY_001: &str = "bradax_proj_real_001_acme_deadbeef_1722500000";
pub const API_KEY_002: &str = "bradax_proj_real_002_acme_cafebabe_1722500000";

/// Deterministic provider used instead of the HTTP adapter.
pub struct MockProvider;

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn invoke(
        &self,
        _model_id: &str,
        _messages: &[ChatMessage],
        _params: &InvocationParams,
    ) -> Result<ProviderReply, ProviderError> {
        Ok(ProviderReply {
            content: "Fernando Henrique Cardoso was the president of Brazil in 2002.".to_string(),
            usage: Some(TokenUsage {
                prompt_tokens: 18,
                completion_tokens: 14,
                total_tokens: 32,
            }),
            raw: json!({"id": "cmpl-mock"}),
        })
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub state: AppState,
    pub router: Router,
}

pub fn settings(dir: &tempfile::TempDir) -> Settings {
    Settings {
        master_secret: MASTER_SECRET.into(),
        provider_api_key: "sk-test".into(),
        provider_base_url: "http://localhost:9".into(),
        environment: Environment::Development,
        jwt_expire_minutes: 15,
        rate_limit_rpm: 1_000,
        rate_limit_rph: 10_000,
        max_concurrent: 64,
        provider_timeout: std::time::Duration::from_secs(5),
        data_dir: dir.path().join("data"),
        interaction_cap: 50,
        trusted_hosts: vec!["localhost".into()],
        bind_addr: "127.0.0.1:0".parse().unwrap(),
    }
}

pub fn seed_data(dir: &tempfile::TempDir) {
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(
        data.join("projects.json"),
        serde_json::to_string_pretty(&json!([
            {
                "project_id": "proj_real_001",
                "name": "Real One",
                "organization": "acme",
                "api_key_hash": "deadbeef",
                "allowed_models": ["gpt-4.1-nano"],
                "status": "active",
                "budget_remaining": 250.0,
                "created_at": Utc::now(),
                "updated_at": Utc::now()
            },
            {
                "project_id": "proj_real_002",
                "name": "Real Two",
                "organization": "acme",
                "api_key_hash": "cafebabe",
                "allowed_models": ["gpt-4.1-nano"],
                "status": "active",
                "budget_remaining": 250.0,
                "created_at": Utc::now(),
                "updated_at": Utc::now()
            }
        ]))
        .unwrap(),
    )
    .unwrap();
    std::fs::write(
        data.join("guardrails.json"),
        serde_json::to_string_pretty(&json!([
            {
                "rule_id": "base_secrets",
                "category": "compliance",
                "severity": "high",
                "action": "sanitize",
                "patterns": {"hex_token": "[0-9a-f]{32}"},
                "keywords": []
            }
        ]))
        .unwrap(),
    )
    .unwrap();
    std::fs::write(
        data.join("llm_models.json"),
        serde_json::to_string_pretty(&json!([
            {
                "model_id": "gpt-4.1-nano",
                "display_name": "GPT-4.1 nano",
                "provider": "openai",
                "input_cost_per_1k": 0.1,
                "output_cost_per_1k": 0.4,
                "max_tokens": 128000
            }
        ]))
        .unwrap(),
    )
    .unwrap();
}

pub fn harness() -> Harness {
    harness_with(|_| {})
}

pub fn harness_with(tweak: impl FnOnce(&mut Settings)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    seed_data(&dir);
    let mut settings = settings(&dir);
    tweak(&mut settings);
    let state = AppState::build_with_provider(settings, Arc::new(MockProvider)).unwrap();
    let router = build_router(state.clone());
    Harness { dir, state, router }
}

/// Attach the headers every well-behaved SDK request carries.
pub fn sdk_request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "localhost")
        .header(header::USER_AGENT, "bradax-sdk/1.4.2")
        .header("x-bradax-client-version", "1.4.2")
        .header("x-bradax-platform", "linux")
        .header("x-bradax-fingerprint", "fp-test")
        .header("x-bradax-session-id", "sess-test")
        .header("x-bradax-telemetry-enabled", "true")
        .header("x-bradax-environment", "test")
        .header("x-bradax-interpreter-version", "3.12.1")
}

/// A bare request with only the host header (no SDK telemetry set).
pub fn bare_request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "localhost")
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response: Response<_> = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

pub async fn issue_token(harness: &Harness, project_id: &str, api_key: &str) -> String {
    let request = bare_request("POST", "/api/v1/auth/token")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"project_id": project_id, "api_key": api_key}).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&harness.router, request).await;
    assert_eq!(status, StatusCode::OK, "token issuance failed: {body}");
    body["access_token"].as_str().unwrap().to_string()
}

pub fn invoke_body(model: &str, prompt: &str) -> Value {
    json!({
        "operation": "chat",
        "model": model,
        "payload": {"messages": [{"role": "user", "content": prompt}]},
        "project_id": "proj_real_001"
    })
}
