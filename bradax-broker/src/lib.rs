//! ```text
//! SDK client ──► Middleware Chain ──► Route Handlers ──► Orchestrator
//!                 │ trusted host            │                │
//!                 │ cors (dev only)         ├─► AuthService  ├─► policy check
//!                 │ security headers        │                ├─► guard-in  ──► bx-warden
//!                 │ rate limiter            │                ├─► ProviderAdapter
//!                 │ request logger          │                ├─► guard-out ──► bx-warden
//!                 │ telemetry validation    │                └─► completion
//!                 │                         │
//!                 └────────► TelemetryWriter ◄────────────────┘
//!                            telemetry.json │ guardrail_events.json
//!                            interactions.json │ raw/responses/<id>.json
//! ```
//!
//! # bradax-broker
//!
//! **Governance gateway mediating all in-house LLM traffic.**
//!
//! Every model invocation traverses the broker, which enforces per-project
//! authentication (HMAC-derived token secrets), deterministic content
//! guardrails on both the prompt and the response, model allow-lists,
//! per-IP rate limits, and an append-only audit trail across three
//! segregated streams.
//!
//! Business failures are *fail-soft*: policy blocks, guardrail blocks, and
//! upstream provider errors all answer HTTP 200 with `success=false` and a
//! stable `reason_code`, so clients do not hammer retries on policy
//! decisions. Credential and shape problems keep their native 4xx status,
//! and unhandled failures surface as 5xx.
//!
//! ## Module Guide
//!
//! - [`config`] - environment-assembled settings, fail-fast validation
//! - [`error`] - the uniform error taxonomy and response envelopes
//! - [`auth`] - token issuance/verification and the derived-secret scheme
//! - [`stores`] - JSON-backed project and model stores with atomic replace
//! - [`guardrails`] - warden engine composition plus audit emission
//! - [`provider`] - the provider adapter contract and HTTP implementation
//! - [`orchestrator`] - the per-request pipeline and fail-soft envelopes
//! - [`telemetry`] - the three append-only streams and aggregation
//! - [`http`] - routes and the ingress middleware chain
//! - [`app`] - state assembly and startup wiring

pub mod app;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod guardrails;
pub mod http;
pub mod orchestrator;
pub mod provider;
pub mod stores;
pub mod telemetry;
