//! The ingress middleware chain.
//!
//! Fixed order, applied to every request: trusted-host filter, CORS
//! (non-production only), security headers, per-IP rate limiting, request
//! logging, and — on protected routes — telemetry-header validation. Each
//! middleware fails closed: a rejection short-circuits everything below it.

pub mod rate_limit;
pub mod request_log;
pub mod security_headers;
pub mod telemetry_guard;
pub mod trusted_host;

pub use rate_limit::RateLimiter;
pub use request_log::{ProjectLabel, RequestId};
