//! Per-client-IP rate limiting.
//!
//! Sliding-window counters for requests-per-minute and requests-per-hour,
//! plus a process-wide concurrent in-flight cap. Over-limit requests get a
//! 429 with standard rate-limit headers before any handler code runs.
//! Idle per-IP entries are evicted opportunistically.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rustc_hash::FxHashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::app::AppState;
use crate::error::BrokerError;
use crate::telemetry::{TelemetryEvent, TelemetryPayload};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3_600);
/// Entries idle longer than this are evicted.
const IDLE_EVICTION: Duration = Duration::from_secs(2 * 3_600);
/// Map size that triggers an eviction sweep.
const EVICTION_SCAN_THRESHOLD: usize = 1_024;

// ── RateLimiter ────────────────────────────────────────────────────────

struct IpEntry {
    minute_hits: VecDeque<Instant>,
    hour_hits: VecDeque<Instant>,
    last_seen: Instant,
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy)]
pub struct RateDenied {
    /// Seconds until the limiting window has room again.
    pub retry_after: u64,
    /// The bound that was hit.
    pub limit: u64,
}

/// Sliding-window counters plus the in-flight cap.
pub struct RateLimiter {
    rpm: u32,
    rph: u32,
    per_ip: Mutex<FxHashMap<IpAddr, IpEntry>>,
    inflight: Arc<Semaphore>,
}

impl RateLimiter {
    /// Build a limiter with the configured bounds.
    #[must_use]
    pub fn new(rpm: u32, rph: u32, max_concurrent: usize) -> Self {
        Self {
            rpm,
            rph,
            per_ip: Mutex::new(FxHashMap::default()),
            inflight: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Admit one request for `ip`, returning the in-flight permit that must
    /// be held until the response is written.
    ///
    /// # Errors
    ///
    /// Returns [`RateDenied`] when a window or the concurrency cap is full.
    pub fn try_admit(&self, ip: IpAddr) -> Result<OwnedSemaphorePermit, RateDenied> {
        let now = Instant::now();
        {
            let mut map = self
                .per_ip
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if map.len() >= EVICTION_SCAN_THRESHOLD {
                map.retain(|_, entry| now.duration_since(entry.last_seen) < IDLE_EVICTION);
            }
            let entry = map.entry(ip).or_insert_with(|| IpEntry {
                minute_hits: VecDeque::new(),
                hour_hits: VecDeque::new(),
                last_seen: now,
            });
            entry.last_seen = now;

            prune(&mut entry.minute_hits, now, MINUTE);
            prune(&mut entry.hour_hits, now, HOUR);

            if entry.minute_hits.len() >= self.rpm as usize {
                let retry = window_reset(&entry.minute_hits, now, MINUTE);
                return Err(RateDenied {
                    retry_after: retry,
                    limit: u64::from(self.rpm),
                });
            }
            if entry.hour_hits.len() >= self.rph as usize {
                let retry = window_reset(&entry.hour_hits, now, HOUR);
                return Err(RateDenied {
                    retry_after: retry,
                    limit: u64::from(self.rph),
                });
            }
            entry.minute_hits.push_back(now);
            entry.hour_hits.push_back(now);
        }

        self.inflight
            .clone()
            .try_acquire_owned()
            .map_err(|_: TryAcquireError| RateDenied {
                retry_after: 1,
                limit: self.inflight.available_permits() as u64,
            })
    }
}

fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = hits.front() {
        if now.duration_since(*front) >= window {
            hits.pop_front();
        } else {
            break;
        }
    }
}

fn window_reset(hits: &VecDeque<Instant>, now: Instant, window: Duration) -> u64 {
    hits.front()
        .map(|oldest| window.saturating_sub(now.duration_since(*oldest)).as_secs() + 1)
        .unwrap_or(1)
}

// ── Middleware ─────────────────────────────────────────────────────────

pub async fn limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let ip = client_ip(&req);
    match state.limiter.try_admit(ip) {
        Ok(permit) => {
            let response = next.run(req).await;
            drop(permit);
            response
        }
        Err(denied) => {
            tracing::warn!(%ip, retry_after = denied.retry_after, "rate limit exceeded");
            if let Err(error) = state
                .telemetry
                .record_event(TelemetryEvent::now(TelemetryPayload::Error {
                    request_id: None,
                    project_id: None,
                    category: "rate_limited".into(),
                    code: "rate_limited".into(),
                }))
                .await
            {
                tracing::error!(%error, "failed to append rate-limit event");
            }

            let mut response = BrokerError::RateLimited {
                retry_after: denied.retry_after,
            }
            .into_response();
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&denied.limit.to_string()) {
                headers.insert("x-ratelimit-limit", value);
            }
            headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
            if let Ok(value) = HeaderValue::from_str(&denied.retry_after.to_string()) {
                headers.insert("x-ratelimit-reset", value);
            }
            response
        }
    }
}

/// Client address: first `X-Forwarded-For` hop, else the socket peer.
fn client_ip(req: &Request) -> IpAddr {
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

// ── Tests ──────────────────────────────────────────────────────────────
