//! Status and health check handlers
//!
//! - `/health` - liveness; 200 whenever the process answers
//! - `/ready` - readiness; 503 if the fulfillment store cannot be read
//! - `/status` - version, uptime, request latency, payment flow counters
//! - `/metrics` - Prometheus text exposition
//!
//! # Architecture
//!
//! ```text
//! HTTP Request ──> track_requests ──> handler ──> response
//!                        │
//!                        ▼
//!             ServiceStats (LatencyHistogram + counters)
//!             global Metrics (per-route breakdown)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::handlers::AppState;
use crate::metrics::global_metrics;

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

/// Session id looked up to check the fulfillment store
const READINESS_CHECK_ID: &str = "readiness_check";

// ============================================================================
// Response Types
// ============================================================================

/// Health and readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy", "ready" or "unavailable"
    pub status: String,
}

impl HealthResponse {
    fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

/// Detailed server status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Server version (from Cargo.toml)
    pub version: String,

    /// Server name
    pub name: String,

    /// Server uptime in seconds
    pub uptime_seconds: u64,

    /// Request latency statistics
    pub latency: LatencyMetrics,

    /// Requests that ended in a 5xx
    pub errors: u64,

    /// Payment flow counters
    pub payments: PaymentCounters,

    /// Always "running" if responding
    pub status: String,

    /// RFC 3339 timestamp of when status was generated
    pub timestamp: String,
}

/// Payment flow counters since process start
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentCounters {
    /// Checkout sessions created
    pub checkout_sessions: u64,
    /// Verified webhook deliveries
    pub webhook_events: u64,
    /// Rejected webhook deliveries
    pub webhook_rejected: u64,
    /// Verified webhook events that could not be applied
    pub webhook_unusable: u64,
    /// Fulfillments confirmed
    pub confirmations: u64,
    /// Documents released
    pub releases: u64,
    /// Finalize calls routed to cancellation
    pub cancellations: u64,
}

impl PaymentCounters {
    fn snapshot() -> Self {
        let m = global_metrics();
        Self {
            checkout_sessions: m.checkout_sessions_total.load(Ordering::Relaxed),
            webhook_events: m.webhook_events_total.load(Ordering::Relaxed),
            webhook_rejected: m.webhook_rejected_total.load(Ordering::Relaxed),
            webhook_unusable: m.webhook_unusable_total.load(Ordering::Relaxed),
            confirmations: m.confirmations_total.load(Ordering::Relaxed),
            releases: m.releases_total.load(Ordering::Relaxed),
            cancellations: m.cancellations_total.load(Ordering::Relaxed),
        }
    }
}

/// Request latency percentile metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// 50th percentile (median) latency in milliseconds
    pub p50_ms: f64,

    /// 95th percentile latency in milliseconds
    pub p95_ms: f64,

    /// 99th percentile latency in milliseconds
    pub p99_ms: f64,

    /// Total number of requests recorded
    pub total_requests: u64,

    /// Mean latency in milliseconds
    pub mean_ms: f64,

    /// Maximum latency recorded in milliseconds
    pub max_ms: f64,
}

// ============================================================================
// Latency Histogram
// ============================================================================

/// Thread-safe latency histogram
///
/// Tracks 1us to 60s with 3 significant figures. If the histogram cannot be
/// allocated, recording is a no-op and all percentiles read as zero.
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: Option<RwLock<Histogram<u64>>>,
}

impl LatencyHistogram {
    /// Create a new latency histogram
    pub fn new() -> Self {
        let inner = match Histogram::new_with_bounds(1, 60_000_000, 3) {
            Ok(h) => Some(RwLock::new(h)),
            Err(err) => {
                warn!(error = %err, "Latency histogram disabled");
                None
            }
        };
        Self { inner }
    }

    /// Record a latency duration; values outside the bounds are ignored
    pub fn record(&self, duration: Duration) {
        if let Some(inner) = &self.inner {
            let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
            let _ = inner.write().record(micros.max(1));
        }
    }

    /// Number of recorded values
    pub fn count(&self) -> u64 {
        self.inner.as_ref().map_or(0, |h| h.read().len())
    }

    /// Snapshot with all values converted to milliseconds
    pub fn metrics(&self) -> LatencyMetrics {
        let Some(inner) = &self.inner else {
            return LatencyMetrics::default();
        };
        let hist = inner.read();
        if hist.is_empty() {
            return LatencyMetrics::default();
        }
        LatencyMetrics {
            p50_ms: hist.value_at_percentile(50.0) as f64 / 1000.0,
            p95_ms: hist.value_at_percentile(95.0) as f64 / 1000.0,
            p99_ms: hist.value_at_percentile(99.0) as f64 / 1000.0,
            total_requests: hist.len(),
            mean_ms: hist.mean() / 1000.0,
            max_ms: hist.max() as f64 / 1000.0,
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Service Stats
// ============================================================================

/// Per-instance request statistics
#[derive(Debug)]
pub struct ServiceStats {
    start_time: Instant,
    latency: LatencyHistogram,
    error_count: AtomicU64,
}

impl ServiceStats {
    /// Start counting from now
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            latency: LatencyHistogram::new(),
            error_count: AtomicU64::new(0),
        }
    }

    /// Server uptime in seconds
    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record one served request
    pub fn record_request(&self, status: StatusCode, duration: Duration) {
        self.latency.record(duration);
        if status.is_server_error() {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Latency snapshot
    #[inline]
    pub fn latency_metrics(&self) -> LatencyMetrics {
        self.latency.metrics()
    }

    /// Requests recorded so far
    #[inline]
    pub fn total_requests(&self) -> u64 {
        self.latency.count()
    }

    /// Requests that ended in a 5xx
    #[inline]
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware recording latency and per-route counts for every request
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed();

    state.stats.record_request(response.status(), elapsed);
    global_metrics().record_request(&path, response.status().as_u16(), elapsed);
    response
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// `GET /health`
#[instrument(skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    debug!("Health check requested");
    (StatusCode::OK, Json(HealthResponse::with_status("healthy")))
}

/// `GET /ready`
///
/// Ready when the fulfillment store answers a lookup.
#[instrument(skip_all)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.coordinator.store().get(READINESS_CHECK_ID).await {
        Ok(_) => (StatusCode::OK, Json(HealthResponse::with_status("ready"))),
        Err(err) => {
            warn!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::with_status("unavailable")),
            )
        }
    }
}

/// `GET /status`
#[instrument(skip_all)]
pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Status check requested");

    let response = StatusResponse {
        version: SERVER_VERSION.to_string(),
        name: SERVER_NAME.to_string(),
        uptime_seconds: state.stats.uptime_seconds(),
        latency: state.stats.latency_metrics(),
        errors: state.stats.error_count(),
        payments: PaymentCounters::snapshot(),
        status: "running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

/// `GET /metrics`
#[instrument(skip_all)]
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        global_metrics().to_prometheus_format(),
    )
}
