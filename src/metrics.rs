//! Payment flow metrics
//!
//! Process-wide counters for the checkout, webhook and release paths, plus a
//! bounded sample of request durations. Exported in Prometheus text format on
//! `GET /metrics`.
//!
//! ```rust,no_run
//! use docgate::metrics::global_metrics;
//! use std::time::Duration;
//!
//! global_metrics().record_request("/finalize", 303, Duration::from_millis(40));
//! let output = global_metrics().to_prometheus_format();
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::Duration;

/// Number of duration samples kept for percentiles
const MAX_DURATION_SAMPLES: usize = 1000;

const PREFIX: &str = "docgate";

/// Metrics collector
#[derive(Debug)]
pub struct Metrics {
    /// HTTP requests served
    pub requests_total: AtomicU64,
    /// Requests that ended in a 5xx
    pub errors_total: AtomicU64,
    /// Checkout sessions created at the processor
    pub checkout_sessions_total: AtomicU64,
    /// Webhook deliveries that verified
    pub webhook_events_total: AtomicU64,
    /// Webhook deliveries rejected (bad signature, stale timestamp, bad body)
    pub webhook_rejected_total: AtomicU64,
    /// Webhook deliveries ignored as already processed
    pub webhook_duplicates_total: AtomicU64,
    /// Verified webhook events acknowledged without effect
    pub webhook_unusable_total: AtomicU64,
    /// pending -> confirmed transitions
    pub confirmations_total: AtomicU64,
    /// confirmed -> released transitions
    pub releases_total: AtomicU64,
    /// Finalize calls routed to cancellation
    pub cancellations_total: AtomicU64,

    request_durations: RwLock<DurationSamples>,
    requests_by_path_status: RwLock<BTreeMap<(String, u16), u64>>,
    cancellations_by_reason: RwLock<BTreeMap<String, u64>>,
}

/// Fixed-size ring of the most recent durations
#[derive(Debug)]
struct DurationSamples {
    data: Vec<Duration>,
    write_pos: usize,
}

impl DurationSamples {
    fn new() -> Self {
        Self {
            data: Vec::with_capacity(MAX_DURATION_SAMPLES),
            write_pos: 0,
        }
    }

    fn push(&mut self, value: Duration) {
        if self.data.len() < MAX_DURATION_SAMPLES {
            self.data.push(value);
        } else {
            self.data[self.write_pos] = value;
        }
        self.write_pos = (self.write_pos + 1) % MAX_DURATION_SAMPLES;
    }

    /// Nearest-rank percentile, `p` in 0.0..=1.0
    fn percentile(&self, p: f64) -> Option<Duration> {
        if self.data.is_empty() {
            return None;
        }
        let mut sorted = self.data.clone();
        sorted.sort();
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted.get(idx).copied()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create an empty collector
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            checkout_sessions_total: AtomicU64::new(0),
            webhook_events_total: AtomicU64::new(0),
            webhook_rejected_total: AtomicU64::new(0),
            webhook_duplicates_total: AtomicU64::new(0),
            webhook_unusable_total: AtomicU64::new(0),
            confirmations_total: AtomicU64::new(0),
            releases_total: AtomicU64::new(0),
            cancellations_total: AtomicU64::new(0),
            request_durations: RwLock::new(DurationSamples::new()),
            requests_by_path_status: RwLock::new(BTreeMap::new()),
            cancellations_by_reason: RwLock::new(BTreeMap::new()),
        }
    }

    /// Record a served request
    pub fn record_request(&self, path: &str, status_code: u16, duration: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if status_code >= 500 {
            self.errors_total.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut durations) = self.request_durations.write() {
            durations.push(duration);
        }
        if let Ok(mut breakdown) = self.requests_by_path_status.write() {
            *breakdown
                .entry((path.to_string(), status_code))
                .or_insert(0) += 1;
        }
    }

    /// Record a created checkout session
    pub fn record_checkout_session(&self) {
        self.checkout_sessions_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a verified webhook delivery
    pub fn record_webhook_event(&self) {
        self.webhook_events_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejected webhook delivery
    pub fn record_webhook_rejected(&self) {
        self.webhook_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a duplicate webhook delivery
    pub fn record_webhook_duplicate(&self) {
        self.webhook_duplicates_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a verified event that could not be applied
    pub fn record_webhook_unusable(&self) {
        self.webhook_unusable_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pending -> confirmed transition
    pub fn record_confirmation(&self) {
        self.confirmations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a confirmed -> released transition
    pub fn record_release(&self) {
        self.releases_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finalize call routed to cancellation
    pub fn record_cancellation(&self, reason: &str) {
        self.cancellations_total.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut breakdown) = self.cancellations_by_reason.write() {
            *breakdown.entry(reason.to_string()).or_insert(0) += 1;
        }
    }

    /// Render all metrics in Prometheus text exposition format
    pub fn to_prometheus_format(&self) -> String {
        let mut out = String::new();

        let counters: [(&str, &str, &AtomicU64); 10] = [
            ("requests_total", "HTTP requests served", &self.requests_total),
            ("errors_total", "HTTP requests that ended in a 5xx", &self.errors_total),
            (
                "checkout_sessions_total",
                "Checkout sessions created",
                &self.checkout_sessions_total,
            ),
            (
                "webhook_events_total",
                "Verified webhook deliveries",
                &self.webhook_events_total,
            ),
            (
                "webhook_rejected_total",
                "Rejected webhook deliveries",
                &self.webhook_rejected_total,
            ),
            (
                "webhook_duplicates_total",
                "Duplicate webhook deliveries",
                &self.webhook_duplicates_total,
            ),
            (
                "webhook_unusable_total",
                "Verified webhook events that could not be applied",
                &self.webhook_unusable_total,
            ),
            (
                "confirmations_total",
                "Fulfillments confirmed",
                &self.confirmations_total,
            ),
            ("releases_total", "Documents released", &self.releases_total),
            (
                "cancellations_total",
                "Finalize calls routed to cancellation",
                &self.cancellations_total,
            ),
        ];

        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {PREFIX}_{name} {help}");
            let _ = writeln!(out, "# TYPE {PREFIX}_{name} counter");
            let _ = writeln!(out, "{PREFIX}_{name} {}", value.load(Ordering::Relaxed));
        }

        if let Ok(breakdown) = self.requests_by_path_status.read() {
            if !breakdown.is_empty() {
                let _ = writeln!(out, "# TYPE {PREFIX}_requests_by_route counter");
            }
            for ((path, status), count) in breakdown.iter() {
                let _ = writeln!(
                    out,
                    "{PREFIX}_requests_by_route{{path=\"{path}\",status=\"{status}\"}} {count}"
                );
            }
        }

        if let Ok(breakdown) = self.cancellations_by_reason.read() {
            if !breakdown.is_empty() {
                let _ = writeln!(out, "# TYPE {PREFIX}_cancellations_by_reason counter");
            }
            for (reason, count) in breakdown.iter() {
                let _ = writeln!(
                    out,
                    "{PREFIX}_cancellations_by_reason{{reason=\"{reason}\"}} {count}"
                );
            }
        }

        if let Ok(durations) = self.request_durations.read() {
            for (label, p) in [("p50", 0.5), ("p95", 0.95), ("p99", 0.99)] {
                if let Some(d) = durations.percentile(p) {
                    let _ = writeln!(
                        out,
                        "{PREFIX}_request_duration_{label}_ms {}",
                        d.as_millis()
                    );
                }
            }
        }

        out
    }
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get or initialize the process-wide collector
pub fn global_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}
