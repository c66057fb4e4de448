//! Connection-layer metrics.
//!
//! A pluggable [`ConnMetrics`] trait with a no-op default and an adapter for
//! the [`metrics`](https://docs.rs/metrics) facade.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `meshlink_conn_dials_total` | Counter | `service`, `mode`, `status` |
//! | `meshlink_conn_dial_duration_seconds` | Histogram | `service`, `mode` |
//! | `meshlink_conn_cache_lookups_total` | Counter | `service`, `result` |
//! | `meshlink_conn_evictions_total` | Counter | `service`, `reason` |

use std::{fmt, sync::Arc, time::Duration};

/// Why a cached channel was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Closed through the registry.
    Closed,
    /// Reported broken by a caller.
    Broken,
    /// Failed an active health probe.
    ProbeFailed,
    /// A fan-out set no longer matched the service's addresses.
    Incomplete,
    /// Removed by an explicit invalidation.
    Invalidated,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Broken => write!(f, "broken"),
            Self::ProbeFailed => write!(f, "probe_failed"),
            Self::Incomplete => write!(f, "incomplete"),
            Self::Invalidated => write!(f, "invalidated"),
        }
    }
}

/// Hooks called by the registry. Every method defaults to a no-op.
pub trait ConnMetrics: Send + Sync + fmt::Debug {
    /// Records one dial attempt.
    ///
    /// - `mode`: `"balanced"` or `"direct"`.
    fn record_dial(&self, service: &str, mode: &str, duration: Duration, success: bool) {
        let _ = (service, mode, duration, success);
    }

    /// Records a cache lookup.
    fn record_cache_lookup(&self, service: &str, hit: bool) {
        let _ = (service, hit);
    }

    /// Records the eviction of one cached channel.
    fn record_eviction(&self, service: &str, reason: EvictionReason) {
        let _ = (service, reason);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy)]
pub struct NoopConnMetrics;

impl ConnMetrics for NoopConnMetrics {}

/// Forwards to the installed `metrics` recorder.
#[derive(Debug, Clone, Copy)]
pub struct MetricsConnMetrics;

mod metric_names {
    pub const DIALS_TOTAL: &str = "meshlink_conn_dials_total";
    pub const DIAL_DURATION: &str = "meshlink_conn_dial_duration_seconds";
    pub const CACHE_LOOKUPS_TOTAL: &str = "meshlink_conn_cache_lookups_total";
    pub const EVICTIONS_TOTAL: &str = "meshlink_conn_evictions_total";
}

impl ConnMetrics for MetricsConnMetrics {
    fn record_dial(&self, service: &str, mode: &str, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };
        metrics::counter!(
            metric_names::DIALS_TOTAL,
            "service" => service.to_owned(),
            "mode" => mode.to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(
            metric_names::DIAL_DURATION,
            "service" => service.to_owned(),
            "mode" => mode.to_owned(),
        )
        .record(duration.as_secs_f64());
    }

    fn record_cache_lookup(&self, service: &str, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        metrics::counter!(
            metric_names::CACHE_LOOKUPS_TOTAL,
            "service" => service.to_owned(),
            "result" => result,
        )
        .increment(1);
    }

    fn record_eviction(&self, service: &str, reason: EvictionReason) {
        metrics::counter!(
            metric_names::EVICTIONS_TOTAL,
            "service" => service.to_owned(),
            "reason" => reason.to_string(),
        )
        .increment(1);
    }
}

pub(crate) fn default_metrics() -> Arc<dyn ConnMetrics> {
    Arc::new(NoopConnMetrics)
}
