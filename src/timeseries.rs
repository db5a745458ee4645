//! The columnar time-series store used for raw metric persistence and
//! historical queries is an external collaborator, described only at its
//! interface: the alarm engine never reads it back, it only needs
//! somewhere to forward samples so they are not lost on ingest.

use tracing::trace;

use crate::cache::MetricSnapshot;

/// Accepts raw metric snapshots for long-term storage.
pub trait TimeSeriesSink: Send + Sync {
    /// Records `snapshot` for `node_id` at ingest time.
    fn record(&self, node_id: &str, snapshot: &MetricSnapshot);
}

/// Default sink used when no real time-series backend is configured.
/// Discards samples after a trace-level log line.
#[derive(Default)]
pub struct NullTimeSeriesSink;

impl TimeSeriesSink for NullTimeSeriesSink {
    fn record(&self, node_id: &str, _snapshot: &MetricSnapshot) {
        trace!(node_id, "time-series sink is a no-op in this build");
    }
}
