use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "tablebook_requests_total";

/// Histogram: request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "tablebook_request_duration_seconds";

// ── Booking outcomes ────────────────────────────────────────────

/// Counter: reservations committed to the ledger.
pub const BOOKINGS_COMMITTED_TOTAL: &str = "tablebook_bookings_committed_total";

/// Counter: commits rejected because the slot was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "tablebook_booking_conflicts_total";

/// Counter: reservations cancelled.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "tablebook_bookings_cancelled_total";

/// Counter: grid writes that failed after the ledger accepted the change.
pub const GRID_MIRROR_FAILURES_TOTAL: &str = "tablebook_grid_mirror_failures_total";

/// Counter: reservations moved to completed by the status sweep.
pub const SWEEP_COMPLETED_TOTAL: &str = "tablebook_sweep_completed_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "tablebook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "tablebook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "tablebook_connections_rejected_total";

/// Gauge: open dialogue sessions.
pub const SESSIONS_ACTIVE: &str = "tablebook_sessions_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "tablebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "tablebook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a request to a short label for metrics.
pub fn request_label(req: &Request) -> &'static str {
    match req {
        Request::Hello { .. } => "hello",
        Request::Tables => "tables",
        Request::AvailableDates => "available_dates",
        Request::AvailableStartTimes { .. } => "available_start_times",
        Request::BestTable { .. } => "best_table",
        Request::EndTimes { .. } => "end_times",
        Request::UpdateIntent { .. } => "update_intent",
        Request::Commit => "commit",
        Request::Reset => "reset",
        Request::Cancel { .. } => "cancel",
        Request::ListBookings { .. } => "list_bookings",
        Request::BlockDay { .. } => "block_day",
    }
}
