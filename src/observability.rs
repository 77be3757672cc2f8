use std::net::SocketAddr;
use std::time::Instant;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: lifecycle commands executed. Labels: op, status.
pub const COMMANDS_TOTAL: &str = "stayd_commands_total";

/// Histogram: command latency in seconds. Labels: op.
pub const COMMAND_DURATION_SECONDS: &str = "stayd_command_duration_seconds";

// ── Sweep metrics ───────────────────────────────────────────────

/// Counter: expiration sweep runs.
pub const SWEEP_RUNS_TOTAL: &str = "stayd_sweep_runs_total";

/// Counter: reservations advanced to checked-out by the sweep.
pub const SWEEP_CHECKOUTS_TOTAL: &str = "stayd_sweep_checkouts_total";

/// Counter: per-reservation sweep failures (logged and skipped).
pub const SWEEP_FAILURES_TOTAL: &str = "stayd_sweep_failures_total";

// ── Journal metrics ─────────────────────────────────────────────

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "stayd_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (records per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "stayd_journal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Record one lifecycle command outcome at the public API boundary.
pub fn record_command(op: &'static str, ok: bool, started: Instant) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(COMMANDS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(COMMAND_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}
