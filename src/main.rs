use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use stayd::auth::StaticRoles;
use stayd::engine::Engine;
use stayd::notify::ChangeFeed;
use stayd::sweeper;

/// Sweep worker. One-shot by default (run it from cron once per day);
/// set STAYD_SWEEP_INTERVAL_SECS for a long-lived worker loop.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("STAYD_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    stayd::observability::init(metrics_port);

    let data_dir = std::env::var("STAYD_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: u64 = std::env::var("STAYD_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let sweep_interval_secs: Option<u64> = std::env::var("STAYD_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok());

    std::fs::create_dir_all(&data_dir)?;
    let journal_path = PathBuf::from(&data_dir).join("stayd.journal");

    let feed = Arc::new(ChangeFeed::new());
    let roles = Arc::new(StaticRoles::new());
    let engine = Arc::new(Engine::new(journal_path, feed, roles)?);

    info!("stayd sweep worker starting");
    info!("  data_dir: {data_dir}");
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let Some(secs) = sweep_interval_secs else {
        // Cron mode: one sweep, opportunistic compaction, exit.
        let as_of = chrono::Utc::now().date_naive();
        let advanced = engine.run_expiration_sweep(as_of).await?;
        info!("sweep for {as_of}: advanced {advanced} reservations");
        if engine.journal_appends_since_compact().await >= compact_threshold {
            engine.compact_journal().await?;
            info!("journal compacted");
        }
        return Ok(());
    };

    // Worker mode: sweep + compact on timers until told to stop.
    let sweep_engine = engine.clone();
    tokio::spawn(async move {
        sweeper::run_sweeper(sweep_engine, Duration::from_secs(secs)).await;
    });
    let compact_engine = engine.clone();
    tokio::spawn(async move {
        sweeper::run_compactor(compact_engine, compact_threshold).await;
    });

    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("stayd sweep worker stopped");
    Ok(())
}
