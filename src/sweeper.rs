use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;

/// Timer loop for worker deployments. The engine does not own a timer;
/// cron-style deployments skip this and invoke
/// `Engine::run_expiration_sweep` directly once per day.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let as_of = chrono::Utc::now().date_naive();
        match engine.run_expiration_sweep(as_of).await {
            Ok(0) => {}
            Ok(n) => info!("sweep advanced {n} reservations to checked-out"),
            Err(e) => warn!("sweep failed: {e}"),
        }
    }
}

/// Journal housekeeping loop: compact once the append count since the last
/// compaction crosses `threshold`.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        if engine.journal_appends_since_compact().await >= threshold {
            match engine.compact_journal().await {
                Ok(()) => info!("journal compacted"),
                Err(e) => warn!("journal compaction failed: {e}"),
            }
        }
    }
}
