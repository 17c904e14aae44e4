//! Periodic reconciliation loop.

use std::time::Duration;

use crate::backend::RijkscloudBackend;

const DEFAULT_INTERVAL_SECS: u64 = 300;

fn interval_from_env() -> Duration {
    let secs = std::env::var("SYNC_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_INTERVAL_SECS);
    Duration::from_secs(secs)
}

/// Runs forever. A failed pass is logged and retried on the next tick.
pub async fn run(backend: RijkscloudBackend) {
    let period = interval_from_env();
    tracing::info!(
        "[sync] starting loop for settings '{}' (every {}s)",
        backend.settings().name,
        period.as_secs()
    );

    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match backend.sync().await {
            Ok(()) => tracing::info!("[sync] pass complete"),
            Err(e) => tracing::error!("[sync] pass failed: {:#}", e),
        }
    }
}
