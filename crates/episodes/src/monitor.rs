use std::time::Duration;

use chrono::Utc;
use sentrybot_config::EpisodesConfig;

use crate::EpisodeEngine;

/// Single background task that periodically checks every tracked window:
/// closes and emits episodes for expired windows, and runs a boundary check
/// (without auto-closing) on windows that are big enough but still active.
/// Spaces per-window work by `batch_delay_ms` to avoid CPU spikes.
pub fn spawn_monitor(
    engine: std::sync::Arc<EpisodeEngine>,
    config: EpisodesConfig,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(config.monitor_check_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = run_pass(&engine, &config).await {
                        tracing::warn!(error = %err, "episode monitor pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("episode monitor shutting down");
                        break;
                    }
                }
            }
        }
    });
}

async fn run_pass(engine: &EpisodeEngine, config: &EpisodesConfig) -> anyhow::Result<()> {
    let keys = engine.tracked_keys().await;
    let now = Utc::now().timestamp();

    for key in keys {
        engine.check_and_maybe_close(key, now, config).await?;
        tokio::time::sleep(Duration::from_millis(config.monitor_batch_delay_millis)).await;
    }
    Ok(())
}
