use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::RoomRegistry;

/// Periodically drop rooms that have been idle for `idle_timeout` without a live pair.
pub fn spawn(registry: Arc<RoomRegistry>, interval: Duration, idle_timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let reaped = registry.reap_idle(tokio::time::Instant::now(), idle_timeout);
            if !reaped.is_empty() {
                tracing::info!("reaped {} idle room(s): {}", reaped.len(), reaped.join(", "));
            }
        }
    })
}
