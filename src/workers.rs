use crate::session_store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

const SWEEP_INTERVAL: Duration = Duration::from_secs(600);

/// Background runtime: periodically drops expired sessions that nobody
/// looked up again. Lookup-time eviction already guarantees correctness;
/// this keeps the token map from growing without bound under login churn.
pub async fn run_workers(shutdown: Arc<Notify>, sessions: SessionStore) {
    info!("Worker runtime started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                let removed = sessions.sweep_expired();
                if removed > 0 {
                    debug!("Swept {} expired sessions", removed);
                }
            }
            _ = shutdown.notified() => {
                info!("Worker: shutdown signal received");
                break;
            }
        }
    }

    info!("Worker runtime exited");
}
