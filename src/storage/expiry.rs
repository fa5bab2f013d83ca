//! Background Expiration Reaper
//!
//! Lazy expiry only reclaims a key when something touches it; a key that is
//! never read again would sit in memory forever. The reaper closes that gap:
//! a background task wakes on a fixed period (configurable, default 1 s),
//! sweeps every shard for expired entries, and removes them.
//!
//! From a client's point of view the reaper's deletions are
//! indistinguishable from lazy expirations.

use crate::storage::Keyspace;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawns the reaper task.
///
/// The task sweeps `keyspace` every `period` until `shutdown` flips to
/// true (or its sender is dropped). The controller awaits the returned
/// handle during graceful shutdown.
pub fn start_reaper(
    keyspace: Arc<Keyspace>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(period_ms = period.as_millis() as u64, "Expiration reaper started");
    tokio::spawn(reaper_loop(keyspace, period, shutdown))
}

async fn reaper_loop(
    keyspace: Arc<Keyspace>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    debug!("Expiration reaper stopping");
                    return;
                }
                continue;
            }
        }

        let reclaimed = keyspace.cleanup_expired();
        if reclaimed > 0 {
            debug!(reclaimed, remaining = keyspace.len(), "Expired keys reclaimed");
        }
    }
}
