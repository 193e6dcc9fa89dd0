//! Background Janitor
//!
//! Lazy reaping only removes expired entries that are touched again. The
//! janitor bounds the lifetime of the rest: a single long-lived task wakes
//! on a fixed period, visits every shard in order and reaps expired
//! entries under a bounded scan budget (see
//! [`StorageEngine::sweep_expired`]).
//!
//! The task runs on a periodic interval timer rather than a sleep loop, so
//! the tick cadence does not drift, and it coordinates with client tasks
//! only through the per-shard locks. It is stopped through a watch
//! channel; dropping the handle stops it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::storage::StorageEngine;

/// Configuration for the janitor task.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    /// Time between sweep ticks.
    pub period: Duration,

    /// Entries examined per shard per tick before the sweep gives up
    /// (extended tenfold while removals keep turning up).
    pub scan_limit: usize,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            scan_limit: 100,
        }
    }
}

/// Handle to the running janitor task.
///
/// Dropping the handle signals the task to stop.
#[derive(Debug)]
pub struct Janitor {
    shutdown_tx: watch::Sender<bool>,
}

impl Janitor {
    /// Spawns the janitor as a background task sweeping `engine`.
    pub fn start(engine: Arc<StorageEngine>, config: JanitorConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(janitor_loop(engine, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Signals the janitor task to stop. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for Janitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn janitor_loop(
    engine: Arc<StorageEngine>,
    config: JanitorConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("janitor received shutdown signal");
                    return;
                }
            }
        }

        let removed = engine.sweep_expired(config.scan_limit);
        if removed > 0 {
            debug!(
                removed,
                keys_remaining = engine.len(),
                "swept expired entries"
            );
        } else {
            trace!("sweep tick found nothing to reap");
        }
    }
}

/// Starts the janitor with the default 100 ms period and scan limit.
pub fn start_janitor(engine: Arc<StorageEngine>) -> Janitor {
    Janitor::start(engine, JanitorConfig::default())
}
