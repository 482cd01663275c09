//! Exclusive periodic maintenance
//!
//! Background housekeeping (sweeps, heartbeats) runs under a
//! [`MaintenanceLock`]. When a tick finds the previous run still holding
//! the lock, the tick is logged and skipped; ticks are never queued.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Mutual exclusion for one maintenance job
#[derive(Debug)]
pub struct MaintenanceLock {
    name: String,
    lock: Mutex<()>,
    runs: AtomicU64,
    skipped: AtomicU64,
}

impl MaintenanceLock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lock: Mutex::new(()),
            runs: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `job` unless another run holds the lock
    ///
    /// Returns `None` when the tick was skipped.
    pub async fn run_exclusive<F, T>(&self, job: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let _held = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                warn!(job = %self.name, "Previous maintenance run still active, skipping tick");
                return None;
            }
        };
        self.runs.fetch_add(1, Ordering::Relaxed);
        Some(job.await)
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Drive `task` every `period` until `shutdown` fires
///
/// Each tick is spawned, so a slow run does not delay the clock; the lock
/// makes overlapping ticks skip.
pub fn spawn_periodic<F, Fut>(
    lock: Arc<MaintenanceLock>,
    period: Duration,
    task: F,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task = Arc::new(task);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;
        info!(job = %lock.name(), ?period, "Maintenance loop started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let lock = Arc::clone(&lock);
                    let task = Arc::clone(&task);
                    tokio::spawn(async move {
                        lock.run_exclusive(task()).await;
                    });
                }
            }
        }
        debug!(job = %lock.name(), runs = lock.runs(), skipped = lock.skipped(), "Maintenance loop stopped");
    })
}
