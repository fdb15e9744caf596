//! Periodic store maintenance.
//!
//! Expired entries stay in a store until something removes them, and the
//! mapping index keeps members whose record has expired. Each sweep purges the
//! first and prunes the second.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::mapping::MappingStore;
use crate::store::KvStore;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired store entries freed.
    pub purged: usize,
    /// Index members pruned.
    pub pruned: usize,
}

/// Run one sweep. Store failures are logged and count as nothing removed.
pub async fn sweep_once(store: &dyn KvStore, mappings: &MappingStore) -> SweepReport {
    let purged = match store.purge_expired().await {
        Ok(purged) => purged,
        Err(e) => {
            warn!(error = %e, "expired entry purge failed");
            0
        }
    };
    let pruned = mappings.reconcile_index().await;
    SweepReport { purged, pruned }
}

/// Sweep every `every` until `shutdown` turns true or its sender is dropped.
/// The first sweep runs immediately. Returns the number of sweeps run.
pub async fn sweep_task(
    store: Arc<dyn KvStore>,
    mappings: MappingStore,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    // `interval` panics on a zero period.
    let mut ticker = interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_secs = every.as_secs(), "store sweeper started");

    let mut cycles = 0;
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let report = sweep_once(store.as_ref(), &mappings).await;
                cycles += 1;
                debug!(purged = report.purged, pruned = report.pruned, "store sweep finished");
            }
        }
    }

    info!(cycles, "store sweeper stopped");
    cycles
}

/// A running [`sweep_task`].
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for it. Returns the number of sweeps run.
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(cycles) => cycles,
            Err(e) => {
                warn!(error = %e, "store sweeper did not stop cleanly");
                0
            }
        }
    }
}

/// Spawn [`sweep_task`] on the current runtime.
pub fn spawn_sweeper(
    store: Arc<dyn KvStore>,
    mappings: MappingStore,
    every: Duration,
) -> SweeperHandle {
    let (shutdown, receiver) = watch::channel(false);
    let task = tokio::spawn(sweep_task(store, mappings, every, receiver));
    SweeperHandle { shutdown, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::UnreachableStore;
    use crate::store::MemoryStore;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_sweep_once_purges_and_prunes() {
        let kv = Arc::new(MemoryStore::new());
        let mappings = MappingStore::new(kv.clone(), Duration::from_secs(10));
        assert!(mappings.save("set-1", "Dupixent", vec![], None).await);
        kv.set_ex("page_1", "{}", Duration::from_secs(5)).await.unwrap();

        assert_eq!(sweep_once(kv.as_ref(), &mappings).await, SweepReport::default());

        tokio::time::advance(Duration::from_secs(11)).await;
        let report = sweep_once(kv.as_ref(), &mappings).await;

        // record, title pointer and page
        assert_eq!(report, SweepReport { purged: 3, pruned: 1 });
        assert!(mappings.list_all_identifiers().await.is_empty());
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweep_once_tolerates_unreachable_store() {
        let kv: Arc<dyn KvStore> = Arc::new(UnreachableStore);
        let mappings = MappingStore::new(kv.clone(), MINUTE);
        assert_eq!(sweep_once(kv.as_ref(), &mappings).await, SweepReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_on_schedule_until_stopped() {
        let kv = Arc::new(MemoryStore::new());
        let mappings = MappingStore::new(kv.clone(), Duration::from_secs(10));
        assert!(mappings.save("set-1", "Dupixent", vec![], None).await);

        let sweeper = spawn_sweeper(kv.clone(), mappings.clone(), MINUTE);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(mappings.list_all_identifiers().await.len(), 1);

        tokio::time::sleep(MINUTE).await;
        assert!(mappings.list_all_identifiers().await.is_empty());
        assert_eq!(kv.purge_expired().await.unwrap(), 0);

        assert_eq!(sweeper.stop().await, 2);
    }
}
