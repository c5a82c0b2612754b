//! Inventory Store
//!
//! Process-wide holder of the current [`InventorySnapshot`]. Readers clone an
//! `Arc` to the active snapshot; the refresher swaps in a complete new one,
//! so a reader never observes a partially updated inventory.

use super::events::InventoryEvent;
use super::snapshot::InventorySnapshot;
use crate::domain::ports::InventorySourceRef;
use crate::error::Result;
use backoff::ExponentialBackoff;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================================================================
// Inventory Store
// =============================================================================

/// Atomically swapped inventory snapshot
pub struct InventoryStore {
    current: RwLock<Arc<InventorySnapshot>>,
    generation: AtomicU64,
    event_sender: broadcast::Sender<InventoryEvent>,
}

impl std::fmt::Debug for InventoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryStore")
            .field("generation", &self.generation())
            .finish()
    }
}

impl InventoryStore {
    /// Create a store holding an empty snapshot
    pub fn new() -> Arc<Self> {
        Self::with_snapshot(InventorySnapshot::empty())
    }

    /// Create a store holding the given snapshot
    pub fn with_snapshot(snapshot: InventorySnapshot) -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(64);
        Arc::new(Self {
            current: RwLock::new(Arc::new(snapshot)),
            generation: AtomicU64::new(0),
            event_sender,
        })
    }

    /// Get the active snapshot
    pub fn snapshot(&self) -> Arc<InventorySnapshot> {
        self.current.read().clone()
    }

    /// Swap in a new snapshot, returning the new generation
    pub fn replace(&self, snapshot: InventorySnapshot) -> u64 {
        let hosts = snapshot.hosts().len();
        let storages = snapshot.storages().len();
        let networks = snapshot.networks().len();

        *self.current.write() = Arc::new(snapshot);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let _ = self.event_sender.send(InventoryEvent::Refreshed {
            generation,
            hosts,
            storages,
            networks,
        });

        generation
    }

    /// Number of snapshots swapped in so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<InventoryEvent> {
        self.event_sender.subscribe()
    }

    fn report_failure(&self, source: String, reason: String) {
        let _ = self
            .event_sender
            .send(InventoryEvent::RefreshFailed { source, reason });
    }
}

// =============================================================================
// Refresher
// =============================================================================

/// Configuration for the inventory refresher
#[derive(Debug, Clone)]
pub struct RefresherConfig {
    /// Time between refreshes
    pub interval: Duration,
    /// Give up on one refresh round after this long
    pub max_retry_elapsed: Duration,
    /// First retry delay
    pub initial_retry_interval: Duration,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            max_retry_elapsed: Duration::from_secs(60),
            initial_retry_interval: Duration::from_millis(500),
        }
    }
}

/// Rebuilds the inventory from a source on an interval
pub struct InventoryRefresher {
    store: Arc<InventoryStore>,
    source: InventorySourceRef,
    config: RefresherConfig,
}

impl InventoryRefresher {
    pub fn new(
        store: Arc<InventoryStore>,
        source: InventorySourceRef,
        config: RefresherConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Load the source once (with retries) and swap the result in
    pub async fn refresh_once(&self) -> Result<u64> {
        let policy = ExponentialBackoff {
            initial_interval: self.config.initial_retry_interval,
            max_elapsed_time: Some(self.config.max_retry_elapsed),
            ..Default::default()
        };

        let source = self.source.clone();
        let loaded = backoff::future::retry(policy, || {
            let source = source.clone();
            async move {
                source.load().await.map_err(|e| {
                    debug!(source = %source.describe(), error = %e, "Inventory load attempt failed");
                    backoff::Error::transient(e)
                })
            }
        })
        .await;

        match loaded {
            Ok(snapshot) => {
                let generation = self.store.replace(snapshot);
                info!(
                    source = %self.source.describe(),
                    generation,
                    "Inventory snapshot refreshed"
                );
                Ok(generation)
            }
            Err(e) => {
                warn!(
                    source = %self.source.describe(),
                    error = %e,
                    "Inventory refresh failed, keeping previous snapshot"
                );
                self.store.report_failure(self.source.describe(), e.to_string());
                Err(e)
            }
        }
    }

    /// Run until cancelled; the first refresh happens immediately
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Inventory refresher stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let _ = self.refresh_once().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::InventorySource;
    use crate::error::Error;
    use crate::inventory::snapshot::fixtures::host;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FlakySource {
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl InventorySource for FlakySource {
        async fn load(&self) -> Result<InventorySnapshot> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::Inventory("importer busy".into()));
            }
            Ok(InventorySnapshot::new(vec![host("esx-1", 0, 0, 0)], vec![], vec![]))
        }

        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    fn fast_config() -> RefresherConfig {
        RefresherConfig {
            interval: Duration::from_millis(10),
            max_retry_elapsed: Duration::from_millis(500),
            initial_retry_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_replace_swaps_whole_snapshot() {
        let store = InventoryStore::new();
        let before = store.snapshot();
        assert!(before.is_empty());

        let generation =
            store.replace(InventorySnapshot::new(vec![host("esx-1", 0, 0, 0)], vec![], vec![]));
        assert_eq!(generation, 1);

        // A reader holding the old snapshot keeps a consistent view
        assert!(before.is_empty());
        assert_eq!(store.snapshot().hosts().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_retries_transient_failures() {
        let store = InventoryStore::new();
        let mut events = store.subscribe();
        let refresher = InventoryRefresher::new(
            store.clone(),
            Arc::new(FlakySource {
                failures_left: AtomicUsize::new(2),
            }),
            fast_config(),
        );

        let generation = refresher.refresh_once().await.unwrap();
        assert_eq!(generation, 1);
        assert_eq!(store.snapshot().hosts()[0].id, "esx-1");

        let event = events.recv().await.unwrap();
        assert_eq!(event.event_type(), "refreshed");
    }

    #[tokio::test]
    async fn test_spawned_refresher_stops_on_cancel() {
        let store = InventoryStore::new();
        let refresher = InventoryRefresher::new(
            store.clone(),
            Arc::new(FlakySource {
                failures_left: AtomicUsize::new(0),
            }),
            fast_config(),
        );

        let cancel = CancellationToken::new();
        let handle = refresher.spawn(cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(store.generation() >= 1);
    }
}
