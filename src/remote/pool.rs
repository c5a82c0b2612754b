//! Remote Client Pool
//!
//! Per-endpoint pool of authenticated hypervisor sessions. Each endpoint has
//! an independent bound on checked-out clients; sessions are created lazily,
//! validated before being handed out, and returned by the [`PooledClient`]
//! guard on every exit path.
//!
//! A session whose call surfaced a protocol fault is poisoned and disposed of
//! when the guard drops, so it is never recycled.

use crate::domain::ports::{
    ClientFactoryRef, ClientId, EndpointCredentials, EndpointId, HypervisorClient,
};
use crate::error::{Error, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the client pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum concurrently checked-out clients per endpoint
    pub max_clients_per_endpoint: usize,
    /// How long a borrow waits for a free slot
    pub borrow_timeout: Duration,
    /// Idle sessions older than this are replaced on borrow
    pub max_idle: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_clients_per_endpoint: 4,
            borrow_timeout: Duration::from_secs(30),
            max_idle: Duration::from_secs(600),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Pool counters
#[derive(Debug, Default)]
pub struct PoolStats {
    pub created: AtomicU64,
    pub reused: AtomicU64,
    pub returned: AtomicU64,
    pub discarded: AtomicU64,
    pub validation_failures: AtomicU64,
    pub expired: AtomicU64,
    pub borrow_timeouts: AtomicU64,
    pub checked_out: AtomicU64,
}

impl PoolStats {
    /// Create a snapshot of current stats
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            borrow_timeouts: self.borrow_timeouts.load(Ordering::Relaxed),
            checked_out: self.checked_out.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub created: u64,
    pub reused: u64,
    pub returned: u64,
    pub discarded: u64,
    pub validation_failures: u64,
    pub expired: u64,
    pub borrow_timeouts: u64,
    pub checked_out: u64,
}

// =============================================================================
// Endpoint Slot
// =============================================================================

struct IdleClient {
    client: Box<dyn HypervisorClient>,
    returned_at: Instant,
}

/// Bounded set of sessions for one endpoint
struct EndpointSlot {
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<IdleClient>>,
}

impl EndpointSlot {
    fn new(max_clients: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_clients.max(1))),
            idle: Mutex::new(Vec::new()),
        }
    }
}

// =============================================================================
// Client Pool
// =============================================================================

/// Process-wide pool of hypervisor sessions keyed by endpoint
pub struct ClientPool {
    factory: ClientFactoryRef,
    config: PoolConfig,
    slots: DashMap<EndpointId, Arc<EndpointSlot>>,
    stats: Arc<PoolStats>,
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("config", &self.config)
            .field("endpoints", &self.slots.len())
            .finish()
    }
}

impl ClientPool {
    /// Create a new pool
    pub fn new(factory: ClientFactoryRef, config: PoolConfig) -> Arc<Self> {
        info!(
            max_clients = config.max_clients_per_endpoint,
            borrow_timeout_ms = config.borrow_timeout.as_millis() as u64,
            "Client pool initialized"
        );
        Arc::new(Self {
            factory,
            config,
            slots: DashMap::new(),
            stats: Arc::new(PoolStats::default()),
        })
    }

    fn slot(&self, endpoint: &EndpointId) -> Arc<EndpointSlot> {
        self.slots
            .entry(endpoint.clone())
            .or_insert_with(|| Arc::new(EndpointSlot::new(self.config.max_clients_per_endpoint)))
            .clone()
    }

    /// Borrow a validated session for an endpoint
    ///
    /// Waits up to the configured timeout for a free slot. `credentials` are
    /// only used if a fresh session has to be opened.
    pub async fn borrow(
        &self,
        endpoint: &EndpointId,
        credentials: &EndpointCredentials,
    ) -> Result<PooledClient> {
        let slot = self.slot(endpoint);

        let permit = match tokio::time::timeout(
            self.config.borrow_timeout,
            slot.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(Error::Internal(format!("client pool for {} is closed", endpoint)))
            }
            Err(_) => {
                self.stats.borrow_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(endpoint = %endpoint, "Client pool exhausted");
                return Err(Error::ResourceUnavailable {
                    resource: format!("client pool {}", endpoint),
                    reason: format!(
                        "no client available within {}ms",
                        self.config.borrow_timeout.as_millis()
                    ),
                });
            }
        };

        // Most recently returned sessions first
        loop {
            let candidate = slot.idle.lock().pop();
            let Some(idle) = candidate else { break };

            if idle.returned_at.elapsed() > self.config.max_idle {
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
                debug!(endpoint = %endpoint, client = %idle.client.id(), "Dropping expired idle client");
                continue;
            }

            if self.factory.validate(idle.client.as_ref()).await {
                self.stats.reused.fetch_add(1, Ordering::Relaxed);
                return Ok(self.hand_out(idle.client, permit, slot));
            }

            self.stats.validation_failures.fetch_add(1, Ordering::Relaxed);
            debug!(endpoint = %endpoint, client = %idle.client.id(), "Dropping stale client");
        }

        let client = self.factory.connect(endpoint, credentials).await?;
        self.stats.created.fetch_add(1, Ordering::Relaxed);
        debug!(endpoint = %endpoint, client = %client.id(), "Opened new client");

        Ok(self.hand_out(client, permit, slot))
    }

    fn hand_out(
        &self,
        client: Box<dyn HypervisorClient>,
        permit: OwnedSemaphorePermit,
        slot: Arc<EndpointSlot>,
    ) -> PooledClient {
        self.stats.checked_out.fetch_add(1, Ordering::Relaxed);
        PooledClient {
            client: Some(client),
            poisoned: AtomicBool::new(false),
            slot,
            stats: self.stats.clone(),
            _permit: permit,
        }
    }

    /// Number of idle sessions kept for an endpoint
    pub fn idle_count(&self, endpoint: &EndpointId) -> usize {
        self.slots
            .get(endpoint)
            .map(|slot| slot.idle.lock().len())
            .unwrap_or(0)
    }

    /// Number of sessions that could still be checked out right now
    pub fn available(&self, endpoint: &EndpointId) -> usize {
        self.slots
            .get(endpoint)
            .map(|slot| slot.permits.available_permits())
            .unwrap_or(self.config.max_clients_per_endpoint)
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

// =============================================================================
// Pooled Client Guard
// =============================================================================

/// Exclusive loan of a session
///
/// Dropping the guard returns the session to its endpoint pool, unless it was
/// poisoned by a protocol fault or explicitly discarded.
pub struct PooledClient {
    client: Option<Box<dyn HypervisorClient>>,
    poisoned: AtomicBool,
    slot: Arc<EndpointSlot>,
    stats: Arc<PoolStats>,
    _permit: OwnedSemaphorePermit,
}

impl PooledClient {
    /// Run a call against the session, poisoning it on a protocol fault
    pub async fn call<'s, T, F, Fut>(&'s self, f: F) -> Result<T>
    where
        F: FnOnce(&'s dyn HypervisorClient) -> Fut,
        Fut: Future<Output = Result<T>> + 's,
    {
        let result = f(self.client()).await;
        if let Err(e) = &result {
            if poisons_session(e) {
                warn!(client = %self.id(), error = %e, "Client surfaced a protocol fault");
                self.poisoned.store(true, Ordering::Release);
            }
        }
        result
    }

    /// Dispose of the session instead of returning it
    pub fn discard(self) {
        self.poisoned.store(true, Ordering::Release);
    }

    pub fn id(&self) -> ClientId {
        self.client().id()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    fn client(&self) -> &(dyn HypervisorClient + 'static) {
        self.client
            .as_deref()
            .expect("session is present until the guard is dropped")
    }
}

impl std::fmt::Debug for PooledClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledClient")
            .field("id", &self.client.as_ref().map(|c| c.id()))
            .field("poisoned", &self.is_poisoned())
            .finish()
    }
}

impl Deref for PooledClient {
    type Target = dyn HypervisorClient;

    fn deref(&self) -> &Self::Target {
        self.client()
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        self.stats.checked_out.fetch_sub(1, Ordering::Relaxed);
        let Some(client) = self.client.take() else { return };

        if self.poisoned.load(Ordering::Acquire) {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(client = %client.id(), "Discarded client");
            return;
        }

        self.stats.returned.fetch_add(1, Ordering::Relaxed);
        self.slot.idle.lock().push(IdleClient {
            client,
            returned_at: Instant::now(),
        });
        // permit is released after the session is back in the idle list
    }
}

/// Errors that leave a session in an unknown protocol state
fn poisons_session(error: &Error) -> bool {
    matches!(error, Error::Connection { .. } | Error::RemoteCall { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::simulated::{SimulatedClientFactory, SimulatedHypervisor};
    use assert_matches::assert_matches;

    fn creds() -> EndpointCredentials {
        EndpointCredentials {
            user: "admin".into(),
            password: crate::domain::Secret::new("pw"),
        }
    }

    fn pool_with(config: PoolConfig) -> (Arc<ClientPool>, Arc<SimulatedHypervisor>, EndpointId) {
        let endpoint = EndpointId::new("vc-1");
        let hypervisor = SimulatedHypervisor::new(Default::default());
        let factory = SimulatedClientFactory::new();
        factory.register(endpoint.clone(), hypervisor.clone());
        (ClientPool::new(Arc::new(factory), config), hypervisor, endpoint)
    }

    fn small_config() -> PoolConfig {
        PoolConfig {
            max_clients_per_endpoint: 1,
            borrow_timeout: Duration::from_millis(50),
            max_idle: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_returned_client_is_reused() {
        let (pool, _, endpoint) = pool_with(small_config());

        let first = pool.borrow(&endpoint, &creds()).await.unwrap();
        let id = first.id();
        drop(first);
        assert_eq!(pool.idle_count(&endpoint), 1);

        let second = pool.borrow(&endpoint, &creds()).await.unwrap();
        assert_eq!(second.id(), id);

        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.checked_out, 1);
    }

    #[tokio::test]
    async fn test_guard_derefs_to_session() {
        let (pool, _, endpoint) = pool_with(small_config());
        let client = pool.borrow(&endpoint, &creds()).await.unwrap();

        let session: &dyn HypervisorClient = &*client;
        assert_eq!(session.endpoint(), &endpoint);
        assert!(client.is_session_valid().await);
        assert!(format!("{:?}", client).contains("poisoned: false"));
    }

    #[tokio::test]
    async fn test_discarded_client_is_never_handed_out_again() {
        let (pool, _, endpoint) = pool_with(small_config());

        let first = pool.borrow(&endpoint, &creds()).await.unwrap();
        let id = first.id();
        first.discard();
        assert_eq!(pool.idle_count(&endpoint), 0);

        let second = pool.borrow(&endpoint, &creds()).await.unwrap();
        assert_ne!(second.id(), id);
        assert_eq!(pool.stats().discarded, 1);
    }

    #[tokio::test]
    async fn test_protocol_fault_poisons_client() {
        let (pool, hypervisor, endpoint) = pool_with(small_config());
        hypervisor.fail_next("vm_info", "SOAP fault");

        let client = pool.borrow(&endpoint, &creds()).await.unwrap();
        let id = client.id();
        let result = client.call(|c| c.vm_info("vm-01")).await;
        assert_matches!(result, Err(Error::RemoteCall { .. }));
        assert!(client.is_poisoned());
        drop(client);

        let next = pool.borrow(&endpoint, &creds()).await.unwrap();
        assert_ne!(next.id(), id);
    }

    #[tokio::test]
    async fn test_exhausted_pool_times_out() {
        let (pool, _, endpoint) = pool_with(small_config());

        let held = pool.borrow(&endpoint, &creds()).await.unwrap();
        let result = pool.borrow(&endpoint, &creds()).await;
        assert_matches!(result, Err(Error::ResourceUnavailable { .. }));
        assert_eq!(pool.stats().borrow_timeouts, 1);

        drop(held);
        assert!(pool.borrow(&endpoint, &creds()).await.is_ok());
    }

    #[tokio::test]
    async fn test_stale_session_replaced_on_borrow() {
        let (pool, hypervisor, endpoint) = pool_with(small_config());

        let first = pool.borrow(&endpoint, &creds()).await.unwrap();
        let id = first.id();
        drop(first);

        hypervisor.expire_sessions();

        let second = pool.borrow(&endpoint, &creds()).await.unwrap();
        assert_ne!(second.id(), id);
        assert_eq!(pool.stats().validation_failures, 1);
    }

    #[tokio::test]
    async fn test_expired_idle_session_replaced() {
        let (pool, _, endpoint) = pool_with(PoolConfig {
            max_idle: Duration::from_millis(0),
            ..small_config()
        });

        let first = pool.borrow(&endpoint, &creds()).await.unwrap();
        let id = first.id();
        drop(first);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let second = pool.borrow(&endpoint, &creds()).await.unwrap();
        assert_ne!(second.id(), id);
        assert_eq!(pool.stats().expired, 1);
    }

    #[tokio::test]
    async fn test_failed_connect_releases_slot() {
        let (pool, _, _) = pool_with(small_config());
        let unknown = EndpointId::new("vc-unknown");

        let result = pool.borrow(&unknown, &creds()).await;
        assert_matches!(result, Err(Error::Connection { .. }));
        assert_eq!(pool.available(&unknown), 1);
    }

    #[tokio::test]
    async fn test_endpoints_are_independent() {
        let (pool, _, endpoint) = pool_with(small_config());
        let _held = pool.borrow(&endpoint, &creds()).await.unwrap();
        assert_eq!(pool.available(&endpoint), 0);
        assert_eq!(pool.available(&EndpointId::new("vc-2")), 1);
    }
}
