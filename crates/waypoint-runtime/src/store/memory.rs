use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;

use waypoint_core::config::StoreConfig;
use waypoint_core::{BoxFuture, MembershipSet, MembershipStore, Result, ServiceName};

use super::LockKind;

/// Lock lease; `None` never expires.
type Lease = Option<Instant>;

/// Process-local membership store.
///
/// Agents in the same process share one instance through an `Arc`.
pub struct InMemoryStore {
    fetch_lock_ttl: Duration,
    watch_lock_ttl: Option<Duration>,
    locks: RwLock<HashMap<(LockKind, ServiceName), Lease>>,
    memberships: RwLock<HashMap<ServiceName, MembershipSet>>,
    heartbeats: RwLock<HashMap<ServiceName, DateTime<Utc>>>,
}

impl InMemoryStore {
    /// Create a store with explicit lock leases.
    pub fn new(fetch_lock_ttl: Duration, watch_lock_ttl: Option<Duration>) -> Self {
        Self {
            fetch_lock_ttl,
            watch_lock_ttl,
            locks: RwLock::new(HashMap::new()),
            memberships: RwLock::new(HashMap::new()),
            heartbeats: RwLock::new(HashMap::new()),
        }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.fetch_lock_ttl(), config.watch_lock_ttl())
    }

    async fn try_acquire(&self, kind: LockKind, service: &ServiceName) -> bool {
        let now = Instant::now();
        let mut locks = self.locks.write().await;
        let key = (kind, service.clone());

        if let Some(lease) = locks.get(&key) {
            let expired = matches!(lease, Some(until) if *until <= now);
            if !expired {
                return false;
            }
        }

        let ttl = match kind {
            LockKind::Fetch => Some(self.fetch_lock_ttl),
            LockKind::Watch => self.watch_lock_ttl,
        };
        locks.insert(key, ttl.map(|ttl| now + ttl));
        tracing::debug!(service = %service, lock = kind.as_str(), "Lock acquired");
        true
    }

    /// Overwrite a heartbeat. Used to simulate a watch owner that stopped iterating.
    pub async fn set_watch_heartbeat_at(&self, service: &ServiceName, at: DateTime<Utc>) {
        self.heartbeats.write().await.insert(service.clone(), at);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

impl MembershipStore for InMemoryStore {
    fn try_acquire_fetch_lock<'a>(&'a self, service: &'a ServiceName) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.try_acquire(LockKind::Fetch, service).await) })
    }

    fn try_acquire_watch_lock<'a>(&'a self, service: &'a ServiceName) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.try_acquire(LockKind::Watch, service).await) })
    }

    fn get_membership<'a>(
        &'a self,
        service: &'a ServiceName,
    ) -> BoxFuture<'a, Result<Option<MembershipSet>>> {
        Box::pin(async move { Ok(self.memberships.read().await.get(service).cloned()) })
    }

    fn set_membership<'a>(
        &'a self,
        service: &'a ServiceName,
        members: &'a MembershipSet,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.memberships
                .write()
                .await
                .insert(service.clone(), members.clone());
            Ok(())
        })
    }

    fn get_watch_heartbeat<'a>(
        &'a self,
        service: &'a ServiceName,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>>> {
        Box::pin(async move { Ok(self.heartbeats.read().await.get(service).copied()) })
    }

    fn set_watch_heartbeat<'a>(&'a self, service: &'a ServiceName) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.set_watch_heartbeat_at(service, Utc::now()).await;
            Ok(())
        })
    }
}
