use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::ids::JobId;
use crate::config::PhaseConfig;
use crate::membership::{MembershipSet, RawSnapshot, ServiceName};
use crate::Result;

/// Boxed future returned by the agent's collaborators.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Process-shared membership cache with cross-agent locks.
///
/// Every operation must be atomic with respect to other agents sharing the
/// same backing.
pub trait MembershipStore: Send + Sync {
    /// Try to become the single fetcher for a service. Never blocks.
    fn try_acquire_fetch_lock<'a>(&'a self, service: &'a ServiceName) -> BoxFuture<'a, Result<bool>>;

    /// Try to become the single watcher for a service. Never blocks.
    fn try_acquire_watch_lock<'a>(&'a self, service: &'a ServiceName) -> BoxFuture<'a, Result<bool>>;

    /// Read the cached membership, if any fetch has stored one.
    fn get_membership<'a>(
        &'a self,
        service: &'a ServiceName,
    ) -> BoxFuture<'a, Result<Option<MembershipSet>>>;

    /// Replace the cached membership.
    fn set_membership<'a>(
        &'a self,
        service: &'a ServiceName,
        members: &'a MembershipSet,
    ) -> BoxFuture<'a, Result<()>>;

    /// When a watch iteration last started for a service.
    fn get_watch_heartbeat<'a>(
        &'a self,
        service: &'a ServiceName,
    ) -> BoxFuture<'a, Result<Option<DateTime<Utc>>>>;

    /// Record that a watch iteration is starting now.
    fn set_watch_heartbeat<'a>(&'a self, service: &'a ServiceName) -> BoxFuture<'a, Result<()>>;

    /// How long ago the last watch heartbeat was written, on the clock that wrote it.
    ///
    /// Stores shared across hosts override this so the age never mixes two clocks.
    fn watch_heartbeat_age<'a>(
        &'a self,
        service: &'a ServiceName,
    ) -> BoxFuture<'a, Result<Option<chrono::Duration>>> {
        Box::pin(async move {
            let heartbeat = self.get_watch_heartbeat(service).await?;
            Ok(heartbeat.map(|at| Utc::now().signed_duration_since(at)))
        })
    }
}

/// Cursor into the directory's change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WaitIndex(pub u64);

/// One request against the directory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRequest {
    /// Directory service host.
    pub host: String,
    /// Directory service port.
    pub port: u16,
    /// Path of the service directory.
    pub path: String,
    /// Query parameters in order.
    pub params: Vec<(String, String)>,
    /// How long to wait before failing with a timeout.
    pub timeout: Duration,
}

impl DirectoryRequest {
    /// Plain read of a service directory.
    pub fn fetch(config: &PhaseConfig, service: &ServiceName) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            path: config.directory_path(service.as_str()),
            params: Vec::new(),
            timeout: config.timeout(),
        }
    }

    /// Long-poll on a service directory, optionally resuming from a cursor.
    pub fn watch(config: &PhaseConfig, service: &ServiceName, wait_index: Option<WaitIndex>) -> Self {
        let mut params = vec![
            ("wait".to_string(), "true".to_string()),
            ("recursive".to_string(), "true".to_string()),
        ];
        if let Some(WaitIndex(index)) = wait_index.filter(|w| w.0 > 0) {
            params.push(("waitIndex".to_string(), index.to_string()));
        }

        Self {
            params,
            ..Self::fetch(config, service)
        }
    }

    /// Look up a query parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Client for the directory service.
pub trait DirectoryTransport: Send + Sync {
    /// Perform a request. `Ok(None)` means the service answered without a body.
    /// Fails with [`crate::WaypointError::TransportTimeout`] once `request.timeout` elapses.
    fn fetch(&self, request: DirectoryRequest) -> BoxFuture<'_, Result<Option<RawSnapshot>>>;
}

/// Consumer of membership changes, typically a connection pool.
pub trait ConnectionSink: Send + Sync {
    /// Full membership after a bootstrap.
    fn populate<'a>(
        &'a self,
        service: &'a ServiceName,
        members: &'a MembershipSet,
    ) -> BoxFuture<'a, Result<()>>;

    /// Endpoints that went away.
    fn remove_endpoints<'a>(
        &'a self,
        service: &'a ServiceName,
        offline: &'a MembershipSet,
    ) -> BoxFuture<'a, Result<()>>;

    /// Endpoints that appeared.
    fn add_endpoints<'a>(
        &'a self,
        service: &'a ServiceName,
        online: &'a MembershipSet,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Runs workflows and delayed steps.
pub trait Scheduler: Send + Sync {
    /// Run a workflow to completion in the background. Errors are reported by the scheduler.
    fn run_workflow(&self, name: &str, workflow: BoxFuture<'static, Result<()>>);

    /// Run `step` after `delay`. A pending step with the same id is replaced.
    fn schedule_after(&self, delay: Duration, job_id: JobId, step: BoxFuture<'static, ()>);

    /// Drop a pending step. Returns whether one was pending.
    fn cancel(&self, job_id: &JobId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ServiceName {
        ServiceName::new("orders").unwrap()
    }

    #[test]
    fn test_fetch_request_has_no_params() {
        let config = PhaseConfig::default_get();
        let request = DirectoryRequest::fetch(&config, &service());

        assert_eq!(request.path, "/v2/keys/services/nova:default/orders");
        assert!(request.params.is_empty());
        assert_eq!(request.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_watch_request_params() {
        let config = PhaseConfig::default_watch();

        let request = DirectoryRequest::watch(&config, &service(), None);
        assert_eq!(request.param("wait"), Some("true"));
        assert_eq!(request.param("recursive"), Some("true"));
        assert_eq!(request.param("waitIndex"), None);

        let request = DirectoryRequest::watch(&config, &service(), Some(WaitIndex(42)));
        assert_eq!(request.param("waitIndex"), Some("42"));

        let request = DirectoryRequest::watch(&config, &service(), Some(WaitIndex(0)));
        assert_eq!(request.param("waitIndex"), None);
    }
}
