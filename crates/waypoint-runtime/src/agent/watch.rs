use std::sync::Arc;
use std::time::Duration;

use waypoint_core::{
    parse_snapshot, BoxFuture, DirectoryRequest, MembershipDiff, MembershipSet, Phase, Result,
    WaypointError,
};

use super::DiscoveryAgent;

/// Which branch a watch attempt took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// This agent won the watch lock and started the loop.
    Owner,
    /// The previous owner stopped heartbeating; this agent took over.
    TookOver,
    /// A live owner exists; `watch` will run again after the loop time.
    Rescheduled,
}

/// Whether a watch owner whose last heartbeat is `age` old is presumed dead.
///
/// A missing heartbeat counts as infinitely old. Ages are compared at
/// millisecond precision and the owner is stale only once its heartbeat is
/// strictly older than `stale_after`.
pub fn is_watch_stale(age: Option<chrono::Duration>, stale_after: Duration) -> bool {
    let Some(age) = age else {
        return true;
    };
    let limit_ms = i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX);
    age.num_milliseconds() > limit_ms
}

impl DiscoveryAgent {
    /// Contend for the watch of the service.
    ///
    /// The watch lock holder starts the long-poll loop. Other agents check
    /// the owner's heartbeat and take over if it has gone stale, otherwise
    /// they check again after the loop time.
    pub fn watch(self: &Arc<Self>) -> BoxFuture<'static, Result<WatchOutcome>> {
        let agent = self.clone();
        Box::pin(async move { agent.contend_for_watch().await })
    }

    async fn contend_for_watch(self: Arc<Self>) -> Result<WatchOutcome> {
        if self.is_stopped() {
            return Err(WaypointError::Shutdown);
        }

        // The heartbeat is written before the loop is queued so a competitor
        // never sees a fresh owner without one.
        if self.store.try_acquire_watch_lock(&self.service).await? {
            self.store.set_watch_heartbeat(&self.service).await?;
            tracing::info!(agent = %self.id, service = %self.service, "Became watch owner");
            self.spawn_watching();
            return Ok(WatchOutcome::Owner);
        }

        let age = self.store.watch_heartbeat_age(&self.service).await?;
        if is_watch_stale(age, self.config.watch.stale_after()) {
            self.store.set_watch_heartbeat(&self.service).await?;
            tracing::warn!(
                agent = %self.id,
                service = %self.service,
                heartbeat_age_ms = ?age.map(|age| age.num_milliseconds()),
                "Watch owner went silent, taking over"
            );
            self.spawn_watching();
            return Ok(WatchOutcome::TookOver);
        }

        self.reschedule(Phase::Watch);
        Ok(WatchOutcome::Rescheduled)
    }

    fn spawn_watching(self: &Arc<Self>) {
        let name = format!("watch:{}", self.service);
        self.scheduler
            .run_workflow(&name, Box::pin(self.clone().watching()));
    }

    /// Long-poll loop. Runs until the agent is stopped.
    ///
    /// Each iteration records a heartbeat, waits for a change and applies
    /// it. Timeouts and empty answers start the next iteration right away;
    /// an undecodable snapshot is skipped; other failures pause the loop
    /// for the watch loop time.
    pub async fn watching(self: Arc<Self>) -> Result<()> {
        let mut shutdown = self.shutdown_rx.clone();
        tracing::debug!(agent = %self.id, service = %self.service, "Watch loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                result = self.watch_once() => result,
                _ = shutdown.changed() => break,
            };

            match result {
                Ok(Some(diff)) if !diff.is_empty() => {
                    tracing::info!(
                        agent = %self.id,
                        service = %self.service,
                        offline = diff.offline.len(),
                        online = diff.add_online.len(),
                        "Membership changed"
                    );
                }
                Ok(_) => {}
                Err(e) if e.is_timeout() => {
                    tracing::trace!(service = %self.service, "Watch timed out, polling again");
                }
                Err(e @ WaypointError::MalformedDirectory(_)) => {
                    tracing::warn!(service = %self.service, "Ignoring watch response: {}", e);
                }
                Err(e) => {
                    tracing::warn!(
                        agent = %self.id,
                        service = %self.service,
                        error = %e,
                        "Watch iteration failed"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.watch.loop_time()) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        tracing::debug!(agent = %self.id, service = %self.service, "Watch loop stopped");
        Ok(())
    }

    /// One heartbeat and long-poll. `None` when the directory answered without a body.
    async fn watch_once(&self) -> Result<Option<MembershipDiff>> {
        self.store.set_watch_heartbeat(&self.service).await?;

        let request = DirectoryRequest::watch(&self.config.watch, &self.service, self.wait_index());
        let Some(raw) = self.transport.fetch(request).await? else {
            return Ok(None);
        };

        let members = parse_snapshot(&raw)?;
        self.update(&members).await.map(Some)
    }

    /// Reconcile the cached membership with `members`.
    ///
    /// The sink hears about endpoints that went away and endpoints that
    /// appeared, then the cache is replaced. A service with nothing cached
    /// is treated as empty.
    pub async fn update(&self, members: &MembershipSet) -> Result<MembershipDiff> {
        let old = self
            .store
            .get_membership(&self.service)
            .await?
            .unwrap_or_default();
        let diff = MembershipDiff::between(&old, members);

        if !diff.offline.is_empty() {
            self.sink.remove_endpoints(&self.service, &diff.offline).await?;
        }
        if !diff.add_online.is_empty() {
            self.sink.add_endpoints(&self.service, &diff.add_online).await?;
        }

        self.store.set_membership(&self.service, members).await?;
        Ok(diff)
    }
}
