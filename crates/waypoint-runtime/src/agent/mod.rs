//! Per-service discovery agent.
//!
//! An agent bootstraps the membership of one service (`get`) and then keeps
//! it current by long-polling the directory (`watch`). Any number of agents
//! may run for the same service; the store's locks make sure only one of
//! them talks to the directory at a time.

mod bootstrap;
mod watch;

#[cfg(test)]
mod harness;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch as signal;

use waypoint_core::config::DiscoveryConfig;
use waypoint_core::{
    AgentId, ConnectionSink, DirectoryTransport, JobId, MembershipStore, Phase, Result, Scheduler,
    ServiceName, WaitIndex,
};

pub use bootstrap::GetOutcome;
pub use watch::{is_watch_stale, WatchOutcome};

/// Collaborators shared by every agent of a process.
#[derive(Clone)]
pub struct AgentContext {
    /// Membership cache and locks.
    pub store: Arc<dyn MembershipStore>,
    /// Directory client.
    pub transport: Arc<dyn DirectoryTransport>,
    /// Receiver of membership changes.
    pub sink: Arc<dyn ConnectionSink>,
    /// Runs workflows and retry timers.
    pub scheduler: Arc<dyn Scheduler>,
}

/// Discovery agent for a single service.
pub struct DiscoveryAgent {
    id: AgentId,
    service: ServiceName,
    config: DiscoveryConfig,
    store: Arc<dyn MembershipStore>,
    transport: Arc<dyn DirectoryTransport>,
    sink: Arc<dyn ConnectionSink>,
    scheduler: Arc<dyn Scheduler>,
    wait_index: Mutex<Option<WaitIndex>>,
    shutdown_tx: signal::Sender<bool>,
    shutdown_rx: signal::Receiver<bool>,
}

impl DiscoveryAgent {
    /// Create an agent with a fresh id.
    pub fn new(service: ServiceName, config: DiscoveryConfig, context: AgentContext) -> Arc<Self> {
        Self::with_id(AgentId::new(), service, config, context)
    }

    /// Create an agent with a given id.
    pub fn with_id(
        id: AgentId,
        service: ServiceName,
        config: DiscoveryConfig,
        context: AgentContext,
    ) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = signal::channel(false);
        Arc::new(Self {
            id,
            service,
            config,
            store: context.store,
            transport: context.transport,
            sink: context.sink,
            scheduler: context.scheduler,
            wait_index: Mutex::new(None),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Get the agent id.
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Get the service this agent discovers.
    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    /// Timer id for one of this agent's phases.
    pub fn job_id(&self, phase: Phase) -> JobId {
        JobId::new(self.id, phase, &self.service)
    }

    /// Bootstrap the membership, then contend for the watch.
    ///
    /// A failed bootstrap is logged and does not prevent the watch; the
    /// watch owner repairs the membership on the next change.
    pub async fn start(self: &Arc<Self>) -> Result<WatchOutcome> {
        tracing::info!(agent = %self.id, service = %self.service, "Starting discovery agent");

        match self.get().await {
            Ok(outcome) => {
                tracing::debug!(agent = %self.id, service = %self.service, ?outcome, "Bootstrap finished")
            }
            Err(e) => {
                tracing::error!(agent = %self.id, service = %self.service, error = %e, "Bootstrap failed")
            }
        }

        self.watch().await
    }

    /// Stop the watch loop and drop pending retries.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        self.scheduler.cancel(&self.job_id(Phase::Get));
        self.scheduler.cancel(&self.job_id(Phase::Watch));
        tracing::info!(agent = %self.id, service = %self.service, "Discovery agent stopped");
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Set the change-log cursor sent with watch requests.
    // TODO: advance the cursor from the `modifiedIndex` of watch responses.
    pub fn resume_from(&self, index: WaitIndex) {
        *self
            .wait_index
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(index);
    }

    fn wait_index(&self) -> Option<WaitIndex> {
        *self
            .wait_index
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run a phase again after its configured loop time.
    fn reschedule(self: &Arc<Self>, phase: Phase) {
        if self.is_stopped() {
            return;
        }

        let delay: Duration = match phase {
            Phase::Get => self.config.get.loop_time(),
            Phase::Watch => self.config.watch.loop_time(),
        };
        let job_id = self.job_id(phase);
        tracing::debug!(
            agent = %self.id,
            service = %self.service,
            job_id = %job_id,
            delay_ms = delay.as_millis() as u64,
            "Rescheduling {}",
            phase
        );

        let agent = self.clone();
        let step: waypoint_core::BoxFuture<'static, ()> = match phase {
            Phase::Get => Box::pin(async move {
                if let Err(e) = agent.get().await {
                    tracing::error!(agent = %agent.id, service = %agent.service, error = %e, "Bootstrap retry failed");
                }
            }),
            Phase::Watch => Box::pin(async move {
                if let Err(e) = agent.watch().await {
                    tracing::error!(agent = %agent.id, service = %agent.service, error = %e, "Watch retry failed");
                }
            }),
        };
        self.scheduler.schedule_after(delay, job_id, step);
    }
}
