use std::sync::Arc;

use waypoint_core::config::{DiscoveryConfig, PhaseConfig};
use waypoint_core::testing::{MockDirectory, RecordingSink};
use waypoint_core::{MembershipSet, MembershipStore, ServiceName};

use super::{AgentContext, DiscoveryAgent};
use crate::scheduler::TokioScheduler;
use crate::store::InMemoryStore;

/// Agents for `orders` wired to in-process doubles, with short loop times.
pub(crate) struct Harness {
    pub service: ServiceName,
    pub config: DiscoveryConfig,
    pub store: Arc<InMemoryStore>,
    pub directory: MockDirectory,
    pub sink: RecordingSink,
    pub scheduler: TokioScheduler,
}

impl Harness {
    pub fn new() -> Self {
        let mut get = PhaseConfig::default_get();
        get.timeout = 1;
        get.loop_time = 20;
        let mut watch = PhaseConfig::default_watch();
        watch.timeout = 1;
        watch.loop_time = 20;

        Self {
            service: ServiceName::new("orders").unwrap(),
            config: DiscoveryConfig { get, watch },
            store: Arc::new(InMemoryStore::default()),
            directory: MockDirectory::new(),
            sink: RecordingSink::new(),
            scheduler: TokioScheduler::new(),
        }
    }

    pub fn with_watch_loop_time(mut self, millis: u64) -> Self {
        self.config.watch.loop_time = millis;
        self
    }

    pub fn context(&self) -> AgentContext {
        AgentContext {
            store: self.store.clone(),
            transport: Arc::new(self.directory.clone()),
            sink: Arc::new(self.sink.clone()),
            scheduler: Arc::new(self.scheduler.clone()),
        }
    }

    pub fn agent(&self) -> Arc<DiscoveryAgent> {
        DiscoveryAgent::new(self.service.clone(), self.config.clone(), self.context())
    }

    pub async fn stored(&self) -> Option<MembershipSet> {
        self.store.get_membership(&self.service).await.unwrap()
    }
}
