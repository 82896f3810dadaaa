//! Waypoint agent fleet.
//!
//! Wires the discovery agents of a process to their collaborators:
//! - Shared membership store (in-memory or PostgreSQL)
//! - HTTP directory client
//! - Connection registry receiving membership changes
//! - Tokio scheduler for retries and watch loops

use std::sync::Arc;

use tokio::sync::broadcast;

use waypoint_core::config::{StoreBackend, WaypointConfig};
use waypoint_core::error::{Result, WaypointError};
use waypoint_core::{AgentId, DirectoryTransport, MembershipStore, ServiceName};
use waypoint_runtime::{
    AgentContext, ConnectionRegistry, DiscoveryAgent, HttpDirectoryTransport, InMemoryStore,
    MembershipEvent, PgMembershipStore, TokioScheduler,
};

/// Prelude module for common imports.
pub mod prelude {
    pub use waypoint_core::config::WaypointConfig;
    pub use waypoint_core::error::{Result, WaypointError};
    pub use waypoint_core::{Endpoint, MembershipSet, ServiceName};
    pub use waypoint_runtime::{ConnectionRegistry, MembershipEvent};

    pub use crate::{Waypoint, WaypointBuilder};
}

/// The discovery agents of one process.
pub struct Waypoint {
    config: WaypointConfig,
    node_id: AgentId,
    services: Vec<ServiceName>,
    store: Option<Arc<dyn MembershipStore>>,
    transport: Arc<dyn DirectoryTransport>,
    registry: Arc<ConnectionRegistry>,
    scheduler: TokioScheduler,
    agents: Vec<Arc<DiscoveryAgent>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Waypoint {
    /// Create a new builder for configuring Waypoint.
    pub fn builder() -> WaypointBuilder {
        WaypointBuilder::new()
    }

    /// Id of this process, recorded as lock holder in shared stores.
    pub fn node_id(&self) -> AgentId {
        self.node_id
    }

    /// Get the configuration.
    pub fn config(&self) -> &WaypointConfig {
        &self.config
    }

    /// Services this process discovers.
    pub fn services(&self) -> &[ServiceName] {
        &self.services
    }

    /// Live endpoint table fed by the agents.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.registry.clone()
    }

    /// Running agents.
    pub fn agents(&self) -> &[Arc<DiscoveryAgent>] {
        &self.agents
    }

    /// Create the agents and start them in the background.
    ///
    /// Each service gets `agent.workers` competing agents sharing the store.
    pub async fn start(&mut self) -> Result<()> {
        if !self.agents.is_empty() {
            return Ok(());
        }

        let store = match self.store.clone() {
            Some(store) => store,
            None => {
                let store = self.connect_store().await?;
                self.store = Some(store.clone());
                store
            }
        };

        let context = AgentContext {
            store,
            transport: self.transport.clone(),
            sink: self.registry.clone(),
            scheduler: Arc::new(self.scheduler.clone()),
        };

        for service in &self.services {
            for _ in 0..self.config.agent.workers {
                let agent = DiscoveryAgent::new(
                    service.clone(),
                    self.config.discovery.clone(),
                    context.clone(),
                );

                let starting = agent.clone();
                tokio::spawn(async move {
                    if let Err(e) = starting.start().await {
                        tracing::error!(
                            agent = %starting.id(),
                            service = %starting.service(),
                            error = %e,
                            "Agent failed to start"
                        );
                    }
                });

                self.agents.push(agent);
            }
        }

        tracing::info!(
            services = self.services.len(),
            agents = self.agents.len(),
            "Discovery agents started"
        );
        Ok(())
    }

    /// Stop every agent and drop pending retries.
    pub fn stop(&self) {
        for agent in &self.agents {
            agent.stop();
        }
        self.scheduler.cancel_all();
    }

    /// Start the agents and run until Ctrl-C or [`shutdown`](Self::shutdown).
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(node_id = %self.node_id, "Waypoint starting");

        let mut events = self.registry.subscribe();
        let logger = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => log_event(&event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Membership log lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.start().await?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("Received shutdown notification");
            }
        }

        self.stop();
        logger.abort();

        tracing::info!("Waypoint stopped");
        Ok(())
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    async fn connect_store(&self) -> Result<Arc<dyn MembershipStore>> {
        match self.config.store.backend {
            StoreBackend::Memory => {
                tracing::debug!("Using in-memory membership store");
                Ok(Arc::new(InMemoryStore::from_config(&self.config.store)))
            }
            StoreBackend::Postgres => {
                let store = PgMembershipStore::connect(&self.config.store, self.node_id).await?;
                store.ensure_schema().await?;
                tracing::info!("Connected to membership store");
                Ok(Arc::new(store))
            }
        }
    }
}

fn log_event(event: &MembershipEvent) {
    match event {
        MembershipEvent::Populated { service, members } => {
            tracing::info!(service = %service, endpoints = members.len(), "Membership loaded");
        }
        MembershipEvent::Offline { service, members } => {
            for key in members.keys() {
                tracing::info!(service = %service, endpoint = key, "Endpoint offline");
            }
        }
        MembershipEvent::Online { service, members } => {
            for key in members.keys() {
                tracing::info!(service = %service, endpoint = key, "Endpoint online");
            }
        }
    }
}

/// Builder for configuring the Waypoint runtime.
pub struct WaypointBuilder {
    config: Option<WaypointConfig>,
    services: Vec<String>,
    store: Option<Arc<dyn MembershipStore>>,
    transport: Option<Arc<dyn DirectoryTransport>>,
}

impl WaypointBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            services: Vec::new(),
            store: None,
            transport: None,
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: WaypointConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Discover these services instead of the configured ones.
    pub fn services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services = services.into_iter().map(Into::into).collect();
        self
    }

    /// Use an existing store instead of the configured backend.
    pub fn store(mut self, store: Arc<dyn MembershipStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom directory client.
    pub fn transport(mut self, transport: Arc<dyn DirectoryTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the Waypoint runtime.
    pub fn build(self) -> Result<Waypoint> {
        let mut config = self
            .config
            .ok_or_else(|| WaypointError::Config("Configuration is required".to_string()))?;

        if !self.services.is_empty() {
            config.agent.services = self.services;
        }
        config.validate()?;

        if config.agent.services.is_empty() {
            return Err(WaypointError::Config(
                "No services to discover; set agent.services".to_string(),
            ));
        }

        let mut services = Vec::with_capacity(config.agent.services.len());
        for name in &config.agent.services {
            let service = ServiceName::new(name.as_str())?;
            if !services.contains(&service) {
                services.push(service);
            }
        }

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HttpDirectoryTransport::new()));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Waypoint {
            config,
            node_id: AgentId::new(),
            services,
            store: self.store,
            transport,
            registry: Arc::new(ConnectionRegistry::new()),
            scheduler: TokioScheduler::new(),
            agents: Vec::new(),
            shutdown_tx,
        })
    }
}

impl Default for WaypointBuilder {
    fn default() -> Self {
        Self::new()
    }
}
