use std::collections::HashMap;

use tokio::sync::{broadcast, RwLock};

use waypoint_core::{BoxFuture, ConnectionSink, Endpoint, MembershipSet, Result, ServiceName};

/// Default capacity of the event channel.
const DEFAULT_EVENT_BUFFER: usize = 256;

/// A change to the live endpoint table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// The whole membership of a service was (re)loaded.
    Populated {
        service: ServiceName,
        members: MembershipSet,
    },
    /// Endpoints went away.
    Offline {
        service: ServiceName,
        members: MembershipSet,
    },
    /// Endpoints appeared.
    Online {
        service: ServiceName,
        members: MembershipSet,
    },
}

impl MembershipEvent {
    /// The service the event is about.
    pub fn service(&self) -> &ServiceName {
        match self {
            Self::Populated { service, .. }
            | Self::Offline { service, .. }
            | Self::Online { service, .. } => service,
        }
    }
}

/// Live endpoint table per service, fed by discovery agents.
///
/// Consumers read the current endpoints with [`endpoints`](Self::endpoints)
/// or follow changes through [`subscribe`](Self::subscribe).
pub struct ConnectionRegistry {
    services: RwLock<HashMap<ServiceName, MembershipSet>>,
    event_tx: broadcast::Sender<MembershipEvent>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_EVENT_BUFFER)
    }

    /// Create an empty registry with a given event buffer.
    pub fn with_buffer(buffer: usize) -> Self {
        let (event_tx, _) = broadcast::channel(buffer);
        Self {
            services: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    /// Subscribe to membership events.
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.event_tx.subscribe()
    }

    /// Current endpoints of a service, empty if unknown.
    pub async fn endpoints(&self, service: &ServiceName) -> Vec<Endpoint> {
        self.services
            .read()
            .await
            .get(service)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Services with at least one known endpoint.
    pub async fn services(&self) -> Vec<ServiceName> {
        let services = self.services.read().await;
        let mut names: Vec<_> = services
            .iter()
            .filter(|(_, members)| !members.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn publish(&self, event: MembershipEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionSink for ConnectionRegistry {
    fn populate<'a>(
        &'a self,
        service: &'a ServiceName,
        members: &'a MembershipSet,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.services
                .write()
                .await
                .insert(service.clone(), members.clone());

            tracing::debug!(service = %service, endpoints = members.len(), "Registry populated");
            self.publish(MembershipEvent::Populated {
                service: service.clone(),
                members: members.clone(),
            });
            Ok(())
        })
    }

    fn remove_endpoints<'a>(
        &'a self,
        service: &'a ServiceName,
        offline: &'a MembershipSet,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            {
                let mut services = self.services.write().await;
                if let Some(current) = services.get(service) {
                    let remaining = current.difference(offline);
                    services.insert(service.clone(), remaining);
                }
            }

            self.publish(MembershipEvent::Offline {
                service: service.clone(),
                members: offline.clone(),
            });
            Ok(())
        })
    }

    fn add_endpoints<'a>(
        &'a self,
        service: &'a ServiceName,
        online: &'a MembershipSet,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            {
                let mut services = self.services.write().await;
                let current = services.entry(service.clone()).or_default();
                for endpoint in online.iter() {
                    current.insert(endpoint.clone());
                }
            }

            self.publish(MembershipEvent::Online {
                service: service.clone(),
                members: online.clone(),
            });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::testing::endpoint;

    fn service() -> ServiceName {
        ServiceName::new("orders").unwrap()
    }

    fn members(hosts: &[&str]) -> MembershipSet {
        hosts.iter().map(|host| endpoint(host, 8000)).collect()
    }

    fn hosts(endpoints: &[Endpoint]) -> Vec<&str> {
        endpoints.iter().map(|e| e.host.as_str()).collect()
    }

    #[tokio::test]
    async fn test_populate_replaces_table() {
        let registry = ConnectionRegistry::new();

        registry
            .populate(&service(), &members(&["10.0.0.1", "10.0.0.2"]))
            .await
            .unwrap();
        registry
            .populate(&service(), &members(&["10.0.0.3"]))
            .await
            .unwrap();

        assert_eq!(hosts(&registry.endpoints(&service()).await), vec!["10.0.0.3"]);
        assert_eq!(registry.services().await, vec![service()]);
    }

    #[tokio::test]
    async fn test_incremental_changes() {
        let registry = ConnectionRegistry::new();
        registry
            .populate(&service(), &members(&["10.0.0.1", "10.0.0.2"]))
            .await
            .unwrap();

        registry
            .remove_endpoints(&service(), &members(&["10.0.0.1"]))
            .await
            .unwrap();
        registry
            .add_endpoints(&service(), &members(&["10.0.0.3"]))
            .await
            .unwrap();

        assert_eq!(
            hosts(&registry.endpoints(&service()).await),
            vec!["10.0.0.2", "10.0.0.3"]
        );
    }

    #[tokio::test]
    async fn test_unknown_service_is_empty() {
        let registry = ConnectionRegistry::new();
        assert!(registry.endpoints(&service()).await.is_empty());

        registry
            .remove_endpoints(&service(), &members(&["10.0.0.1"]))
            .await
            .unwrap();
        assert!(registry.services().await.is_empty());
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let registry = ConnectionRegistry::new();
        let mut events = registry.subscribe();

        registry
            .populate(&service(), &members(&["10.0.0.1"]))
            .await
            .unwrap();
        registry
            .add_endpoints(&service(), &members(&["10.0.0.2"]))
            .await
            .unwrap();
        registry
            .remove_endpoints(&service(), &members(&["10.0.0.1"]))
            .await
            .unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            MembershipEvent::Populated {
                service: service(),
                members: members(&["10.0.0.1"]),
            }
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            MembershipEvent::Online { .. }
        ));
        let offline = events.recv().await.unwrap();
        assert!(matches!(offline, MembershipEvent::Offline { .. }));
        assert_eq!(offline.service(), &service());
    }
}
