use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WaypointError};

/// Name of a logical backend service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceName(String);

impl ServiceName {
    /// Create a service name, rejecting blank input.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(WaypointError::InvalidArgument(
                "service name must not be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One backend instance of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host or IP address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Wire protocol.
    pub protocol: String,
    /// Registration namespace.
    pub namespace: String,
    /// Service the endpoint registered under.
    pub service_name: String,
    /// Status reported by the registry.
    pub status: i64,
    /// Load-balancing weight.
    pub weight: i64,
}

impl Endpoint {
    /// Membership key, `host:port`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Endpoints of one service keyed by `host:port`.
///
/// Keys are always derived from the endpoint itself, so the map cannot
/// drift out of sync with its values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Endpoint>",
    into = "BTreeMap<String, Endpoint>"
)]
pub struct MembershipSet {
    endpoints: BTreeMap<String, Endpoint>,
}

impl MembershipSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an endpoint, replacing any previous one at the same address.
    pub fn insert(&mut self, endpoint: Endpoint) -> Option<Endpoint> {
        self.endpoints.insert(endpoint.key(), endpoint)
    }

    /// Look up an endpoint by key.
    pub fn get(&self, key: &str) -> Option<&Endpoint> {
        self.endpoints.get(key)
    }

    /// Whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.endpoints.contains_key(key)
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the set has no endpoints.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Iterate over endpoint keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// Iterate over endpoints in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    /// Endpoints of `self` whose keys are absent from `other`.
    pub fn difference(&self, other: &MembershipSet) -> MembershipSet {
        self.iter()
            .filter(|endpoint| !other.contains_key(&endpoint.key()))
            .cloned()
            .collect()
    }
}

impl FromIterator<Endpoint> for MembershipSet {
    fn from_iter<I: IntoIterator<Item = Endpoint>>(iter: I) -> Self {
        let mut set = MembershipSet::new();
        for endpoint in iter {
            set.insert(endpoint);
        }
        set
    }
}

impl From<BTreeMap<String, Endpoint>> for MembershipSet {
    fn from(map: BTreeMap<String, Endpoint>) -> Self {
        // Stored keys are not trusted; re-key from the endpoints.
        map.into_values().collect()
    }
}

impl From<MembershipSet> for BTreeMap<String, Endpoint> {
    fn from(set: MembershipSet) -> Self {
        set.endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str, port: u16) -> Endpoint {
        Endpoint {
            host: host.to_string(),
            port,
            protocol: "nova".to_string(),
            namespace: "default".to_string(),
            service_name: "orders".to_string(),
            status: 1,
            weight: 100,
        }
    }

    #[test]
    fn test_service_name_rejects_blank() {
        assert!(ServiceName::new("orders").is_ok());
        assert!(ServiceName::new("").is_err());
        assert!(ServiceName::new("   ").is_err());
    }

    #[test]
    fn test_endpoint_key() {
        assert_eq!(endpoint("10.0.0.1", 8050).key(), "10.0.0.1:8050");
    }

    #[test]
    fn test_membership_keys_follow_endpoints() {
        let set: MembershipSet = vec![endpoint("10.0.0.2", 80), endpoint("10.0.0.1", 80)]
            .into_iter()
            .collect();

        assert_eq!(set.len(), 2);
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["10.0.0.1:80", "10.0.0.2:80"]);
        assert_eq!(set.get("10.0.0.2:80").map(|e| e.port), Some(80));
    }

    #[test]
    fn test_insert_replaces_same_address() {
        let mut set = MembershipSet::new();
        set.insert(endpoint("10.0.0.1", 80));

        let mut heavier = endpoint("10.0.0.1", 80);
        heavier.weight = 200;
        let previous = set.insert(heavier);

        assert_eq!(previous.map(|e| e.weight), Some(100));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("10.0.0.1:80").map(|e| e.weight), Some(200));
    }

    #[test]
    fn test_serializes_as_map() {
        let set: MembershipSet = std::iter::once(endpoint("10.0.0.1", 80)).collect();
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["10.0.0.1:80"]["weight"], 100);

        let back: MembershipSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }
}
