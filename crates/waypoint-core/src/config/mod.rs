mod discovery;
mod logging;
mod store;

pub use discovery::{DiscoveryConfig, PhaseConfig, WATCH_STALE_SLACK};
pub use logging::{LogFormat, LoggingConfig};
pub use store::{StoreBackend, StoreConfig};

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, WaypointError};

/// Root configuration for Waypoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WaypointConfig {
    /// Which services to discover and how many workers per service.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Directory service settings per phase.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Shared membership store.
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WaypointConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| WaypointError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content)?;

        toml::from_str(&content)
            .map_err(|e| WaypointError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Reject settings the agents cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.workers == 0 {
            return Err(WaypointError::Config(
                "agent.workers must be at least 1".to_string(),
            ));
        }

        if let Some(name) = self.agent.services.iter().find(|s| s.trim().is_empty()) {
            return Err(WaypointError::Config(format!(
                "invalid service name {:?}",
                name
            )));
        }

        for (phase, config) in [("get", &self.discovery.get), ("watch", &self.discovery.watch)] {
            if config.host.is_empty() || config.port == 0 {
                return Err(WaypointError::Config(format!(
                    "discovery.{} needs a host and a non-zero port",
                    phase
                )));
            }
            if config.timeout == 0 || config.loop_time == 0 {
                return Err(WaypointError::Config(format!(
                    "discovery.{} timeout and loop_time must be non-zero",
                    phase
                )));
            }
        }

        if self.store.backend == StoreBackend::Postgres && self.store.url.is_empty() {
            return Err(WaypointError::Config(
                "store.url is required for the postgres backend".to_string(),
            ));
        }

        Ok(())
    }
}

/// Agent fleet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Service names to keep membership for.
    #[serde(default)]
    pub services: Vec<String>,

    /// Competing agents per service in this process.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    1
}

/// Substitute `${VAR}` references with environment values, leaving unknown ones intact.
fn substitute_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| WaypointError::Config(e.to_string()))?;

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => result = result.replace(&cap[0], &value),
            Err(_) => tracing::debug!("Config references unset variable {}", var_name),
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = WaypointConfig::default();
        assert!(config.agent.services.is_empty());
        assert_eq!(config.agent.workers, 1);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [agent]
            services = ["orders"]
        "#;

        let config = WaypointConfig::parse_toml(toml).unwrap();
        assert_eq!(config.agent.services, vec!["orders".to_string()]);
        assert_eq!(config.discovery.watch.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [agent]
            services = ["orders", "billing"]
            workers = 4

            [discovery.get]
            host = "10.0.0.5"
            port = 2379
            uri = "/v2/keys/service_chain"
            protocol = "nova"
            namespace = "com.example.service"
            timeout = 5
            loop_time = 500

            [discovery.watch]
            host = "10.0.0.5"
            port = 2379
            uri = "/v2/keys/service_chain"
            protocol = "nova"
            namespace = "com.example.service"
            timeout = 60
            loop_time = 2000

            [store]
            backend = "postgres"
            url = "postgres://localhost/waypoint"

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config = WaypointConfig::parse_toml(toml).unwrap();
        assert_eq!(config.agent.workers, 4);
        assert_eq!(config.discovery.get.namespace, "com.example.service");
        assert_eq!(config.discovery.watch.loop_time(), Duration::from_millis(2000));
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("WAYPOINT_TEST_ETCD_HOST", "etcd.test.local");

        let toml = r#"
            [discovery.get]
            host = "${WAYPOINT_TEST_ETCD_HOST}"
            timeout = 3
            loop_time = 1000
        "#;

        let config = WaypointConfig::parse_toml(toml).unwrap();
        assert_eq!(config.discovery.get.host, "etcd.test.local");

        std::env::remove_var("WAYPOINT_TEST_ETCD_HOST");
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = WaypointConfig::default();
        config.agent.services = vec!["".to_string()];
        assert!(matches!(config.validate(), Err(WaypointError::Config(_))));

        let mut config = WaypointConfig::default();
        config.discovery.watch.loop_time = 0;
        assert!(config.validate().is_err());

        let mut config = WaypointConfig::default();
        config.store.backend = StoreBackend::Postgres;
        assert!(config.validate().is_err());

        let mut config = WaypointConfig::default();
        config.agent.workers = 0;
        assert!(config.validate().is_err());
    }
}
