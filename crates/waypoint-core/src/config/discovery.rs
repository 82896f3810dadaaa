use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Slack added to the watch timeout before a watch owner is considered dead.
pub const WATCH_STALE_SLACK: Duration = Duration::from_millis(10);

/// Discovery configuration, one block per phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Bootstrap fetch settings.
    #[serde(default = "PhaseConfig::default_get")]
    pub get: PhaseConfig,

    /// Long-poll watch settings.
    #[serde(default = "PhaseConfig::default_watch")]
    pub watch: PhaseConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            get: PhaseConfig::default_get(),
            watch: PhaseConfig::default_watch(),
        }
    }
}

/// Settings for talking to the directory service during one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Directory service host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Directory service port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base path of the service registrations.
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Registration protocol segment (e.g. "nova").
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Registration namespace segment.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Request timeout in seconds.
    pub timeout: u64,

    /// Retry interval in milliseconds.
    pub loop_time: u64,
}

impl PhaseConfig {
    fn with_timing(timeout: u64, loop_time: u64) -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            uri: default_uri(),
            protocol: default_protocol(),
            namespace: default_namespace(),
            timeout,
            loop_time,
        }
    }

    /// Defaults for the `get` phase.
    pub fn default_get() -> Self {
        Self::with_timing(3, 1000)
    }

    /// Defaults for the `watch` phase.
    pub fn default_watch() -> Self {
        Self::with_timing(30, 5000)
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Delay before a rescheduled attempt.
    pub fn loop_time(&self) -> Duration {
        Duration::from_millis(self.loop_time)
    }

    /// Heartbeat age past which a watch owner is presumed dead.
    pub fn stale_after(&self) -> Duration {
        self.timeout() + WATCH_STALE_SLACK
    }

    /// Directory path for a service: `<uri>/<protocol>:<namespace>/<service>`.
    pub fn directory_path(&self, service: &str) -> String {
        format!(
            "{}/{}:{}/{}",
            self.uri.trim_end_matches('/'),
            self.protocol,
            self.namespace,
            service
        )
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    2379
}

fn default_uri() -> String {
    "/v2/keys/services".to_string()
}

fn default_protocol() -> String {
    "nova".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}
