use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shared membership store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which backing to use.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database connection URL (postgres backend only).
    #[serde(default)]
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Pool checkout timeout in seconds.
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_secs: u64,

    /// How long a fetch lock survives its holder.
    #[serde(default = "default_fetch_lock_ttl")]
    pub fetch_lock_ttl_secs: u64,

    /// How long a watch lock survives its holder. Unset means forever;
    /// stale owners are then only replaced through the heartbeat check.
    #[serde(default)]
    pub watch_lock_ttl_secs: Option<u64>,
}

impl StoreConfig {
    /// Fetch lock lease.
    pub fn fetch_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.fetch_lock_ttl_secs)
    }

    /// Watch lock lease, if it expires at all.
    pub fn watch_lock_ttl(&self) -> Option<Duration> {
        self.watch_lock_ttl_secs.map(Duration::from_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: String::new(),
            pool_size: default_pool_size(),
            pool_timeout_secs: default_pool_timeout(),
            fetch_lock_ttl_secs: default_fetch_lock_ttl(),
            watch_lock_ttl_secs: None,
        }
    }
}

fn default_pool_size() -> u32 {
    5
}

fn default_pool_timeout() -> u64 {
    30
}

fn default_fetch_lock_ttl() -> u64 {
    60
}

/// Membership store backing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store; workers in the same process share it.
    #[default]
    Memory,

    /// PostgreSQL tables shared by every process pointed at the database.
    Postgres,
}
