use anyhow::{Context, Result};
use clap::Parser;

use waypoint_core::{
    parse_snapshot, DirectoryRequest, DirectoryTransport, MembershipSet, ServiceName,
    WaypointError,
};
use waypoint_runtime::HttpDirectoryTransport;

use super::load_config;

/// Read a service's directory once, bypassing the store and its locks.
#[derive(Parser)]
pub struct FetchCommand {
    /// Service name.
    pub service: String,

    /// Configuration file path.
    #[arg(short, long, default_value = "waypoint.toml")]
    pub config: String,
}

impl FetchCommand {
    /// Execute the fetch command.
    pub async fn execute(self) -> Result<()> {
        let config = load_config(&self.config)?;
        let service = ServiceName::new(self.service.as_str())?;

        let transport = HttpDirectoryTransport::new();
        let members = fetch_once(&transport, &config.discovery.get, &service).await?;

        let json = serde_json::to_string_pretty(&members)
            .context("Failed to encode membership")?;
        println!("{}", json);
        Ok(())
    }
}

async fn fetch_once(
    transport: &dyn DirectoryTransport,
    config: &waypoint_core::config::PhaseConfig,
    service: &ServiceName,
) -> waypoint_core::Result<MembershipSet> {
    let request = DirectoryRequest::fetch(config, service);
    let raw = transport.fetch(request).await?.ok_or_else(|| {
        WaypointError::MalformedDirectory(format!("Empty directory response for {}", service))
    })?;
    parse_snapshot(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::config::PhaseConfig;
    use waypoint_core::testing::{directory_snapshot, endpoint, MockDirectory, MockReply};

    #[tokio::test]
    async fn test_fetch_once() {
        let directory = MockDirectory::new();
        directory.on_fetch(
            "*/orders",
            MockReply::Snapshot(directory_snapshot("orders", &[endpoint("10.0.0.1", 8000)])),
        );

        let service = ServiceName::new("orders").unwrap();
        let members = fetch_once(&directory, &PhaseConfig::default_get(), &service)
            .await
            .unwrap();

        assert!(members.contains_key("10.0.0.1:8000"));
        directory.assert_called("/v2/keys/services/nova:default/orders");
    }

    #[tokio::test]
    async fn test_fetch_once_empty() {
        let directory = MockDirectory::new();
        directory.on_fetch("*/orders", MockReply::Empty);

        let service = ServiceName::new("orders").unwrap();
        let result = fetch_once(&directory, &PhaseConfig::default_get(), &service).await;
        assert!(matches!(result, Err(WaypointError::MalformedDirectory(_))));
    }
}
