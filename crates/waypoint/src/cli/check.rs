use anyhow::Result;
use clap::Parser;
use console::style;

use waypoint_core::config::{PhaseConfig, WaypointConfig};

use super::load_config;

/// Validate a configuration file.
#[derive(Parser)]
pub struct CheckCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "waypoint.toml")]
    pub config: String,
}

impl CheckCommand {
    /// Execute the check command.
    pub async fn execute(self) -> Result<()> {
        let config = load_config(&self.config)?;
        config.validate()?;

        println!();
        println!("  {} {} is valid", style("✓").green().bold(), self.config);
        println!();
        for line in summary(&config) {
            println!("  {}", line);
        }
        println!();

        Ok(())
    }
}

fn summary(config: &WaypointConfig) -> Vec<String> {
    let services = if config.agent.services.is_empty() {
        "(none)".to_string()
    } else {
        config.agent.services.join(", ")
    };

    vec![
        format!("services: {}", services),
        format!("workers:  {}", config.agent.workers),
        format!("get:      {}", describe(&config.discovery.get)),
        format!("watch:    {}", describe(&config.discovery.watch)),
        format!("store:    {:?}", config.store.backend),
    ]
}

fn describe(phase: &PhaseConfig) -> String {
    format!(
        "{}:{}{}/{}:{} (timeout {}s, loop {}ms)",
        phase.host,
        phase.port,
        phase.uri,
        phase.protocol,
        phase.namespace,
        phase.timeout,
        phase.loop_time
    )
}
