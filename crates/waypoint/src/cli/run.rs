use anyhow::Result;
use clap::Parser;
use console::style;
use tracing::info;

use waypoint::Waypoint;

use super::{init_tracing, load_config};

/// Run discovery agents.
#[derive(Parser)]
pub struct RunCommand {
    /// Configuration file path.
    #[arg(short, long, default_value = "waypoint.toml")]
    pub config: String,

    /// Service to discover (overrides config, repeatable).
    #[arg(short, long)]
    pub service: Vec<String>,

    /// Enable development mode (verbose logging).
    #[arg(long)]
    pub dev: bool,
}

impl RunCommand {
    /// Execute the run command.
    pub async fn execute(self) -> Result<()> {
        let config = load_config(&self.config)?;
        init_tracing(&config.logging, self.dev);

        println!();
        println!(
            "  {}  {} v{}",
            style("◆").bold(),
            style("WAYPOINT").bold().cyan(),
            env!("CARGO_PKG_VERSION")
        );
        println!();

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        info!("Loaded configuration from {} on {}", self.config, host);

        let directory = &config.discovery.watch;
        println!(
            "  {} Directory at {}",
            style("🧭").bold(),
            style(format!("http://{}:{}{}", directory.host, directory.port, directory.uri)).cyan()
        );

        let waypoint = Waypoint::builder()
            .config(config)
            .services(self.service)
            .build()
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        let names: Vec<_> = waypoint.services().iter().map(|s| s.as_str()).collect();
        println!(
            "  {} Discovering {} with {} worker(s) each",
            style("📡").bold(),
            style(names.join(", ")).cyan(),
            waypoint.config().agent.workers
        );
        if self.dev {
            println!("  {} Development mode enabled", style("🔧").bold());
        }
        println!();

        waypoint.run().await.map_err(|e| anyhow::anyhow!("{}", e))?;

        println!("\n  {} Goodbye!", style("👋").bold());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_defaults() {
        let cmd = RunCommand::parse_from(["run"]);
        assert_eq!(cmd.config, "waypoint.toml");
        assert!(cmd.service.is_empty());
        assert!(!cmd.dev);
    }
}
