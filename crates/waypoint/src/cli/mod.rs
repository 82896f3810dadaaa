mod check;
mod fetch;
mod run;

pub use check::CheckCommand;
pub use fetch::FetchCommand;
pub use run::RunCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use waypoint_core::config::{LogFormat, LoggingConfig, WaypointConfig};

/// Waypoint - service discovery agent for etcd-style directories
#[derive(Parser)]
#[command(name = "waypoint")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run discovery agents for the configured services.
    Run(RunCommand),

    /// Validate a configuration file.
    Check(CheckCommand),

    /// Fetch a service's membership once and print it.
    Fetch(FetchCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run(cmd) => cmd.execute().await,
            Commands::Check(cmd) => cmd.execute().await,
            Commands::Fetch(cmd) => cmd.execute().await,
        }
    }
}

/// Load a configuration file, failing with a hint if it does not exist.
fn load_config(path: &str) -> Result<WaypointConfig> {
    if !std::path::Path::new(path).exists() {
        anyhow::bail!(
            "Configuration file not found: {}\nPass one with `-c <path>`.",
            path
        );
    }

    Ok(WaypointConfig::from_file(path)?)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig, dev: bool) {
    let level = if dev { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::parse_from([
            "waypoint",
            "run",
            "-c",
            "custom.toml",
            "--service",
            "orders",
            "--service",
            "billing",
            "--dev",
        ]);

        match cli.command {
            Commands::Run(cmd) => {
                assert_eq!(cmd.config, "custom.toml");
                assert_eq!(cmd.service, vec!["orders", "billing"]);
                assert!(cmd.dev);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_fetch_command() {
        let cli = Cli::parse_from(["waypoint", "fetch", "orders"]);

        match cli.command {
            Commands::Fetch(cmd) => {
                assert_eq!(cmd.service, "orders");
                assert_eq!(cmd.config, "waypoint.toml");
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/waypoint.toml").unwrap_err();
        assert!(err.to_string().contains("Configuration file not found"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [agent]
            services = ["orders"]
            workers = 2
            "#
        )
        .unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.agent.services, vec!["orders"]);
        assert_eq!(config.agent.workers, 2);
    }
}
