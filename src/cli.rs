//! CLI argument definitions using clap.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gateway_config::{ConfigLoader, GatewayConfig};
use gateway_service::GatewayHub;
use std::path::{Path, PathBuf};

use crate::commands;

/// LLM Gateway - one interface over many LLM vendors
#[derive(Parser, Debug)]
#[command(name = "llm-gateway")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Gateway configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "gateway.yaml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the models a configured vendor offers
    Models(commands::models::ModelsArgs),

    /// Validate a configuration file
    Validate(commands::validate::ValidateArgs),

    /// Send a chat completion request
    Chat(commands::chat::ChatArgs),

    /// Estimate the cost of a request
    Cost(commands::cost::CostArgs),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Models(args) => commands::models::execute(args, &self.config, self.json).await,
            Commands::Validate(args) => commands::validate::execute(args, &self.config, self.json).await,
            Commands::Chat(args) => commands::chat::execute(args, &self.config, self.json).await,
            Commands::Cost(args) => commands::cost::execute(args, &self.config, self.json).await,
        }
    }
}

/// Load a configuration file and build every enabled gateway.
pub async fn load_hub(path: &Path) -> Result<(GatewayConfig, GatewayHub)> {
    let config = ConfigLoader::new()
        .with_file(path)
        .load()
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;
    let hub = GatewayHub::from_config(&config);
    Ok((config, hub))
}
