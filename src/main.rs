//! # LLM Gateway
//!
//! Command-line front end for the multi-provider LLM gateway.
//!
//! ## Usage
//!
//! ```bash
//! # List the models a configured vendor offers
//! llm-gateway --config gateway.yaml models --model main
//!
//! # Validate a configuration file and probe every API key
//! llm-gateway validate --file gateway.yaml --probe
//!
//! # Stream a chat completion
//! llm-gateway chat --model main --message "Hello" --stream
//!
//! # Estimate the cost of a prompt
//! llm-gateway cost --model main --message "Hello" --max-tokens 200
//! ```

use anyhow::Result;
use clap::Parser;
use gateway_telemetry::{init_logging, LogFormat, LoggingConfig};

mod cli;
mod commands;
mod output;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&logging_config(cli.verbose, cli.json)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    cli.execute().await
}

/// Subscriber settings for a verbosity count. Without `-v` the level comes
/// from `GATEWAY_LOG_LEVEL`, falling back to warnings only.
fn logging_config(verbose: u8, json: bool) -> LoggingConfig {
    let level = match verbose {
        0 => std::env::var(gateway_config::ENV_LOG_LEVEL).unwrap_or_else(|_| "warn".to_string()),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let format = if json { LogFormat::Json } else { LogFormat::Compact };
    LoggingConfig::default().with_level(level).with_format(format)
}
