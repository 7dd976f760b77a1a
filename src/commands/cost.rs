//! Cost command - estimate what a request would cost.

use anyhow::Result;
use clap::Args;
use gateway_telemetry::CostEstimate;
use serde::Serialize;
use std::path::Path;

use crate::cli::load_hub;
use crate::commands::{build_request, read_message};
use crate::output::{self, CommandResult, OutputFormat};

/// Arguments for the cost command.
#[derive(Args, Debug)]
pub struct CostArgs {
    /// Prompt to price (if not provided, reads from stdin)
    #[arg(short, long)]
    pub message: Option<String>,

    /// Configured model to price against
    #[arg(short = 'M', long)]
    pub model: String,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Expected output tokens (defaults to the configured estimate)
    #[arg(long)]
    pub max_tokens: Option<u32>,
}

/// Cost estimate for output.
#[derive(Debug, Serialize)]
pub struct CostOutput {
    pub gateway: String,
    pub provider: String,
    pub model: String,
    #[serde(flatten)]
    pub estimate: CostEstimate,
}

/// Execute the cost command.
pub async fn execute(args: CostArgs, config_path: &Path, json: bool) -> Result<()> {
    let format = OutputFormat::from_json_flag(json);
    let (_, hub) = load_hub(config_path).await?;
    let gateway = hub.require(&args.model)?;

    let message = read_message(args.message.as_deref())?;
    let request = build_request(&message, args.system.as_deref(), None, args.max_tokens, None)?;

    let result = CostOutput {
        gateway: gateway.name().to_string(),
        provider: gateway.provider().to_string(),
        model: gateway.model(),
        estimate: gateway.estimate(&request),
    };

    match format {
        OutputFormat::Json => CommandResult::success(result).print(format)?,
        OutputFormat::Text => {
            output::section(&format!("Estimated cost for {} ({})", result.gateway, result.model));
            output::key_value("Provider", &result.provider);
            output::key_value("Input tokens", &result.estimate.input_tokens.to_string());
            output::key_value("Output tokens", &result.estimate.output_tokens.to_string());
            output::key_value("Cost (USD)", &output::format_amount(result.estimate.cost_usd, "USD"));
            if result.estimate.currency != "USD" {
                output::key_value(
                    "Cost",
                    &output::format_amount(result.estimate.amount, &result.estimate.currency),
                );
            }
        }
    }

    Ok(())
}
