//! Models command - list the models a vendor offers.

use anyhow::Result;
use clap::Args;
use gateway_core::ModelInfo;
use gateway_service::ModelGateway;
use secrecy::SecretString;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tabled::Tabled;

use crate::cli::load_hub;
use crate::output::{self, CommandResult, OutputFormat};

/// Arguments for the models command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    /// Configured model whose vendor is queried (all models when omitted)
    #[arg(short = 'M', long)]
    pub model: Option<String>,

    /// Query with this API key instead of the configured one
    #[arg(short = 'k', long, env = "GATEWAY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Vendor endpoint to use with --api-key
    #[arg(long, requires = "api_key")]
    pub endpoint: Option<String>,

    /// Filter models by id
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Bypass the catalog cache
    #[arg(long)]
    pub refresh: bool,
}

/// Model information for table display.
#[derive(Debug, Tabled, Serialize)]
pub struct ModelRow {
    #[tabled(rename = "Model ID")]
    pub id: String,
    #[tabled(rename = "Provider")]
    pub provider: String,
    #[tabled(rename = "Context")]
    pub context: String,
    #[tabled(rename = "Input $/1k")]
    pub input_price: String,
    #[tabled(rename = "Output $/1k")]
    pub output_price: String,
}

impl ModelRow {
    fn new(provider: &str, info: &ModelInfo) -> Self {
        let price = |p: Option<f64>| p.map_or_else(|| "-".to_string(), |p| format!("{p}"));
        Self {
            id: info.id.clone(),
            provider: provider.to_string(),
            context: info
                .context_length
                .map_or_else(|| "-".to_string(), |c| c.to_string()),
            input_price: price(info.input_price_per_1k),
            output_price: price(info.output_price_per_1k),
        }
    }
}

/// Listing for one configured model.
#[derive(Debug, Serialize)]
pub struct ModelListing {
    pub gateway: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<ModelInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs, config_path: &Path, json: bool) -> Result<()> {
    let format = OutputFormat::from_json_flag(json);
    let (_, hub) = load_hub(config_path).await?;

    let gateways: Vec<Arc<ModelGateway>> = match args.model {
        Some(ref name) => vec![hub.require(name)?],
        None => hub.names().iter().filter_map(|name| hub.get(name)).collect(),
    };

    if gateways.is_empty() {
        CommandResult::<()>::failure("No models are configured").print(format)?;
        return Ok(());
    }

    let spinner = (format == OutputFormat::Text).then(|| output::spinner("Fetching models..."));
    let mut listings = Vec::with_capacity(gateways.len());
    for gateway in &gateways {
        listings.push(fetch(gateway, &args).await);
    }
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match format {
        OutputFormat::Json => CommandResult::success(listings).print(format)?,
        OutputFormat::Text => {
            let mut rows = Vec::new();
            for listing in &listings {
                if let Some(ref error) = listing.error {
                    output::error(&format!("{}: {}", listing.gateway, error));
                }
                rows.extend(listing.models.iter().map(|m| ModelRow::new(&listing.provider, m)));
            }
            rows.sort_by(|a, b| a.provider.cmp(&b.provider).then_with(|| a.id.cmp(&b.id)));
            rows.dedup_by(|a, b| a.provider == b.provider && a.id == b.id);

            if rows.is_empty() {
                output::warning("No models found matching the criteria");
            } else {
                output::success(&format!("Found {} models", rows.len()));
                println!();
                output::table(&rows);
            }
        }
    }

    Ok(())
}

async fn fetch(gateway: &ModelGateway, args: &ModelsArgs) -> ModelListing {
    if args.refresh {
        gateway.invalidate_models();
    }

    let result = match args.api_key {
        Some(ref key) => {
            gateway
                .list_models_with_api_key(&SecretString::new(key.clone()), args.endpoint.as_deref())
                .await
        }
        None => gateway.list_models().await,
    };

    let (mut models, error) = match result {
        Ok(models) => (models, None),
        Err(e) => (Vec::new(), Some(e.to_string())),
    };

    if let Some(ref filter) = args.filter {
        let filter = filter.to_lowercase();
        models.retain(|m| m.id.to_lowercase().contains(&filter));
    }

    ModelListing {
        gateway: gateway.name().to_string(),
        provider: gateway.provider().to_string(),
        models,
        error,
    }
}
