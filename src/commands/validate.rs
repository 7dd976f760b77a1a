//! Validate command - validate configuration files.

use anyhow::Result;
use clap::Args;
use gateway_config::{ConfigError, ConfigLoader, GatewayConfig};
use gateway_service::GatewayHub;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::output::{self, CommandResult, OutputFormat};

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration file to validate (defaults to --config)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Treat warnings as failures
    #[arg(long)]
    pub strict: bool,

    /// Probe every enabled model's API key with a minimal call
    #[arg(long)]
    pub probe: bool,
}

/// Validation result.
#[derive(Debug, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub file: String,
    pub warnings: Vec<ValidationMessage>,
    pub errors: Vec<ValidationMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub probes: Vec<ProbeResult>,
}

/// Validation message.
#[derive(Debug, Serialize)]
pub struct ValidationMessage {
    pub level: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ValidationMessage {
    fn error(message: impl Into<String>, path: Option<String>) -> Self {
        Self {
            level: "error".to_string(),
            message: message.into(),
            path,
        }
    }

    fn warning(message: impl Into<String>, path: Option<String>) -> Self {
        Self {
            level: "warning".to_string(),
            message: message.into(),
            path,
        }
    }
}

/// Outcome of probing one model's credentials.
#[derive(Debug, Serialize)]
pub struct ProbeResult {
    pub model: String,
    pub provider: String,
    pub valid: bool,
}

/// Execute the validate command.
pub async fn execute(args: ValidateArgs, config_path: &Path, json: bool) -> Result<()> {
    let format = OutputFormat::from_json_flag(json);
    let file = args.file.clone().unwrap_or_else(|| config_path.to_path_buf());

    let mut result = ValidationResult {
        valid: true,
        file: file.display().to_string(),
        warnings: Vec::new(),
        errors: Vec::new(),
        probes: Vec::new(),
    };

    match ConfigLoader::new().with_file(&file).load().await {
        Ok(config) => {
            check_config(&config, &mut result, |var| std::env::var(var).ok());
            if args.probe {
                result.probes = probe(&config).await;
                for probe in result.probes.iter().filter(|p| !p.valid) {
                    result.errors.push(ValidationMessage::error(
                        format!("API key for '{}' was rejected or unreachable", probe.model),
                        Some(format!("models.{}", probe.model)),
                    ));
                }
            }
        }
        Err(ConfigError::Validation(problems)) => {
            result
                .errors
                .extend(problems.into_iter().map(|p| ValidationMessage::error(p, None)));
        }
        Err(e) => {
            result
                .errors
                .push(ValidationMessage::error(format!("Failed to load configuration: {e}"), None));
        }
    }

    result.valid = result.errors.is_empty() && !(args.strict && !result.warnings.is_empty());
    print_result(&result, format)
}

/// Warnings for a configuration that loaded and validated.
fn check_config(config: &GatewayConfig, result: &mut ValidationResult, lookup: impl Fn(&str) -> Option<String>) {
    if config.enabled_models().next().is_none() {
        result
            .warnings
            .push(ValidationMessage::warning("No models are enabled", Some("models".to_string())));
    }

    for entry in config.enabled_models() {
        let path = Some(format!("models.{}", entry.name));
        match (&entry.api_key, &entry.api_key_env) {
            (Some(_), _) => {}
            (None, Some(var)) if lookup(var).is_none() => {
                result.warnings.push(ValidationMessage::warning(
                    format!("Environment variable '{var}' for model '{}' is not set", entry.name),
                    path,
                ));
            }
            (None, Some(_)) => {}
            (None, None) => {
                result.warnings.push(ValidationMessage::warning(
                    format!("Model '{}' has no API key configured", entry.name),
                    path,
                ));
            }
        }
    }

    if config.proxy.enabled {
        if let Some(server) = config.active_proxy() {
            if server.trust_all_certs {
                result.warnings.push(ValidationMessage::warning(
                    "Proxy accepts any TLS certificate",
                    Some("proxy.server.trust_all_certs".to_string()),
                ));
            }
        }
    }
}

async fn probe(config: &GatewayConfig) -> Vec<ProbeResult> {
    let hub = GatewayHub::from_config(config);
    let spinner = output::spinner("Probing API keys...");
    let mut probes = Vec::with_capacity(hub.len());
    for name in hub.names() {
        if let Some(gateway) = hub.get(&name) {
            probes.push(ProbeResult {
                provider: gateway.provider().to_string(),
                valid: gateway.validate_api_key().await,
                model: name,
            });
        }
    }
    spinner.finish_and_clear();
    probes
}

/// Print the validation result.
fn print_result(result: &ValidationResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let cmd_result = if result.valid {
                CommandResult::success(result)
            } else {
                CommandResult::failure_with(result, "Validation failed")
            };
            cmd_result.print(format)?;
        }
        OutputFormat::Text => {
            if result.valid {
                output::success(&format!("Configuration file is valid: {}", result.file));
            } else {
                output::error(&format!("Configuration file is invalid: {}", result.file));
            }

            if !result.probes.is_empty() {
                output::section("API keys");
                for probe in &result.probes {
                    output::status(&format!("{} ({})", probe.model, probe.provider), probe.valid);
                }
            }

            print_messages("Errors", &result.errors, output::error);
            print_messages("Warnings", &result.warnings, output::warning);

            let total_issues = result.errors.len() + result.warnings.len();
            if total_issues > 0 {
                println!(
                    "\nFound {} error(s) and {} warning(s)",
                    result.errors.len(),
                    result.warnings.len()
                );
            }
        }
    }

    Ok(())
}

fn print_messages(title: &str, messages: &[ValidationMessage], print: fn(&str)) {
    if messages.is_empty() {
        return;
    }
    output::section(title);
    for message in messages {
        match message.path {
            Some(ref path) => print(&format!("[{path}] {}", message.message)),
            None => print(&message.message),
        }
    }
}
