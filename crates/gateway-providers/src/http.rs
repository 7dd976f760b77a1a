//! Shared HTTP helpers: client construction and vendor error translation.

use gateway_core::{GatewayError, GatewayResult, ProviderAdapterConfig, ProviderKind};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Fail fast when the configured API key is blank.
pub fn require_api_key(config: &ProviderAdapterConfig) -> GatewayResult<()> {
    if config.has_api_key() {
        Ok(())
    } else {
        Err(GatewayError::configuration(format!(
            "API key for {} model '{}' is blank",
            config.provider, config.model
        )))
    }
}

/// Build the vendor HTTP client for an adapter.
///
/// No overall timeout is set on the client: unary calls apply the adapter
/// timeout per request, streams are bounded by the pipeline deadline.
pub fn build_client(config: &ProviderAdapterConfig) -> GatewayResult<Client> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(100);

    if let Some(proxy) = &config.proxy {
        let url = proxy.url();
        debug!(provider = %config.provider, proxy = %url, "Using outbound proxy");
        let proxy_setting = reqwest::Proxy::all(&url).map_err(|e| {
            GatewayError::configuration(format!("invalid proxy '{url}': {e}"))
        })?;
        builder = builder.proxy(proxy_setting);
        if proxy.trust_all_certs {
            warn!(
                provider = %config.provider,
                "TLS certificate verification disabled for proxied client"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    builder
        .build()
        .map_err(|e| GatewayError::configuration(format!("Failed to create HTTP client: {e}")))
}

/// Resolve the base URL or report a configuration error.
pub fn base_url(config: &ProviderAdapterConfig) -> GatewayResult<String> {
    config.base_url().ok_or_else(|| {
        GatewayError::configuration(format!(
            "{} requires an explicit endpoint",
            config.provider
        ))
    })
}

/// Translate a transport-level failure.
pub fn map_transport_error(provider: ProviderKind, timeout: Duration, error: &reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::timeout(timeout)
    } else if error.is_decode() {
        GatewayError::protocol(
            provider.as_str(),
            gateway_core::ProtocolFault::Malformed,
            format!("undecodable response: {error}"),
        )
    } else {
        GatewayError::transient(
            provider.as_str(),
            format!("request failed: {error}"),
            error.status().map(|s| s.as_u16()),
        )
    }
}

/// Translate a non-success HTTP status into the gateway taxonomy.
#[must_use]
pub fn error_from_status(
    provider: ProviderKind,
    status: u16,
    message: String,
    retry_after: Option<Duration>,
) -> GatewayError {
    let name = provider.as_str();
    match status {
        401 | 403 => GatewayError::configuration(format!("{name} rejected the credentials: {message}")),
        404 => GatewayError::configuration(format!("{name} model or endpoint not found: {message}")),
        408 => GatewayError::timeout(Duration::ZERO),
        429 => GatewayError::rate_limit(name, message, retry_after),
        500..=599 => GatewayError::transient(name, message, Some(status)),
        _ => GatewayError::invalid_request(format!("{name}: {message}"), Some(status)),
    }
}

/// Pull a human readable message out of a vendor error body.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ".."}` and
/// `{"message": ..}`; anything else is returned truncated.
#[must_use]
pub fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let candidate = value
            .pointer("/error/message")
            .or_else(|| value.get("error").filter(|v| v.is_string()))
            .or_else(|| value.get("message"))
            .or_else(|| value.pointer("/0/error/message"));
        if let Some(Value::String(message)) = candidate {
            return message.clone();
        }
    }
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// Parse a `Retry-After` header given in seconds.
#[must_use]
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Pass successful responses through; translate failures.
pub async fn check_response(provider: ProviderKind, response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let wait = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    let message = extract_error_message(&body);
    warn!(
        provider = %provider,
        status = status.as_u16(),
        message = %message,
        "Vendor returned error status"
    );
    Err(error_from_status(provider, status.as_u16(), message, wait))
}
