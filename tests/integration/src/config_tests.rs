//! Configuration-driven hub tests
//!
//! Gateways built from YAML and TOML files pointing at mock vendors.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use gateway_config::{ConfigFormat, ConfigLoader, GatewayConfig};
use gateway_core::{GatewayError, ProviderKind, ProxyKind};
use gateway_service::GatewayHub;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

fn parse(content: &str, format: ConfigFormat) -> GatewayConfig {
    init_tracing();
    ConfigLoader::new()
        .with_env(HashMap::new())
        .load_str(content, format)
        .unwrap()
}

fn yaml_for(openai: &str, anthropic: &str) -> String {
    format!(
        r"
models:
  - name: fast
    provider: openai
    model: gpt-4o-mini
    api_key: sk-test-key
    endpoint: {openai}
    timeout: 5s
  - name: careful
    provider: anthropic
    model: claude-3-5-sonnet-20241022
    api_key: sk-test-key
    endpoint: {anthropic}
  - name: parked
    provider: gemini
    model: gemini-1.5-pro
    api_key: sk-test-key
    enabled: false
retry:
  max_retries: 1
  base_delay: 10ms
  max_delay: 40ms
  jitter: 0.0
"
    )
}

#[tokio::test]
async fn test_hub_serves_configured_models() {
    let openai = MockOpenAI::new().await;
    openai.mock_chat_completion("gpt-4o-mini", "from openai").await;
    let anthropic = MockAnthropic::new().await;
    anthropic.mock_messages("claude-3-5-sonnet-20241022", "from anthropic").await;

    let config = parse(&yaml_for(&openai.endpoint(), &anthropic.endpoint()), ConfigFormat::Yaml);
    let hub = GatewayHub::from_config(&config);

    assert_eq!(hub.names(), vec!["careful".to_string(), "fast".to_string()]);
    assert!(hub.get("parked").is_none());

    let fast = hub.require("fast").unwrap();
    assert_eq!(fast.provider(), ProviderKind::OpenAi);
    assert_eq!(fast.config().timeout, Duration::from_secs(5));
    assert_eq!(fast.generate(&simple_request("Hi")).await.unwrap().content, "from openai");

    let careful = hub.require("careful").unwrap();
    assert_eq!(careful.generate(&simple_request("Hi")).await.unwrap().content, "from anthropic");

    let traces = wait_for_traces(hub.services().traces(), 2).await;
    assert_eq!(traces.len(), 2);
}

#[tokio::test]
async fn test_unknown_model_is_a_configuration_error() {
    let config = parse("models: []", ConfigFormat::Yaml);
    let hub = GatewayHub::from_config(&config);

    assert!(hub.is_empty());
    assert!(matches!(hub.require("missing"), Err(GatewayError::Configuration { .. })));
}

#[tokio::test]
async fn test_retry_settings_come_from_config() {
    let openai = MockOpenAI::new().await;
    openai.mock_server_error().await;
    let anthropic = MockAnthropic::new().await;

    let config = parse(&yaml_for(&openai.endpoint(), &anthropic.endpoint()), ConfigFormat::Yaml);
    let hub = GatewayHub::from_config(&config);

    let report = hub.require("fast").unwrap().generate_report(&simple_request("Hi")).await;
    assert!(report.result.is_err());
    assert_eq!(report.retries, 1);
    assert_eq!(openai.calls().await, 2);
}

#[tokio::test]
async fn test_missing_key_env_fails_without_calling_vendor() {
    let openai = MockOpenAI::new().await;
    openai.mock_chat_completion("gpt-4o", "unreachable").await;

    let content = format!(
        r"
models:
  - name: unkeyed
    provider: openai
    model: gpt-4o
    api_key_env: LLM_GATEWAY_TEST_KEY_THAT_IS_NEVER_SET
    endpoint: {}
",
        openai.endpoint()
    );
    let config = parse(&content, ConfigFormat::Yaml);
    let hub = GatewayHub::from_config(&config);

    let gateway = hub.require("unkeyed").unwrap();
    let err = gateway.generate(&simple_request("Hi")).await.unwrap_err();
    assert!(matches!(err, GatewayError::Configuration { .. }));
    assert!(!gateway.validate_api_key().await);
    assert_eq!(openai.calls().await, 0);
}

#[tokio::test]
async fn test_toml_file_loads_through_the_loader() {
    let gemini = MockGemini::new().await;
    gemini.mock_generate("gemini-1.5-flash", "from toml").await;

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
[[models]]
name = "gemini"
provider = "gemini"
model = "gemini-1.5-flash"
api_key = "sk-test-key"
endpoint = "{}"

[streaming]
heartbeat_interval = "1s"
"#,
        gemini.endpoint()
    )
    .unwrap();

    init_tracing();
    let config = ConfigLoader::new()
        .with_file(file.path())
        .with_env(HashMap::new())
        .load()
        .await
        .unwrap();
    assert_eq!(config.streaming.heartbeat_interval, Duration::from_secs(1));

    let hub = GatewayHub::from_config(&config);
    let gateway = hub.require("gemini").unwrap();
    assert_eq!(gateway.generate(&simple_request("Hi")).await.unwrap().content, "from toml");
}

#[tokio::test]
async fn test_proxy_toggle_rebuilds_gateways() {
    let content = r"
models:
  - name: a
    provider: openai
    model: gpt-4o
    api_key: sk-test-key
  - name: b
    provider: deepseek
    model: deepseek-chat
    api_key: sk-test-key
proxy:
  enabled: false
  server:
    host: 127.0.0.1
    port: 7890
    kind: http
";
    let config = parse(content, ConfigFormat::Yaml);
    let hub = GatewayHub::from_config(&config);
    assert!(!hub.proxy_enabled());
    assert!(hub.require("a").unwrap().config().proxy.is_none());

    let failures = hub.set_proxy_enabled(true);
    assert!(failures.is_empty());
    assert!(hub.proxy_enabled());
    for name in hub.names() {
        let gateway = hub.require(&name).unwrap();
        assert!(gateway.is_ready());
        let proxy = gateway.config().proxy.clone().unwrap();
        assert_eq!((proxy.port, proxy.kind), (7890, ProxyKind::Http));
    }

    let inserted = hub.insert("c", mock_config(ProviderKind::Grok, "grok-beta", "http://127.0.0.1:9/v1"));
    assert!(inserted.config().proxy.is_some());

    assert!(hub.set_proxy_enabled(false).is_empty());
    assert!(hub.require("c").unwrap().config().proxy.is_none());
}

#[test]
fn test_invalid_config_reports_every_problem() {
    let content = r"
models:
  - name: dup
    provider: openai
    model: gpt-4o
  - name: dup
    provider: azure_openai
    model: ''
proxy:
  enabled: true
";
    let err = ConfigLoader::new()
        .with_env(HashMap::new())
        .load_str(content, ConfigFormat::Yaml)
        .unwrap_err();
    assert_eq!(err.problems().len(), 4);
}
