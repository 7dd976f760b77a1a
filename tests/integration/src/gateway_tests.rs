//! Model gateway integration tests
//!
//! Retries, deadlines, credential checks, traces, catalogs and cost
//! estimation through `ModelGateway` in front of mock vendors.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use chrono::{Duration as ChronoDuration, Utc};
use gateway_core::{GatewayError, ProviderAdapterConfig, ProviderKind};
use gateway_service::ModelGateway;
use gateway_telemetry::{TraceOutcome, TraceQuery};
use pretty_assertions::assert_eq;
use std::time::Duration;

#[tokio::test]
async fn test_retries_until_success() {
    let mock = MockOpenAI::new().await;
    mock.mock_flaky_endpoint("gpt-4o", 2).await;

    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &ServiceOptions::default());
    let report = gateway.generate_report(&simple_request("Hi")).await;

    assert_eq!(report.result.unwrap().content, "Success after retries");
    assert_eq!(report.retries, 2);
    assert_eq!(mock.calls().await, 3);
}

#[tokio::test]
async fn test_gives_up_after_two_retries() {
    let mock = MockOpenAI::new().await;
    mock.mock_server_error().await;

    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &ServiceOptions::default());
    let err = gateway.generate(&simple_request("Hi")).await.unwrap_err();

    assert!(matches!(err, GatewayError::TransientNetwork { .. }));
    assert_eq!(mock.calls().await, 3);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let mock = MockOpenAI::new().await;
    mock.mock_rate_limit().await;

    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &ServiceOptions::default());
    let err = gateway.generate(&simple_request("Hi")).await.unwrap_err();

    assert!(matches!(err, GatewayError::RateLimit { .. }));
    assert_eq!(mock.calls().await, 3);
}

#[tokio::test]
async fn test_rejected_credentials_are_not_retried() {
    let mock = MockOpenAI::new().await;
    mock.mock_auth_error().await;

    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &ServiceOptions::default());
    let err = gateway.generate(&simple_request("Hi")).await.unwrap_err();

    assert!(matches!(err, GatewayError::Configuration { .. }));
    assert_eq!(mock.calls().await, 1);
    assert!(!gateway.validate_api_key().await);
}

#[tokio::test]
async fn test_blank_key_never_reaches_vendor() {
    let mock = MockOpenAI::new().await;
    mock.mock_chat_completion("gpt-4o", "unreachable").await;

    let config = ProviderAdapterConfig::new(ProviderKind::OpenAi, "gpt-4o", "  ").with_endpoint(mock.endpoint());
    let gateway = ModelGateway::new("blank", config, services(&ServiceOptions::default()));

    let err = gateway.generate(&simple_request("Hi")).await.unwrap_err();
    assert!(matches!(err, GatewayError::Configuration { .. }));
    assert!(gateway.generate_stream(&simple_request("Hi")).is_err());
    assert!(gateway.list_models().await.is_err());
    assert_eq!(mock.calls().await, 0);
}

#[tokio::test]
async fn test_protocol_quirk_is_retried() {
    let mock = MockGemini::new().await;
    mock.mock_error_body("gemini-1.5-flash").await;

    let gateway = gateway(ProviderKind::Gemini, "gemini-1.5-flash", &mock.endpoint(), &ServiceOptions::default());
    let report = gateway.generate_report(&simple_request("Hi")).await;

    assert!(report.result.is_err());
    assert_eq!(mock.calls().await, 3);
}

#[tokio::test]
async fn test_overall_deadline() {
    let mock = MockOpenAI::new().await;
    mock.mock_chat_completion_delayed("gpt-4o", "late", Duration::from_secs(3)).await;

    let options = ServiceOptions {
        generate_timeout: Duration::from_millis(300),
        ..ServiceOptions::default()
    };
    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &options);
    let err = gateway.generate(&simple_request("Hi")).await.unwrap_err();

    assert!(matches!(err, GatewayError::Timeout { .. }));
}

#[tokio::test]
async fn test_traces_and_usage_queries() {
    let mock = MockAnthropic::new().await;
    mock.mock_messages("claude-3-5-haiku-20241022", "Done").await;

    let gateway = gateway(
        ProviderKind::Anthropic,
        "claude-3-5-haiku-20241022",
        &mock.endpoint(),
        &ServiceOptions::default(),
    );
    gateway.generate(&tagged_request("one", "alice", "billing")).await.unwrap();
    gateway.generate(&tagged_request("two", "alice", "support")).await.unwrap();
    gateway.generate(&tagged_request("three", "bob", "support")).await.unwrap();

    let recorder = gateway.services().traces();
    let traces = wait_for_traces(recorder, 3).await;
    assert!(traces.iter().all(|t| matches!(t.outcome, Some(TraceOutcome::Success(_)))));
    assert!(traces.iter().all(|t| !t.streaming && t.duration_ms.is_some()));

    let window = TraceQuery::for_user("alice", Utc::now() - ChronoDuration::hours(1), Utc::now() + ChronoDuration::hours(1));
    let totals = recorder.usage_totals(&window).await.unwrap();
    assert_eq!(totals.calls, 2);
    assert_eq!(totals.succeeded, 2);
    assert_eq!(totals.usage.input_tokens, 22);

    let groups = recorder.group_by_business_tag(&TraceQuery::default()).await.unwrap();
    assert_eq!(groups["support"].calls, 2);
    assert_eq!(groups["billing"].calls, 1);
}

#[tokio::test]
async fn test_failed_call_is_traced() {
    let mock = MockOpenAI::new().await;
    mock.mock_auth_error().await;

    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &ServiceOptions::default());
    let _ = gateway.generate(&simple_request("Hi")).await;

    let traces = wait_for_traces(gateway.services().traces(), 1).await;
    match &traces[0].outcome {
        Some(TraceOutcome::Error(snapshot)) => assert_eq!(snapshot.error_type, "configuration_error"),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_model_catalog_is_cached() {
    let mock = MockOpenAI::new().await;
    mock.mock_models_list(&["gpt-4o", "o1-mini"]).await;

    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &ServiceOptions::default());
    let first = gateway.list_models().await.unwrap();
    let second = gateway.list_models().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(mock.calls().await, 1);

    gateway.invalidate_models();
    gateway.list_models().await.unwrap();
    assert_eq!(mock.calls().await, 2);
}

#[tokio::test]
async fn test_validate_api_key() {
    let mock = MockGemini::new().await;
    mock.mock_generate("gemini-1.5-flash", "pong").await;

    let gateway = gateway(ProviderKind::Gemini, "gemini-1.5-flash", &mock.endpoint(), &ServiceOptions::default());
    assert!(gateway.validate_api_key().await);
}

#[tokio::test]
async fn test_reinitialize_switches_endpoint() {
    let first = MockOpenAI::new().await;
    first.mock_chat_completion("gpt-4o", "from first").await;
    let second = MockOpenAI::new().await;
    second.mock_chat_completion("gpt-4o", "from second").await;

    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &first.endpoint(), &ServiceOptions::default());
    assert_eq!(gateway.generate(&simple_request("Hi")).await.unwrap().content, "from first");

    gateway
        .reinitialize(mock_config(ProviderKind::OpenAi, "gpt-4o", &second.endpoint()))
        .unwrap();
    assert_eq!(gateway.generate(&simple_request("Hi")).await.unwrap().content, "from second");
}

#[tokio::test]
async fn test_cost_estimate() {
    let gateway = gateway(
        ProviderKind::OpenAi,
        "gpt-4o-mini",
        "http://127.0.0.1:9/v1",
        &ServiceOptions::default(),
    );
    let request = simple_request("one two three four five six seven eight nine ten");

    let estimate = gateway.estimate(&request);
    assert_eq!(estimate.input_tokens, 13);
    assert_eq!(estimate.output_tokens, 100);
    assert!(estimate.cost_usd > 0.0);
    assert!((gateway.estimate_cost(&request) - estimate.amount).abs() < f64::EPSILON);
}
