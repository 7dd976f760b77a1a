//! Vendor adapter integration tests
//!
//! Request transformation, response parsing, streaming and error mapping of
//! each adapter against a mock vendor.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use futures::StreamExt;
use gateway_core::{
    FinishReason, GatewayError, ProtocolFault, ProviderAdapter, ProviderKind, StreamChunk,
};
use gateway_providers::create_adapter;
use secrecy::SecretString;
use std::sync::Arc;

fn adapter(provider: ProviderKind, model: &str, endpoint: &str) -> Arc<dyn ProviderAdapter> {
    init_tracing();
    create_adapter(mock_config(provider, model, endpoint)).unwrap()
}

async fn collect(adapter: &dyn ProviderAdapter, text: &str) -> Vec<Result<StreamChunk, GatewayError>> {
    adapter
        .generate_stream(&simple_request(text))
        .await
        .unwrap()
        .collect()
        .await
}

fn text_of(chunks: &[Result<StreamChunk, GatewayError>]) -> String {
    chunks
        .iter()
        .filter_map(|c| c.as_ref().ok().and_then(|c| c.delta.clone()))
        .collect()
}

#[tokio::test]
async fn test_openai_generate() {
    let mock = MockOpenAI::new().await;
    mock.mock_chat_completion("gpt-4o", "Hello there").await;

    let adapter = adapter(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint());
    let response = adapter.generate(&simple_request("Hi")).await.unwrap();

    assert_eq!(response.content, "Hello there");
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.usage.input_tokens, 12);
    assert_eq!(response.usage.output_tokens, 7);

    let body = request_body(&mock.server, 0).await;
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["max_tokens"], 100);
}

#[tokio::test]
async fn test_openai_compatible_vendor_uses_same_wire_format() {
    let mock = MockOpenAI::new().await;
    mock.mock_chat_completion("deepseek-chat", "Compatible").await;

    let adapter = adapter(ProviderKind::DeepSeek, "deepseek-chat", &mock.endpoint());
    let response = adapter.generate(&simple_request("Hi")).await.unwrap();
    assert_eq!(response.content, "Compatible");
    assert_eq!(adapter.kind(), ProviderKind::DeepSeek);
}

#[tokio::test]
async fn test_openai_tool_call() {
    let mock = MockOpenAI::new().await;
    mock.mock_tool_call("gpt-4o", "get_weather", r#"{"city":"Paris"}"#).await;

    let adapter = adapter(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint());
    let response = adapter.generate(&simple_request("Weather?")).await.unwrap();

    assert_eq!(response.finish_reason, FinishReason::ToolCalls);
    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "get_weather");
    assert_eq!(response.tool_calls[0].parsed_arguments()["city"], "Paris");
}

#[tokio::test]
async fn test_openai_error_mapping() {
    let cases: [(&str, fn(&GatewayError) -> bool); 4] = [
        ("auth", |e| matches!(e, GatewayError::Configuration { .. })),
        ("rate", |e| matches!(e, GatewayError::RateLimit { .. })),
        ("server", |e| matches!(e, GatewayError::TransientNetwork { status_code: Some(500), .. })),
        ("bad", |e| matches!(e, GatewayError::InvalidRequest { status_code: Some(400), .. })),
    ];

    for (case, expected) in cases {
        let mock = MockOpenAI::new().await;
        match case {
            "auth" => mock.mock_auth_error().await,
            "rate" => mock.mock_rate_limit().await,
            "server" => mock.mock_server_error().await,
            _ => mock.mock_bad_request().await,
        }
        let adapter = adapter(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint());
        let err = adapter.generate(&simple_request("Hi")).await.unwrap_err();
        assert!(expected(&err), "{case}: unexpected error {err:?}");
        assert_eq!(mock.calls().await, 1, "adapters never retry on their own");
    }
}

#[tokio::test]
async fn test_openai_empty_completion_is_protocol_error() {
    let mock = MockOpenAI::new().await;
    mock.mock_empty_completion("gpt-4o").await;

    let adapter = adapter(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint());
    let err = adapter.generate(&simple_request("Hi")).await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::VendorProtocol {
            fault: ProtocolFault::NoContent,
            ..
        }
    ));
}

#[tokio::test]
async fn test_openai_stream() {
    let mock = MockOpenAI::new().await;
    mock.mock_streaming_response("gpt-4o", &["Hel", "lo"]).await;

    let adapter = adapter(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint());
    let chunks = collect(adapter.as_ref(), "Hi").await;

    assert_eq!(text_of(&chunks), "Hello");
    let last = chunks.last().unwrap().as_ref().unwrap();
    assert_eq!(last.finish_reason, Some(FinishReason::Stop));
    assert_eq!(last.usage.unwrap().output_tokens, 2);

    let body = request_body(&mock.server, 0).await;
    assert_eq!(body["stream"], true);
}

#[tokio::test]
async fn test_openai_unreadable_stream_is_malformed() {
    let mock = MockOpenAI::new().await;
    mock.mock_streaming_garbage().await;

    let adapter = adapter(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint());
    let chunks = collect(adapter.as_ref(), "Hi").await;

    let err = chunks.iter().find_map(|c| c.as_ref().err()).unwrap();
    assert!(matches!(
        err,
        GatewayError::VendorProtocol { fault: ProtocolFault::Malformed, .. }
    ));
    assert!(text_of(&chunks).is_empty());
}

#[tokio::test]
async fn test_anthropic_generate() {
    let mock = MockAnthropic::new().await;
    mock.mock_messages("claude-3-5-sonnet-20241022", "Bonjour").await;

    let adapter = adapter(ProviderKind::Anthropic, "claude-3-5-sonnet-20241022", &mock.endpoint());
    let response = adapter
        .generate(&tagged_request("Hi", "user-1", "support"))
        .await
        .unwrap();

    assert_eq!(response.content, "Bonjour");
    assert_eq!(response.usage.input_tokens, 11);

    let body = request_body(&mock.server, 0).await;
    assert_eq!(body["system"], "You are terse.");
    assert_eq!(body["max_tokens"], 50);
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_anthropic_stream() {
    let mock = MockAnthropic::new().await;
    mock.mock_streaming_response(&["Bon", "jour"]).await;

    let adapter = adapter(ProviderKind::Anthropic, "claude-3-5-haiku-20241022", &mock.endpoint());
    let chunks = collect(adapter.as_ref(), "Hi").await;

    assert_eq!(text_of(&chunks), "Bonjour");
    let last = chunks.last().unwrap().as_ref().unwrap();
    assert_eq!(last.finish_reason, Some(FinishReason::Stop));
    let usage = last.usage.unwrap();
    assert_eq!((usage.input_tokens, usage.output_tokens), (9, 4));
}

#[tokio::test]
async fn test_anthropic_stream_error_event() {
    let mock = MockAnthropic::new().await;
    mock.mock_stream_error_event("partial").await;

    let adapter = adapter(ProviderKind::Anthropic, "claude-3-5-haiku-20241022", &mock.endpoint());
    let chunks = collect(adapter.as_ref(), "Hi").await;

    let err = chunks.iter().find_map(|c| c.as_ref().err()).unwrap();
    assert!(matches!(err, GatewayError::TransientNetwork { .. }));
}

#[tokio::test]
async fn test_anthropic_overloaded_is_transient() {
    let mock = MockAnthropic::new().await;
    mock.mock_overloaded().await;

    let adapter = adapter(ProviderKind::Anthropic, "claude-3-5-haiku-20241022", &mock.endpoint());
    let err = adapter.generate(&simple_request("Hi")).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_gemini_generate() {
    let mock = MockGemini::new().await;
    mock.mock_generate("gemini-1.5-pro", "Hola").await;

    let adapter = adapter(ProviderKind::Gemini, "gemini-1.5-pro", &mock.endpoint());
    let response = adapter.generate(&simple_request("Hi")).await.unwrap();

    assert_eq!(response.content, "Hola");
    assert_eq!(response.usage.total_tokens, 9);

    let body = request_body(&mock.server, 0).await;
    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(body["contents"][0]["parts"][0]["text"], "Hi");
}

#[tokio::test]
async fn test_gemini_safety_block_is_not_an_error() {
    let mock = MockGemini::new().await;
    mock.mock_safety_block("gemini-1.5-flash").await;

    let adapter = adapter(ProviderKind::Gemini, "gemini-1.5-flash", &mock.endpoint());
    let response = adapter.generate(&simple_request("Hi")).await.unwrap();
    assert_eq!(response.finish_reason, FinishReason::ContentFilter);
    assert!(response.content.is_empty());
}

#[tokio::test]
async fn test_gemini_error_body_with_ok_status() {
    let mock = MockGemini::new().await;
    mock.mock_error_body("gemini-1.5-flash").await;

    let adapter = adapter(ProviderKind::Gemini, "gemini-1.5-flash", &mock.endpoint());
    let err = adapter.generate(&simple_request("Hi")).await.unwrap_err();
    assert!(matches!(err, GatewayError::VendorProtocol { .. } | GatewayError::RateLimit { .. }));
}

#[tokio::test]
async fn test_gemini_stream() {
    let mock = MockGemini::new().await;
    mock.mock_streaming_response("gemini-1.5-pro", &["Ho", "la"]).await;

    let adapter = adapter(ProviderKind::Gemini, "gemini-1.5-pro", &mock.endpoint());
    let chunks = collect(adapter.as_ref(), "Hi").await;

    assert_eq!(text_of(&chunks), "Hola");
    let last = chunks.last().unwrap().as_ref().unwrap();
    assert_eq!(last.finish_reason, Some(FinishReason::Stop));
}

#[tokio::test]
async fn test_model_catalogs() {
    let openai = MockOpenAI::new().await;
    openai.mock_models_list(&["gpt-4o", "gpt-4o-mini"]).await;
    let anthropic = MockAnthropic::new().await;
    anthropic.mock_models_list(&["claude-3-5-haiku-20241022"]).await;
    let gemini = MockGemini::new().await;
    gemini.mock_models_list(&["gemini-1.5-pro"]).await;

    let models = adapter(ProviderKind::OpenAi, "gpt-4o", &openai.endpoint())
        .list_models()
        .await
        .unwrap();
    assert_eq!(models.len(), 2);

    let models = adapter(ProviderKind::Anthropic, "claude", &anthropic.endpoint())
        .list_models()
        .await
        .unwrap();
    assert_eq!(models[0].id, "claude-3-5-haiku-20241022");

    let models = adapter(ProviderKind::Gemini, "gemini-1.5-pro", &gemini.endpoint())
        .list_models()
        .await
        .unwrap();
    assert_eq!(models[0].id, "gemini-1.5-pro");
    assert_eq!(models[0].context_length, Some(1_048_576));
}

#[tokio::test]
async fn test_list_models_with_explicit_key_and_endpoint() {
    let mock = MockOpenAI::new().await;
    mock.mock_models_list(&["grok-beta"]).await;

    let adapter = adapter(ProviderKind::Grok, "grok-beta", "http://127.0.0.1:9");
    let models = adapter
        .list_models_with_api_key(&SecretString::new("other-key".into()), Some(&mock.endpoint()))
        .await
        .unwrap();
    assert_eq!(models[0].id, "grok-beta");

    let requests = mock.server.received_requests().await.unwrap();
    let auth = requests[0].headers.get("authorization").unwrap();
    assert_eq!(auth.to_str().unwrap(), "Bearer other-key");
}
