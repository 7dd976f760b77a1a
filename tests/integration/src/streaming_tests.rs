//! Streaming pipeline integration tests
//!
//! Merged event streams from real adapters: ordering, heartbeats, retry
//! before the first content delta, failures after it, and cancellation.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use futures::StreamExt;
use gateway_core::{FinishReason, ProviderKind, StreamEvent};
use gateway_telemetry::TraceOutcome;
use std::time::Duration;

fn without_heartbeats(events: Vec<StreamEvent>) -> Vec<StreamEvent> {
    events
        .into_iter()
        .filter(|e| !matches!(e, StreamEvent::Heartbeat))
        .collect()
}

#[tokio::test]
async fn test_stream_delivers_deltas_then_complete() {
    let mock = MockOpenAI::new().await;
    mock.mock_streaming_response("gpt-4o", &["He", "llo"]).await;

    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &ServiceOptions::default());
    let events: Vec<StreamEvent> = gateway.generate_stream(&simple_request("Hi")).unwrap().collect().await;
    let events = without_heartbeats(events);

    assert_eq!(events.len(), 3);
    assert_eq!(events[0].as_delta(), Some("He"));
    assert_eq!(events[1].as_delta(), Some("llo"));
    match &events[2] {
        StreamEvent::Complete(completion) => {
            assert_eq!(completion.content, "Hello");
            assert_eq!(completion.finish_reason, FinishReason::Stop);
            assert_eq!(completion.usage.input_tokens, 8);
        }
        other => panic!("expected completion, got {other:?}"),
    }

    let traces = wait_for_traces(gateway.services().traces(), 1).await;
    assert!(traces[0].streaming);
    assert!(traces[0].first_token_ms.is_some());
    assert!(matches!(traces[0].outcome, Some(TraceOutcome::Success(_))));
}

#[tokio::test]
async fn test_stream_retries_before_first_content() {
    let mock = MockOpenAI::new().await;
    mock.mock_flaky_stream("gpt-4o", 2, &["ok"]).await;

    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &ServiceOptions::default());
    let events = without_heartbeats(gateway.generate_stream(&simple_request("Hi")).unwrap().collect().await);

    assert_eq!(events[0].as_delta(), Some("ok"));
    assert!(matches!(events.last(), Some(StreamEvent::Complete(_))));
    assert_eq!(mock.calls().await, 3);
}

#[tokio::test]
async fn test_stream_fails_after_retries() {
    let mock = MockOpenAI::new().await;
    mock.mock_server_error().await;

    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &ServiceOptions::default());
    let events = without_heartbeats(gateway.generate_stream(&simple_request("Hi")).unwrap().collect().await);

    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Error(failure) => assert_eq!(failure.error_type, "transient_network_error"),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(mock.calls().await, 3);
}

#[tokio::test]
async fn test_stream_without_content_is_an_error() {
    let mock = MockOpenAI::new().await;
    mock.mock_streaming_empty("gpt-4o").await;

    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &ServiceOptions::default());
    let events = without_heartbeats(gateway.generate_stream(&simple_request("Hi")).unwrap().collect().await);

    match events.as_slice() {
        [StreamEvent::Error(failure)] => assert_eq!(failure.error_type, "vendor_protocol_error"),
        other => panic!("expected a single error, got {other:?}"),
    }
    assert_eq!(mock.calls().await, 3);
}

#[tokio::test]
async fn test_failure_after_content_is_not_retried() {
    let mock = MockAnthropic::new().await;
    mock.mock_stream_error_event("partial").await;

    let gateway = gateway(
        ProviderKind::Anthropic,
        "claude-3-5-haiku-20241022",
        &mock.endpoint(),
        &ServiceOptions::default(),
    );
    let events = without_heartbeats(gateway.generate_stream(&simple_request("Hi")).unwrap().collect().await);

    assert_eq!(events[0].as_delta(), Some("partial"));
    assert!(matches!(events.last(), Some(StreamEvent::Error(_))));
    assert_eq!(mock.calls().await, 1);
}

#[tokio::test]
async fn test_heartbeats_while_waiting_for_vendor() {
    let mock = MockGemini::new().await;
    mock.mock_streaming_delayed("gemini-1.5-flash", &["late"], Duration::from_millis(400))
        .await;

    let options = ServiceOptions {
        heartbeat_interval: Duration::from_millis(50),
        ..ServiceOptions::default()
    };
    let gateway = gateway(ProviderKind::Gemini, "gemini-1.5-flash", &mock.endpoint(), &options);
    let events: Vec<StreamEvent> = gateway.generate_stream(&simple_request("Hi")).unwrap().collect().await;

    let first_delta = events.iter().position(|e| e.as_delta().is_some()).unwrap();
    assert!(first_delta >= 1);
    assert!(events[..first_delta].iter().all(|e| matches!(e, StreamEvent::Heartbeat)));
    assert!(matches!(events.last(), Some(StreamEvent::Complete(_))));
}

#[tokio::test]
async fn test_cancel_before_first_content() {
    let mock = MockOpenAI::new().await;
    mock.mock_streaming_delayed("gpt-4o", &["never"], Duration::from_secs(5)).await;

    let options = ServiceOptions {
        heartbeat_interval: Duration::from_millis(20),
        ..ServiceOptions::default()
    };
    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &options);
    let mut stream = gateway.generate_stream(&simple_request("Hi")).unwrap();

    assert_eq!(stream.next().await, Some(StreamEvent::Heartbeat));
    stream.cancel();
    assert!(stream.is_finished());
    assert_eq!(stream.next().await, None);

    let traces = wait_for_traces(gateway.services().traces(), 1).await;
    assert_eq!(traces[0].outcome, Some(TraceOutcome::Cancelled));
}

#[tokio::test]
async fn test_dropping_stream_cancels_it() {
    let mock = MockOpenAI::new().await;
    mock.mock_streaming_delayed("gpt-4o", &["never"], Duration::from_secs(5)).await;

    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &ServiceOptions::default());
    drop(gateway.generate_stream(&simple_request("Hi")).unwrap());

    let traces = wait_for_traces(gateway.services().traces(), 1).await;
    assert_eq!(traces[0].outcome, Some(TraceOutcome::Cancelled));
}

#[tokio::test]
async fn test_stream_deadline() {
    let mock = MockOpenAI::new().await;
    mock.mock_streaming_delayed("gpt-4o", &["late"], Duration::from_secs(5)).await;

    let options = ServiceOptions {
        stream_timeout: Duration::from_millis(300),
        ..ServiceOptions::default()
    };
    let gateway = gateway(ProviderKind::OpenAi, "gpt-4o", &mock.endpoint(), &options);
    let events = without_heartbeats(gateway.generate_stream(&simple_request("Hi")).unwrap().collect().await);

    match events.as_slice() {
        [StreamEvent::Error(failure)] => assert_eq!(failure.error_type, "timeout_error"),
        other => panic!("expected a timeout, got {other:?}"),
    }
}
