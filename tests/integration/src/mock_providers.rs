//! Mock LLM vendors for integration testing
//!
//! Provides wiremock-based mock servers that speak the OpenAI, Anthropic and
//! Gemini wire formats.

use crate::fixtures::*;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EVENT_STREAM: &str = "text/event-stream";

/// Render `data:` frames followed by the `[DONE]` sentinel
pub fn sse_body(frames: &[Value]) -> String {
    let mut body = String::new();
    for frame in frames {
        body.push_str(&format!("data: {frame}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// Render named events the way Anthropic does
pub fn named_sse_body(frames: &[Value]) -> String {
    let mut body = String::new();
    for frame in frames {
        let event = frame["type"].as_str().unwrap_or("message");
        body.push_str(&format!("event: {event}\ndata: {frame}\n\n"));
    }
    body
}

fn event_stream(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, EVENT_STREAM)
}

/// Number of requests a mock server received
pub async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map_or(0, |requests| requests.len())
}

/// Body of the `index`th request a mock server received
pub async fn request_body(server: &MockServer, index: usize) -> Value {
    let requests = server.received_requests().await.unwrap_or_default();
    serde_json::from_slice(&requests[index].body).unwrap_or(Value::Null)
}

/// Mock OpenAI API server
pub struct MockOpenAI {
    pub server: MockServer,
}

impl MockOpenAI {
    /// Create a new mock OpenAI server
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Endpoint to configure adapters with
    pub fn endpoint(&self) -> String {
        format!("{}/v1", self.server.uri())
    }

    /// Get the number of calls made to the mock
    pub async fn calls(&self) -> usize {
        request_count(&self.server).await
    }

    /// Setup a successful chat completion response
    pub async fn mock_chat_completion(&self, model: &str, response_content: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_chat_response(model, response_content)))
            .mount(&self.server)
            .await;
    }

    /// Setup a chat completion that returns after a delay
    pub async fn mock_chat_completion_delayed(&self, model: &str, response_content: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(openai_chat_response(model, response_content))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Setup a completion that asks for a tool call
    pub async fn mock_tool_call(&self, model: &str, tool: &str, arguments: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_tool_call_response(model, tool, arguments)))
            .mount(&self.server)
            .await;
    }

    /// Setup a completion with neither text nor tool calls
    pub async fn mock_empty_completion(&self, model: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_chat_response(model, "")))
            .mount(&self.server)
            .await;
    }

    /// Setup a rate limit error response
    pub async fn mock_rate_limit(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(openai_error_response("rate_limit_exceeded", "Rate limit exceeded")),
            )
            .mount(&self.server)
            .await;
    }

    /// Setup a server error response
    pub async fn mock_server_error(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(openai_error_response("server_error", "Internal server error")),
            )
            .mount(&self.server)
            .await;
    }

    /// Setup an authentication error response
    pub async fn mock_auth_error(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(openai_error_response("invalid_api_key", "Incorrect API key provided")),
            )
            .mount(&self.server)
            .await;
    }

    /// Setup a validation error response
    pub async fn mock_bad_request(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(openai_error_response("invalid_request_error", "temperature out of range")),
            )
            .mount(&self.server)
            .await;
    }

    /// Setup a models list response
    pub async fn mock_models_list(&self, ids: &[&str]) {
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_models_response(ids)))
            .mount(&self.server)
            .await;
    }

    /// Setup a streaming response
    pub async fn mock_streaming_response(&self, model: &str, chunks: &[&str]) {
        self.mock_streaming_delayed(model, chunks, Duration::ZERO).await;
    }

    /// Setup a streaming response whose headers arrive after a delay
    pub async fn mock_streaming_delayed(&self, model: &str, chunks: &[&str], delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(event_stream(openai_stream_body(model, chunks)).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Setup a stream that fails `fail_count` times with 503 and then
    /// succeeds
    pub async fn mock_flaky_stream(&self, model: &str, fail_count: u64, chunks: &[&str]) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_json(openai_error_response("overloaded", "Try again")))
            .up_to_n_times(fail_count)
            .mount(&self.server)
            .await;
        self.mock_streaming_response(model, chunks).await;
    }

    /// Setup a response that fails `fail_count` times then succeeds
    pub async fn mock_flaky_endpoint(&self, model: &str, fail_count: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(fail_count)
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_chat_response(model, "Success after retries")))
            .mount(&self.server)
            .await;
    }

    /// Setup a stream whose frames are not JSON
    pub async fn mock_streaming_garbage(&self) {
        let body = "data: {not json\n\ndata: <html>bad gateway</html>\n\ndata: [DONE]\n\n".to_string();
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(event_stream(body))
            .mount(&self.server)
            .await;
    }

    /// Setup a stream that finishes without any content
    pub async fn mock_streaming_empty(&self, model: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(event_stream(openai_stream_body(model, &[])))
            .mount(&self.server)
            .await;
    }
}

/// Mock Anthropic API server
pub struct MockAnthropic {
    pub server: MockServer,
}

impl MockAnthropic {
    /// Create a new mock Anthropic server
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Endpoint to configure adapters with
    pub fn endpoint(&self) -> String {
        format!("{}/v1", self.server.uri())
    }

    /// Get the number of calls made to the mock
    pub async fn calls(&self) -> usize {
        request_count(&self.server).await
    }

    /// Setup a successful messages response
    pub async fn mock_messages(&self, model: &str, response_content: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_messages_response(model, response_content)))
            .mount(&self.server)
            .await;
    }

    /// Setup a streaming messages response
    pub async fn mock_streaming_response(&self, chunks: &[&str]) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(event_stream(named_sse_body(&anthropic_stream_frames(chunks))))
            .mount(&self.server)
            .await;
    }

    /// Setup a stream that reports an error event after some content
    pub async fn mock_stream_error_event(&self, chunk: &str) {
        let mut frames = anthropic_stream_frames(&[chunk]);
        frames.truncate(2);
        frames.push(json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}));
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(event_stream(named_sse_body(&frames)))
            .mount(&self.server)
            .await;
    }

    /// Setup an overloaded response
    pub async fn mock_overloaded(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(
                ResponseTemplate::new(529)
                    .set_body_json(anthropic_error_response("overloaded_error", "Overloaded")),
            )
            .mount(&self.server)
            .await;
    }

    /// Setup a models list response
    pub async fn mock_models_list(&self, ids: &[&str]) {
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_models_response(ids)))
            .mount(&self.server)
            .await;
    }
}

/// Mock Gemini API server
pub struct MockGemini {
    pub server: MockServer,
}

impl MockGemini {
    /// Create a new mock Gemini server
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Endpoint to configure adapters with
    pub fn endpoint(&self) -> String {
        format!("{}/v1beta", self.server.uri())
    }

    /// Get the number of calls made to the mock
    pub async fn calls(&self) -> usize {
        request_count(&self.server).await
    }

    /// Setup a successful generateContent response
    pub async fn mock_generate(&self, model: &str, response_content: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/{model}:generateContent")))
            .and(header("x-goog-api-key", "sk-test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_response(response_content, "STOP")))
            .mount(&self.server)
            .await;
    }

    /// Setup a response blocked by safety filters
    pub async fn mock_safety_block(&self, model: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/{model}:generateContent")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"finishReason": "SAFETY", "index": 0}],
                "usageMetadata": {"promptTokenCount": 6, "candidatesTokenCount": 0, "totalTokenCount": 6}
            })))
            .mount(&self.server)
            .await;
    }

    /// Setup a 200 response carrying an error body
    pub async fn mock_error_body(&self, model: &str) {
        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/{model}:generateContent")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
            })))
            .mount(&self.server)
            .await;
    }

    /// Setup a streamGenerateContent response
    pub async fn mock_streaming_response(&self, model: &str, chunks: &[&str]) {
        self.mock_streaming_delayed(model, chunks, Duration::ZERO).await;
    }

    /// Setup a streamGenerateContent response that starts after a delay
    pub async fn mock_streaming_delayed(&self, model: &str, chunks: &[&str], delay: Duration) {
        let mut frames: Vec<Value> = chunks
            .iter()
            .map(|chunk| gemini_stream_frame(chunk, None))
            .collect();
        frames.push(gemini_stream_frame("", Some("STOP")));
        let body: String = frames.iter().map(|f| format!("data: {f}\n\n")).collect();

        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/{model}:streamGenerateContent")))
            .and(query_param("alt", "sse"))
            .respond_with(event_stream(body).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Setup a models list response
    pub async fn mock_models_list(&self, ids: &[&str]) {
        Mock::given(method("GET"))
            .and(path("/v1beta/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_models_response(ids)))
            .mount(&self.server)
            .await;
    }
}
