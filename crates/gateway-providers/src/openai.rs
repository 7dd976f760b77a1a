//! OpenAI-compatible adapter.
//!
//! Serves every vendor that speaks the chat-completions wire format:
//! OpenAI, DeepSeek, Qwen (DashScope compatible mode), OpenRouter,
//! SiliconFlow, Grok and Ollama. The wire helpers are shared with the Azure
//! adapter.

use crate::http::{self, require_api_key};
use crate::tools::{self, OpenAiTool, OpenAiToolCall, ToolCallAssembler};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use gateway_core::{
    ChunkStream, FinishReason, GatewayError, GatewayResult, GenerationRequest,
    GenerationResponse, MessageRole, ModelInfo, ProtocolFault, ProviderAdapter,
    ProviderAdapterConfig, ProviderKind, StreamChunk, TokenUsage,
};
use reqwest::{Client, RequestBuilder};
use reqwest_eventsource::{Event, EventSource};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Adapter for OpenAI-compatible vendors
pub struct OpenAiCompatibleAdapter {
    config: ProviderAdapterConfig,
    client: Client,
    base_url: String,
}

impl OpenAiCompatibleAdapter {
    /// Create a new adapter
    ///
    /// # Errors
    /// Returns a configuration error for non-compatible vendors or an
    /// unusable proxy setting
    pub fn new(config: ProviderAdapterConfig) -> GatewayResult<Self> {
        if !config.provider.is_openai_compatible() || config.provider == ProviderKind::AzureOpenAi {
            return Err(GatewayError::configuration(format!(
                "{} is not served by the OpenAI-compatible adapter",
                config.provider
            )));
        }
        let client = http::build_client(&config)?;
        let base_url = http::base_url(&config)?;

        Ok(Self {
            config,
            client,
            base_url,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn post(&self, body: &ChatRequest) -> RequestBuilder {
        self.client
            .post(self.chat_url())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(body)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn kind(&self) -> ProviderKind {
        self.config.provider
    }

    fn config(&self) -> &ProviderAdapterConfig {
        &self.config
    }

    async fn generate(&self, request: &GenerationRequest) -> GatewayResult<GenerationResponse> {
        require_api_key(&self.config)?;
        let body = build_chat_request(self.config.provider, &self.config.model, request, false);

        debug!(
            provider = %self.config.provider,
            model = %self.config.model,
            url = %self.chat_url(),
            "Sending chat completion request"
        );

        let builder = self.post(&body).timeout(self.config.timeout);
        send_chat(self.config.provider, self.config.timeout, builder).await
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> GatewayResult<ChunkStream> {
        require_api_key(&self.config)?;
        let body = build_chat_request(self.config.provider, &self.config.model, request, true);

        debug!(
            provider = %self.config.provider,
            model = %self.config.model,
            "Sending streaming chat completion request"
        );

        stream_chat(self.config.provider, self.config.timeout, self.post(&body))
    }

    async fn list_models_with_api_key(
        &self,
        api_key: &SecretString,
        endpoint: Option<&str>,
    ) -> GatewayResult<Vec<ModelInfo>> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(GatewayError::configuration("API key is blank"));
        }
        let base = endpoint
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| self.base_url.clone());
        let url = format!("{base}/models");

        let response = self
            .client
            .get(&url)
            .bearer_auth(api_key.expose_secret())
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| http::map_transport_error(self.config.provider, self.config.timeout, &e))?;
        let response = http::check_response(self.config.provider, response).await?;

        let list: ModelList = response.json().await.map_err(|e| {
            GatewayError::protocol(
                self.config.provider.as_str(),
                ProtocolFault::Malformed,
                format!("invalid model list: {e}"),
            )
        })?;

        Ok(list.data.into_iter().map(ModelEntry::into_model_info).collect())
    }
}

// ---------------------------------------------------------------------------
// Shared wire helpers
// ---------------------------------------------------------------------------

/// Whether the vendor accepts `top_k` on the chat-completions endpoint
fn supports_top_k(kind: ProviderKind) -> bool {
    matches!(
        kind,
        ProviderKind::Qwen | ProviderKind::SiliconFlow | ProviderKind::OpenRouter | ProviderKind::Ollama
    )
}

/// Build the chat-completions request body
pub(crate) fn build_chat_request(
    kind: ProviderKind,
    model: &str,
    request: &GenerationRequest,
    stream: bool,
) -> ChatRequest {
    let mut messages = Vec::with_capacity(request.messages().len() + 1);
    if let Some(system) = request.system_prompt() {
        messages.push(WireMessage::text("system", system));
    }

    for message in request.messages() {
        let wire = match message.role {
            MessageRole::Tool => {
                let (call_id, content) = message
                    .tool_result
                    .as_ref()
                    .map(|r| (r.call_id.clone(), r.content.clone()))
                    .unwrap_or_default();
                WireMessage {
                    role: "tool".to_string(),
                    content: Some(content),
                    tool_calls: Vec::new(),
                    tool_call_id: Some(call_id),
                    reasoning_content: None,
                }
            }
            role => WireMessage {
                role: role.to_string(),
                content: message.content.clone(),
                tool_calls: tools::to_openai_tool_calls(&message.tool_calls),
                tool_call_id: None,
                reasoning_content: None,
            },
        };
        messages.push(wire);
    }

    let params = request.parameters();
    let mut extra: Map<String, Value> = params.provider_options.clone();
    if let (Some(top_k), true) = (params.top_k, supports_top_k(kind)) {
        extra.entry("top_k").or_insert_with(|| Value::from(top_k));
    }

    ChatRequest {
        model: model.to_string(),
        messages,
        temperature: params.temperature,
        top_p: params.top_p,
        max_tokens: params.max_output_tokens,
        stop: if params.stop.is_empty() {
            None
        } else {
            Some(params.stop.clone())
        },
        tools: if params.tools.is_empty() {
            None
        } else {
            Some(tools::to_openai_tools(&params.tools))
        },
        tool_choice: params.tool_choice.as_ref().map(tools::to_openai_tool_choice),
        stream: if stream { Some(true) } else { None },
        stream_options: if stream {
            Some(StreamOptions {
                include_usage: true,
            })
        } else {
            None
        },
        extra,
    }
}

/// Send a unary chat request and decode the response
pub(crate) async fn send_chat(
    kind: ProviderKind,
    timeout: Duration,
    builder: RequestBuilder,
) -> GatewayResult<GenerationResponse> {
    let response = builder.send().await.map_err(|e| {
        error!(provider = %kind, error = %e, "Chat completion request failed");
        http::map_transport_error(kind, timeout, &e)
    })?;
    let response = http::check_response(kind, response).await?;

    let body = response
        .text()
        .await
        .map_err(|e| http::map_transport_error(kind, timeout, &e))?;
    trace!(provider = %kind, body = %body, "Received chat completion response");

    let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
        GatewayError::protocol(
            kind.as_str(),
            ProtocolFault::Malformed,
            format!("invalid response JSON: {e}"),
        )
    })?;

    parse_chat_response(kind, parsed)
}

/// Convert a decoded chat response into the canonical shape
pub(crate) fn parse_chat_response(
    kind: ProviderKind,
    response: ChatResponse,
) -> GatewayResult<GenerationResponse> {
    if let Some(error) = response.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), ToString::to_string);
        return Ok(GenerationResponse::error(message).with_model(response.model.unwrap_or_default()));
    }

    let choice = response.choices.into_iter().next().ok_or_else(|| {
        GatewayError::protocol(kind.as_str(), ProtocolFault::EmptyResult, "no choices in response")
    })?;

    let finish_reason = choice
        .finish_reason
        .as_deref()
        .map_or(FinishReason::Unknown, map_finish_reason);
    let tool_calls = tools::from_openai_tool_calls(choice.message.tool_calls);
    let content = choice.message.content.unwrap_or_default();

    if content.trim().is_empty()
        && tool_calls.is_empty()
        && !matches!(finish_reason, FinishReason::Length | FinishReason::ContentFilter)
    {
        return Err(GatewayError::protocol(
            kind.as_str(),
            ProtocolFault::NoContent,
            format!("completed with neither text nor tool call (finish_reason={finish_reason})"),
        ));
    }

    let usage = response.usage.map(ChatUsage::into_usage).unwrap_or_default();
    let mut result = GenerationResponse::success(content, finish_reason, usage)
        .with_tool_calls(tool_calls)
        .with_model(response.model.unwrap_or_default());
    if let Some(id) = response.id {
        result = result.with_metadata("id", Value::String(id));
    }
    if let Some(reasoning) = choice.message.reasoning_content.filter(|r| !r.is_empty()) {
        result = result.with_metadata("reasoning_content", Value::String(reasoning));
    }
    if let Some(fingerprint) = response.system_fingerprint {
        result = result.with_metadata("system_fingerprint", Value::String(fingerprint));
    }
    Ok(result)
}

/// Open an SSE stream for a chat request
pub(crate) fn stream_chat(
    kind: ProviderKind,
    timeout: Duration,
    builder: RequestBuilder,
) -> GatewayResult<ChunkStream> {
    let mut event_source = EventSource::new(builder).map_err(|e| {
        GatewayError::internal(format!("Failed to create event source: {e}"))
    })?;
    event_source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

    let stream = try_stream! {
        let mut es = event_source;
        let mut assembler = ToolCallAssembler::new();
        let mut finish_reason: Option<FinishReason> = None;
        let mut usage: Option<TokenUsage> = None;
        let mut parsed = 0_u32;
        let mut malformed = 0_u32;

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => {
                    trace!(provider = %kind, "Stream opened");
                }
                Ok(Event::Message(msg)) => {
                    let data = msg.data.trim();

                    // Check for stream end
                    if data == "[DONE]" {
                        break;
                    }

                    let chunk = match serde_json::from_str::<ChatChunk>(data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            warn!(provider = %kind, error = %e, data = %data, "Failed to parse stream chunk");
                            malformed += 1;
                            continue;
                        }
                    };
                    parsed += 1;

                    if let Some(err) = chunk.error {
                        let message = err
                            .get("message")
                            .and_then(Value::as_str)
                            .map_or_else(|| err.to_string(), ToString::to_string);
                        Err::<(), _>(GatewayError::transient(kind.as_str(), message, None))?;
                    }

                    if let Some(u) = chunk.usage {
                        usage = Some(u.into_usage());
                    }

                    for choice in chunk.choices {
                        for call in choice.delta.tool_calls {
                            assembler.start(
                                call.index,
                                call.id.as_deref(),
                                call.function.as_ref().and_then(|f| f.name.as_deref()),
                            );
                            if let Some(args) = call.function.as_ref().and_then(|f| f.arguments.as_deref()) {
                                assembler.append(call.index, args);
                            }
                        }
                        if let Some(reason) = choice.finish_reason.as_deref() {
                            finish_reason = Some(map_finish_reason(reason));
                        }
                        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                            yield StreamChunk::text(text);
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let wait = http::retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    let message = http::extract_error_message(&body);
                    error!(provider = %kind, status = status.as_u16(), message = %message, "Stream rejected");
                    Err::<(), _>(http::error_from_status(kind, status.as_u16(), message, wait))?;
                }
                Err(reqwest_eventsource::Error::Transport(e)) => {
                    error!(provider = %kind, error = %e, "Stream transport error");
                    Err::<(), _>(http::map_transport_error(kind, timeout, &e))?;
                }
                Err(e) => {
                    error!(provider = %kind, error = %e, "Stream error");
                    Err::<(), _>(GatewayError::protocol(kind.as_str(), ProtocolFault::Malformed, format!("stream error: {e}")))?;
                }
            }
        }
        es.close();

        if parsed == 0 && malformed > 0 {
            Err::<(), _>(GatewayError::protocol(
                kind.as_str(),
                ProtocolFault::Malformed,
                format!("none of {malformed} stream chunks could be parsed"),
            ))?;
        }

        let calls = assembler.finish();
        let reason = finish_reason.unwrap_or(if calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });
        yield StreamChunk::finish(reason, usage).with_tool_calls(calls);
    };

    Ok(Box::pin(stream))
}

/// Map an OpenAI finish reason
pub(crate) fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" | "eos" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" | "sensitive" => FinishReason::ContentFilter,
        "error" => FinishReason::Error,
        _ => FinishReason::Unknown,
    }
}

// OpenAI API Types

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAiToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing)]
    reasoning_content: Option<String>,
}

impl WireMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            reasoning_content: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    system_fingerprint: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl ChatUsage {
    fn into_usage(self) -> TokenUsage {
        TokenUsage::with_total(self.prompt_tokens, self.completion_tokens, self.total_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChunkToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelList {
    #[serde(default)]
    pub(crate) data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModelEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    context_length: Option<u32>,
}

impl ModelEntry {
    pub(crate) fn into_model_info(self) -> ModelInfo {
        let mut info = ModelInfo::new(self.id);
        if let Some(name) = self.name {
            info = info.with_name(name);
        }
        if let Some(ctx) = self.context_length {
            info = info.with_context_length(ctx);
        }
        info
    }
}
