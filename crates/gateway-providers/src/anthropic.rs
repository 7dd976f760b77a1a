//! Anthropic Messages API adapter.
//!
//! Key differences from OpenAI:
//! - System prompt is a top-level field, not a message
//! - Tool results travel as `tool_result` blocks inside a user message
//! - `max_tokens` is mandatory
//! - Streaming uses typed SSE events (`content_block_delta`, `message_delta`, ...)

use crate::http::{self, require_api_key};
use crate::sse::{self, SseFrame};
use crate::tools::{self, AnthropicTool, ToolCallAssembler};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use gateway_core::{
    ChunkStream, FinishReason, GatewayError, GatewayResult, GenerationRequest,
    GenerationResponse, MessageRole, ModelInfo, ProtocolFault, ProviderAdapter,
    ProviderAdapterConfig, ProviderKind, StreamChunk, TokenUsage,
};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, trace, warn};

/// API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Output limit used when the request does not set one
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

const PROVIDER: &str = "anthropic";

/// Anthropic adapter
pub struct AnthropicAdapter {
    config: ProviderAdapterConfig,
    client: Client,
    base_url: String,
}

impl AnthropicAdapter {
    /// Create a new adapter
    ///
    /// # Errors
    /// Returns a configuration error for an unusable proxy setting
    pub fn new(config: ProviderAdapterConfig) -> GatewayResult<Self> {
        if config.provider != ProviderKind::Anthropic {
            return Err(GatewayError::configuration(format!(
                "{} is not served by the Anthropic adapter",
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

    fn messages_url(&self) -> String {
        format!("{}/messages", self.base_url)
    }

    fn post(&self, body: &MessagesRequest) -> RequestBuilder {
        self.client
            .post(self.messages_url())
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
    }

    /// Transform a canonical request to the Messages API format
    fn transform_request(&self, request: &GenerationRequest, stream: bool) -> MessagesRequest {
        let mut messages: Vec<AnthropicMessage> = Vec::new();
        let mut system_parts: Vec<String> = request
            .system_prompt()
            .map(|s| vec![s.to_string()])
            .unwrap_or_default();

        for message in request.messages() {
            let (role, blocks) = match message.role {
                MessageRole::System => {
                    if let Some(text) = &message.content {
                        system_parts.push(text.clone());
                    }
                    continue;
                }
                MessageRole::User => ("user", text_blocks(message.content.as_deref())),
                MessageRole::Assistant => {
                    let mut blocks = text_blocks(message.content.as_deref());
                    blocks.extend(message.tool_calls.iter().map(|call| ContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: tools::anthropic_tool_input(call),
                    }));
                    ("assistant", blocks)
                }
                MessageRole::Tool => {
                    let Some(result) = &message.tool_result else {
                        continue;
                    };
                    (
                        "user",
                        vec![ContentBlock::ToolResult {
                            tool_use_id: result.call_id.clone(),
                            content: result.content.clone(),
                        }],
                    )
                }
            };

            if blocks.is_empty() {
                continue;
            }

            // Consecutive same-role turns are merged; the API requires alternation
            match messages.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => messages.push(AnthropicMessage {
                    role: role.to_string(),
                    content: blocks,
                }),
            }
        }

        let params = request.parameters();
        MessagesRequest {
            model: self.config.model.clone(),
            messages,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            max_tokens: params.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: params.temperature.map(|t| t.min(1.0)),
            top_p: params.top_p,
            top_k: params.top_k,
            stop_sequences: if params.stop.is_empty() {
                None
            } else {
                Some(params.stop.clone())
            },
            tools: if params.tools.is_empty() {
                None
            } else {
                Some(tools::to_anthropic_tools(&params.tools))
            },
            tool_choice: params.tool_choice.as_ref().map(tools::to_anthropic_tool_choice),
            stream: if stream { Some(true) } else { None },
            extra: params.provider_options.clone(),
        }
    }

    /// Transform a Messages API response to the canonical format
    fn transform_response(response: MessagesResponse) -> GatewayResult<GenerationResponse> {
        if response.content.is_empty() {
            return Err(GatewayError::protocol(
                PROVIDER,
                ProtocolFault::EmptyResult,
                "response carried no content blocks",
            ));
        }

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in &response.content {
            match block {
                ResponseBlock::Text { text: t } => text.push_str(t),
                ResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(tools::from_anthropic_tool_use(id, name, input));
                }
                ResponseBlock::Other => {}
            }
        }

        let finish_reason = response
            .stop_reason
            .as_deref()
            .map_or(FinishReason::Unknown, map_stop_reason);

        if text.trim().is_empty()
            && tool_calls.is_empty()
            && !matches!(finish_reason, FinishReason::Length | FinishReason::ContentFilter)
        {
            return Err(GatewayError::protocol(
                PROVIDER,
                ProtocolFault::NoContent,
                format!("completed with neither text nor tool call (stop_reason={finish_reason})"),
            ));
        }

        let usage = response.usage.map(AnthropicUsage::into_usage).unwrap_or_default();
        let mut result = GenerationResponse::success(text, finish_reason, usage)
            .with_tool_calls(tool_calls)
            .with_model(response.model);
        if let Some(id) = response.id {
            result = result.with_metadata("id", Value::String(id));
        }
        Ok(result)
    }
}

fn text_blocks(content: Option<&str>) -> Vec<ContentBlock> {
    content
        .filter(|t| !t.is_empty())
        .map(|t| vec![ContentBlock::Text { text: t.to_string() }])
        .unwrap_or_default()
}

/// Map an Anthropic stop reason
fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" | "pause_turn" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::Unknown,
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn config(&self) -> &ProviderAdapterConfig {
        &self.config
    }

    async fn generate(&self, request: &GenerationRequest) -> GatewayResult<GenerationResponse> {
        require_api_key(&self.config)?;
        let body = self.transform_request(request, false);

        debug!(
            provider = PROVIDER,
            model = %self.config.model,
            url = %self.messages_url(),
            "Sending messages request"
        );

        let response = self
            .post(&body)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Anthropic API request failed");
                http::map_transport_error(ProviderKind::Anthropic, self.config.timeout, &e)
            })?;
        let response = http::check_response(ProviderKind::Anthropic, response).await?;

        let text = response
            .text()
            .await
            .map_err(|e| http::map_transport_error(ProviderKind::Anthropic, self.config.timeout, &e))?;
        trace!(body = %text, "Received Anthropic response");

        let parsed: MessagesResponse = serde_json::from_str(&text).map_err(|e| {
            GatewayError::protocol(PROVIDER, ProtocolFault::Malformed, format!("invalid response JSON: {e}"))
        })?;
        Self::transform_response(parsed)
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> GatewayResult<ChunkStream> {
        require_api_key(&self.config)?;
        let body = self.transform_request(request, true);
        let timeout = self.config.timeout;

        debug!(
            provider = PROVIDER,
            model = %self.config.model,
            "Sending streaming messages request"
        );

        let response = self
            .post(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Anthropic streaming request failed");
                http::map_transport_error(ProviderKind::Anthropic, timeout, &e)
            })?;
        let response = http::check_response(ProviderKind::Anthropic, response).await?;

        let stream = try_stream! {
            let mut frames = sse::frames(ProviderKind::Anthropic, timeout, response);
            let mut state = StreamState::default();

            while let Some(frame) = frames.next().await {
                let frame = frame?;
                match state.apply(&frame) {
                    Ok(Some(text)) => yield StreamChunk::text(text),
                    Ok(None) => {}
                    Err(e) => Err::<(), _>(e)?,
                }
                if state.stopped {
                    break;
                }
            }

            yield state.finish();
        };

        Ok(Box::pin(stream))
    }

    async fn list_models_with_api_key(
        &self,
        api_key: &SecretString,
        endpoint: Option<&str>,
    ) -> GatewayResult<Vec<ModelInfo>> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(GatewayError::configuration("API key is blank"));
        }
        let base = endpoint.map_or_else(|| self.base_url.clone(), |e| e.trim_end_matches('/').to_string());

        let response = self
            .client
            .get(format!("{base}/models"))
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| http::map_transport_error(ProviderKind::Anthropic, self.config.timeout, &e))?;
        let response = http::check_response(ProviderKind::Anthropic, response).await?;

        let list: AnthropicModelList = response.json().await.map_err(|e| {
            GatewayError::protocol(PROVIDER, ProtocolFault::Malformed, format!("invalid model list: {e}"))
        })?;

        Ok(list
            .data
            .into_iter()
            .map(|m| {
                let name = m.display_name.unwrap_or_else(|| m.id.clone());
                ModelInfo::new(m.id).with_name(name)
            })
            .collect())
    }
}

/// Per-stream decoding state
#[derive(Debug, Default)]
struct StreamState {
    assembler: ToolCallAssembler,
    input_tokens: u32,
    output_tokens: u32,
    saw_usage: bool,
    finish_reason: Option<FinishReason>,
    stopped: bool,
}

impl StreamState {
    /// Apply one SSE frame, returning any text delta it carries
    fn apply(&mut self, frame: &SseFrame) -> GatewayResult<Option<String>> {
        if frame.data.is_empty() {
            return Ok(None);
        }
        let event: StreamEvent = match serde_json::from_str(&frame.data) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, data = %frame.data, "Failed to parse Anthropic stream event");
                return Ok(None);
            }
        };

        match event.event_type.as_str() {
            "message_start" => {
                if let Some(usage) = event.message.and_then(|m| m.usage) {
                    self.input_tokens = usage.input_tokens;
                    self.output_tokens = usage.output_tokens;
                    self.saw_usage = true;
                }
            }
            "content_block_start" => {
                if let (Some(index), Some(block)) = (event.index, event.content_block) {
                    if block.block_type == "tool_use" {
                        self.assembler
                            .start(index, block.id.as_deref(), block.name.as_deref());
                    }
                }
            }
            "content_block_delta" => {
                let (Some(index), Some(delta)) = (event.index, event.delta) else {
                    return Ok(None);
                };
                match delta.delta_type.as_deref() {
                    Some("text_delta") => return Ok(delta.text.filter(|t| !t.is_empty())),
                    Some("input_json_delta") => {
                        if let Some(partial) = delta.partial_json {
                            self.assembler.append(index, &partial);
                        }
                    }
                    _ => {}
                }
            }
            "message_delta" => {
                if let Some(reason) = event.delta.and_then(|d| d.stop_reason) {
                    self.finish_reason = Some(map_stop_reason(&reason));
                }
                if let Some(usage) = event.usage {
                    self.output_tokens = usage.output_tokens;
                    self.saw_usage = true;
                }
            }
            "message_stop" => self.stopped = true,
            "error" => {
                let (kind, message) = event
                    .error
                    .map(|e| (e.error_type, e.message))
                    .unwrap_or_default();
                return Err(match kind.as_str() {
                    "rate_limit_error" => GatewayError::rate_limit(PROVIDER, message, None),
                    "overloaded_error" | "api_error" => GatewayError::transient(PROVIDER, message, None),
                    _ => GatewayError::protocol(PROVIDER, ProtocolFault::Malformed, format!("{kind}: {message}")),
                });
            }
            _ => {}
        }
        Ok(None)
    }

    fn finish(self) -> StreamChunk {
        let usage = self
            .saw_usage
            .then(|| TokenUsage::new(self.input_tokens, self.output_tokens));
        let calls = self.assembler.finish();
        let reason = self.finish_reason.unwrap_or(if calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });
        StreamChunk::finish(reason, usage).with_tool_calls(calls)
    }
}

// Anthropic API Types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl AnthropicUsage {
    fn into_usage(self) -> TokenUsage {
        TokenUsage::new(self.input_tokens, self.output_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    message: Option<StreamMessage>,
    #[serde(default)]
    content_block: Option<StreamBlock>,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type", default)]
    delta_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamError {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicModelList {
    #[serde(default)]
    data: Vec<AnthropicModelEntry>,
}

#[derive(Debug, Deserialize)]
struct AnthropicModelEntry {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}
