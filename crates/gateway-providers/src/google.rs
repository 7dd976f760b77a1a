//! Google Gemini provider implementation.
//!
//! # API Format
//! - Unary: `{base}/models/{MODEL}:generateContent`
//! - Streaming: `{base}/models/{MODEL}:streamGenerateContent?alt=sse`
//!
//! Authentication uses the `x-goog-api-key` header so the key never lands
//! in a URL that might be logged.

use crate::http::{self, require_api_key};
use crate::sse;
use crate::tools::{self, GeminiFunctionDeclaration};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use gateway_core::{
    ChunkStream, FinishReason, GatewayError, GatewayResult, GenerationRequest,
    GenerationResponse, MessageRole, ModelInfo, ProtocolFault, ProviderAdapter,
    ProviderAdapterConfig, ProviderKind, StreamChunk, TokenUsage, ToolCallRequest,
};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, trace, warn};

const PROVIDER: &str = "gemini";

/// Gemini adapter
pub struct GeminiAdapter {
    config: ProviderAdapterConfig,
    client: Client,
    base_url: String,
}

impl GeminiAdapter {
    /// Create a new adapter
    ///
    /// # Errors
    /// Returns a configuration error for an unusable proxy setting
    pub fn new(config: ProviderAdapterConfig) -> GatewayResult<Self> {
        if config.provider != ProviderKind::Gemini {
            return Err(GatewayError::configuration(format!(
                "{} is not served by the Gemini adapter",
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

    /// Get the endpoint URL for the configured model
    fn endpoint_url(&self, stream: bool) -> String {
        let model = self.config.model.trim_start_matches("models/");
        if stream {
            format!("{}/models/{model}:streamGenerateContent?alt=sse", self.base_url)
        } else {
            format!("{}/models/{model}:generateContent", self.base_url)
        }
    }

    fn post(&self, stream: bool, body: &GoogleRequest) -> RequestBuilder {
        self.client
            .post(self.endpoint_url(stream))
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .json(body)
    }

    /// Transform a canonical request to the Gemini format
    fn transform_request(request: &GenerationRequest) -> GoogleRequest {
        let mut system_parts: Vec<GooglePart> = request
            .system_prompt()
            .map(|s| vec![GooglePart::Text { text: s.to_string() }])
            .unwrap_or_default();
        let mut contents: Vec<GoogleContent> = Vec::new();

        for message in request.messages() {
            let (role, parts) = match message.role {
                MessageRole::System => {
                    if let Some(text) = &message.content {
                        system_parts.push(GooglePart::Text { text: text.clone() });
                    }
                    continue;
                }
                MessageRole::User => ("user", text_parts(message.content.as_deref())),
                MessageRole::Assistant => {
                    let mut parts = text_parts(message.content.as_deref());
                    parts.extend(message.tool_calls.iter().map(|call| GooglePart::FunctionCall {
                        function_call: GoogleFunctionCallData {
                            name: call.name.clone(),
                            args: tools::gemini_function_args(call),
                        },
                    }));
                    ("model", parts)
                }
                MessageRole::Tool => {
                    let Some(result) = &message.tool_result else {
                        continue;
                    };
                    (
                        "user",
                        vec![GooglePart::FunctionResponse {
                            function_response: GoogleFunctionResponseData {
                                name: result.name.clone(),
                                response: tools::gemini_function_response(&result.content),
                            },
                        }],
                    )
                }
            };

            if parts.is_empty() {
                continue;
            }
            match contents.last_mut() {
                Some(last) if last.role.as_deref() == Some(role) => last.parts.extend(parts),
                _ => contents.push(GoogleContent {
                    role: Some(role.to_string()),
                    parts,
                }),
            }
        }

        let params = request.parameters();
        let generation_config = GoogleGenerationConfig {
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            max_output_tokens: params.max_output_tokens,
            stop_sequences: if params.stop.is_empty() {
                None
            } else {
                Some(params.stop.clone())
            },
        };

        GoogleRequest {
            contents,
            system_instruction: if system_parts.is_empty() {
                None
            } else {
                Some(GoogleContent {
                    role: None,
                    parts: system_parts,
                })
            },
            generation_config: Some(generation_config),
            tools: if params.tools.is_empty() {
                None
            } else {
                Some(vec![GoogleTool {
                    function_declarations: tools::to_gemini_declarations(&params.tools),
                }])
            },
            tool_config: params.tool_choice.as_ref().map(tools::to_gemini_tool_config),
            extra: params.provider_options.clone(),
        }
    }

    /// Transform a Gemini response to the canonical format
    fn transform_response(response: GoogleResponse, model: &str) -> GatewayResult<GenerationResponse> {
        let usage = response.usage_metadata.map(GoogleUsageMetadata::into_usage).unwrap_or_default();
        let Some(candidate) = response.candidates.into_iter().next() else {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map_or_else(|| "no candidates in response".to_string(), |r| format!("prompt blocked: {r}"));
            return Err(GatewayError::protocol(PROVIDER, ProtocolFault::EmptyResult, reason));
        };

        let finish_reason = candidate
            .finish_reason
            .as_deref()
            .map_or(FinishReason::Unknown, map_finish_reason);
        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

        let (text, tool_calls) = split_parts(&parts);
        if text.trim().is_empty()
            && tool_calls.is_empty()
            && !matches!(finish_reason, FinishReason::Length | FinishReason::ContentFilter)
        {
            return Err(GatewayError::protocol(
                PROVIDER,
                ProtocolFault::NoContent,
                format!("candidate carried no parts (finishReason={finish_reason})"),
            ));
        }

        let finish_reason = if tool_calls.is_empty() {
            finish_reason
        } else {
            FinishReason::ToolCalls
        };
        let model = response.model_version.unwrap_or_else(|| model.to_string());
        Ok(GenerationResponse::success(text, finish_reason, usage)
            .with_tool_calls(tool_calls)
            .with_model(model))
    }
}

fn text_parts(content: Option<&str>) -> Vec<GooglePart> {
    content
        .filter(|t| !t.is_empty())
        .map(|t| vec![GooglePart::Text { text: t.to_string() }])
        .unwrap_or_default()
}

/// Concatenated text and function calls of a part list
fn split_parts(parts: &[GooglePart]) -> (String, Vec<ToolCallRequest>) {
    let mut text = String::new();
    let mut calls = Vec::new();
    for part in parts {
        match part {
            GooglePart::Text { text: t } => text.push_str(t),
            GooglePart::FunctionCall { function_call } => {
                calls.push(tools::from_gemini_function_call(&function_call.name, &function_call.args));
            }
            GooglePart::FunctionResponse { .. } | GooglePart::Other(_) => {}
        }
    }
    (text, calls)
}

/// Map Gemini finish reason
fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        "MALFORMED_FUNCTION_CALL" => FinishReason::Error,
        _ => FinishReason::Unknown,
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn config(&self) -> &ProviderAdapterConfig {
        &self.config
    }

    async fn generate(&self, request: &GenerationRequest) -> GatewayResult<GenerationResponse> {
        require_api_key(&self.config)?;
        let body = Self::transform_request(request);

        debug!(
            provider = PROVIDER,
            model = %self.config.model,
            url = %self.endpoint_url(false),
            "Sending generateContent request"
        );

        let response = self
            .post(false, &body)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Gemini API request failed");
                http::map_transport_error(ProviderKind::Gemini, self.config.timeout, &e)
            })?;
        let response = http::check_response(ProviderKind::Gemini, response).await?;

        let text = response
            .text()
            .await
            .map_err(|e| http::map_transport_error(ProviderKind::Gemini, self.config.timeout, &e))?;
        trace!(body = %text, "Received Gemini response");

        let parsed: GoogleResponse = serde_json::from_str(&text).map_err(|e| {
            GatewayError::protocol(PROVIDER, ProtocolFault::Malformed, format!("invalid response JSON: {e}"))
        })?;
        Self::transform_response(parsed, &self.config.model)
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> GatewayResult<ChunkStream> {
        require_api_key(&self.config)?;
        let body = Self::transform_request(request);
        let timeout = self.config.timeout;

        debug!(
            provider = PROVIDER,
            model = %self.config.model,
            "Sending streamGenerateContent request"
        );

        let response = self
            .post(true, &body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Gemini streaming request failed");
                http::map_transport_error(ProviderKind::Gemini, timeout, &e)
            })?;
        let response = http::check_response(ProviderKind::Gemini, response).await?;

        let stream = try_stream! {
            let mut frames = sse::frames(ProviderKind::Gemini, timeout, response);
            let mut calls: Vec<ToolCallRequest> = Vec::new();
            let mut usage: Option<TokenUsage> = None;
            let mut finish_reason: Option<FinishReason> = None;

            while let Some(frame) = frames.next().await {
                let frame = frame?;
                if frame.data.is_empty() || frame.data == "[DONE]" {
                    continue;
                }
                let chunk: GoogleResponse = match serde_json::from_str(&frame.data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(error = %e, data = %frame.data, "Failed to parse Gemini stream chunk");
                        continue;
                    }
                };

                // usageMetadata is cumulative; the last report wins
                if let Some(meta) = chunk.usage_metadata {
                    usage = Some(meta.into_usage());
                }
                if chunk.candidates.is_empty() {
                    if chunk.prompt_feedback.and_then(|f| f.block_reason).is_some() {
                        finish_reason = Some(FinishReason::ContentFilter);
                    }
                    continue;
                }

                for candidate in chunk.candidates.into_iter().take(1) {
                    if let Some(reason) = candidate.finish_reason.as_deref() {
                        finish_reason = Some(map_finish_reason(reason));
                    }
                    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
                    let (text, mut new_calls) = split_parts(&parts);
                    calls.append(&mut new_calls);
                    if !text.is_empty() {
                        yield StreamChunk::text(text);
                    }
                }
            }

            let reason = if calls.is_empty() {
                finish_reason.unwrap_or(FinishReason::Stop)
            } else {
                FinishReason::ToolCalls
            };
            yield StreamChunk::finish(reason, usage).with_tool_calls(calls);
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
            .header("x-goog-api-key", api_key.expose_secret())
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| http::map_transport_error(ProviderKind::Gemini, self.config.timeout, &e))?;
        let response = http::check_response(ProviderKind::Gemini, response).await?;

        let list: GoogleModelList = response.json().await.map_err(|e| {
            GatewayError::protocol(PROVIDER, ProtocolFault::Malformed, format!("invalid model list: {e}"))
        })?;

        Ok(list
            .models
            .into_iter()
            .map(|m| {
                let id = m.name.trim_start_matches("models/").to_string();
                let mut info = ModelInfo::new(id.clone()).with_name(m.display_name.unwrap_or(id));
                if let Some(limit) = m.input_token_limit {
                    info = info.with_context_length(limit);
                }
                if let Some(limit) = m.output_token_limit {
                    info = info.with_max_output_tokens(limit);
                }
                info
            })
            .collect())
    }
}

// Gemini API Types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRequest {
    contents: Vec<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GoogleContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GoogleGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GoogleTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<Value>,
    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GooglePart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GoogleFunctionCallData,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GoogleFunctionResponseData,
    },
    Other(Value),
}

#[derive(Debug, Serialize, Deserialize)]
struct GoogleFunctionCallData {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct GoogleFunctionResponseData {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    usage_metadata: Option<GoogleUsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<GooglePromptFeedback>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    #[serde(default)]
    content: Option<GoogleContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GooglePromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

impl GoogleUsageMetadata {
    fn into_usage(self) -> TokenUsage {
        TokenUsage::with_total(
            self.prompt_token_count,
            self.candidates_token_count,
            self.total_token_count,
        )
    }
}

#[derive(Debug, Deserialize)]
struct GoogleModelList {
    #[serde(default)]
    models: Vec<GoogleModelEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleModelEntry {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    input_token_limit: Option<u32>,
    #[serde(default)]
    output_token_limit: Option<u32>,
}
