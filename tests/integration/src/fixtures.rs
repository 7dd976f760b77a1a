//! Test fixtures: vendor payloads and canonical requests

use gateway_core::{GenerationRequest, Message};
use serde_json::{json, Value};

/// A single-turn request
pub fn simple_request(text: &str) -> GenerationRequest {
    GenerationRequest::builder()
        .message(Message::user(text))
        .max_output_tokens(100)
        .build()
        .unwrap()
}

/// A request attributed to a user and business tag
pub fn tagged_request(text: &str, user: &str, tag: &str) -> GenerationRequest {
    GenerationRequest::builder()
        .system_prompt("You are terse.")
        .message(Message::user(text))
        .max_output_tokens(50)
        .user_id(user)
        .business_tag(tag)
        .build()
        .unwrap()
}

/// OpenAI chat completion
pub fn openai_chat_response(model: &str, content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
    })
}

/// OpenAI completion asking for one tool call
pub fn openai_tool_call_response(model: &str, tool: &str, arguments: &str) -> Value {
    json!({
        "id": "chatcmpl-tool",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": tool, "arguments": arguments}
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 20, "completion_tokens": 9, "total_tokens": 29}
    })
}

/// OpenAI streaming chunk
pub fn openai_streaming_chunk(model: &str, content: &str, finish: bool) -> Value {
    let delta = if finish { json!({}) } else { json!({"content": content}) };
    json!({
        "id": "chatcmpl-stream",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": if finish { json!("stop") } else { Value::Null }
        }]
    })
}

/// OpenAI usage-only trailer sent when `include_usage` is requested
pub fn openai_usage_chunk(model: &str) -> Value {
    json!({
        "id": "chatcmpl-stream",
        "object": "chat.completion.chunk",
        "model": model,
        "choices": [],
        "usage": {"prompt_tokens": 8, "completion_tokens": 2, "total_tokens": 10}
    })
}

/// Complete OpenAI SSE body for the given deltas
pub fn openai_stream_body(model: &str, chunks: &[&str]) -> String {
    let mut frames: Vec<Value> = chunks
        .iter()
        .map(|chunk| openai_streaming_chunk(model, chunk, false))
        .collect();
    frames.push(openai_streaming_chunk(model, "", true));
    frames.push(openai_usage_chunk(model));
    crate::mock_providers::sse_body(&frames)
}

/// OpenAI error body
pub fn openai_error_response(code: &str, message: &str) -> Value {
    json!({"error": {"message": message, "type": code, "code": code}})
}

/// OpenAI model list
pub fn openai_models_response(ids: &[&str]) -> Value {
    let data: Vec<Value> = ids
        .iter()
        .map(|id| json!({"id": id, "object": "model", "created": 1_700_000_000, "owned_by": "openai"}))
        .collect();
    json!({"object": "list", "data": data})
}

/// Anthropic messages response
pub fn anthropic_messages_response(model: &str, content: &str) -> Value {
    json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": [{"type": "text", "text": content}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 11, "output_tokens": 6}
    })
}

/// Anthropic streaming frames for the given deltas
pub fn anthropic_stream_frames(chunks: &[&str]) -> Vec<Value> {
    let mut frames = vec![
        json!({"type": "message_start", "message": {"id": "msg_stream", "usage": {"input_tokens": 9, "output_tokens": 1}}}),
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
    ];
    frames.extend(chunks.iter().map(|chunk| {
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": chunk}})
    }));
    frames.push(json!({"type": "content_block_stop", "index": 0}));
    frames.push(json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 4}}));
    frames.push(json!({"type": "message_stop"}));
    frames
}

/// Anthropic error body
pub fn anthropic_error_response(kind: &str, message: &str) -> Value {
    json!({"type": "error", "error": {"type": kind, "message": message}})
}

/// Anthropic model list
pub fn anthropic_models_response(ids: &[&str]) -> Value {
    let data: Vec<Value> = ids
        .iter()
        .map(|id| json!({"id": id, "type": "model", "display_name": id.to_uppercase()}))
        .collect();
    json!({"data": data, "has_more": false})
}

/// Gemini generateContent response
pub fn gemini_response(content: &str, finish_reason: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": content}]},
            "finishReason": finish_reason,
            "index": 0
        }],
        "usageMetadata": {"promptTokenCount": 6, "candidatesTokenCount": 3, "totalTokenCount": 9}
    })
}

/// Gemini streaming frame
pub fn gemini_stream_frame(content: &str, finish_reason: Option<&str>) -> Value {
    let mut candidate = json!({"content": {"role": "model", "parts": [{"text": content}]}, "index": 0});
    if let Some(reason) = finish_reason {
        candidate["finishReason"] = json!(reason);
    }
    json!({
        "candidates": [candidate],
        "usageMetadata": {"promptTokenCount": 6, "candidatesTokenCount": 3, "totalTokenCount": 9}
    })
}

/// Gemini model list
pub fn gemini_models_response(ids: &[&str]) -> Value {
    let models: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "name": format!("models/{id}"),
                "displayName": id,
                "inputTokenLimit": 1_048_576,
                "outputTokenLimit": 8192
            })
        })
        .collect();
    json!({"models": models})
}
