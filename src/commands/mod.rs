//! CLI commands module.

pub mod chat;
pub mod cost;
pub mod models;
pub mod validate;

use anyhow::{Context, Result};
use gateway_core::{GenerationRequest, Message};
use std::io::{self, BufRead};

/// Read the message from the flag or from one line of stdin.
pub(crate) fn read_message(message: Option<&str>) -> Result<String> {
    if let Some(message) = message {
        return Ok(message.to_string());
    }
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input).context("failed to read stdin")?;
    Ok(input.trim().to_string())
}

/// Build a single-turn request.
pub(crate) fn build_request(
    message: &str,
    system: Option<&str>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    user: Option<&str>,
) -> Result<GenerationRequest> {
    let mut builder = GenerationRequest::builder().message(Message::user(message));
    if let Some(system) = system {
        builder = builder.system_prompt(system);
    }
    if let Some(temperature) = temperature {
        builder = builder.temperature(temperature);
    }
    if let Some(max) = max_tokens {
        builder = builder.max_output_tokens(max);
    }
    if let Some(user) = user {
        builder = builder.user_id(user);
    }
    Ok(builder.build()?)
}
