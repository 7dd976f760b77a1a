//! Chat command - send generation requests through a configured model.

use anyhow::Result;
use clap::Args;
use futures::StreamExt;
use gateway_core::{Completion, GenerationRequest, Message, StreamEvent, TokenUsage};
use gateway_service::ModelGateway;
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::cli::load_hub;
use crate::commands::{build_request, read_message};
use crate::output::{self, CommandResult, OutputFormat};

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Message to send (if not provided, reads from stdin)
    #[arg(short, long)]
    pub message: Option<String>,

    /// Configured model to use
    #[arg(short = 'M', long)]
    pub model: String,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Enable streaming output
    #[arg(long)]
    pub stream: bool,

    /// Temperature (0.0 to 2.0)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// User identifier recorded on the call trace
    #[arg(long)]
    pub user: Option<String>,

    /// Interactive chat mode
    #[arg(short, long)]
    pub interactive: bool,

    /// Show token usage
    #[arg(long)]
    pub show_usage: bool,
}

/// Chat response for output.
#[derive(Debug, Serialize)]
pub struct ChatOutput {
    pub model: String,
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
    pub retries: u32,
    pub duration_ms: u128,
}

/// Execute the chat command.
pub async fn execute(args: ChatArgs, config_path: &Path, json: bool) -> Result<()> {
    let format = OutputFormat::from_json_flag(json);
    let (_, hub) = load_hub(config_path).await?;
    let gateway = hub.require(&args.model)?;

    if args.interactive {
        run_interactive_mode(&gateway, &args).await
    } else {
        run_single_message(&gateway, &args, format).await
    }
}

async fn run_single_message(gateway: &ModelGateway, args: &ChatArgs, format: OutputFormat) -> Result<()> {
    let message = read_message(args.message.as_deref())?;
    if message.is_empty() {
        CommandResult::<()>::failure("No message provided").print(format)?;
        return Ok(());
    }

    let request = build_request(
        &message,
        args.system.as_deref(),
        args.temperature,
        args.max_tokens,
        args.user.as_deref(),
    )?;

    if args.stream && format == OutputFormat::Text {
        if let Some(completion) = stream_to_stdout(gateway, &request).await? {
            if args.show_usage {
                print_usage(&completion.usage);
            }
        }
        return Ok(());
    }

    let spinner = (format == OutputFormat::Text).then(|| output::spinner("Generating response..."));
    let report = gateway.generate_report(&request).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match (report.result, format) {
        (Ok(response), OutputFormat::Text) => {
            println!("{}", response.content);
            if args.show_usage {
                print_usage(&response.usage);
                if report.retries > 0 {
                    output::key_value("Retries", &report.retries.to_string());
                }
            }
        }
        (Ok(response), OutputFormat::Json) => {
            let chat_output = ChatOutput {
                model: if response.model.is_empty() { gateway.model() } else { response.model.clone() },
                content: response.content,
                finish_reason: response.finish_reason.to_string(),
                usage: response.usage,
                retries: report.retries,
                duration_ms: report.duration.as_millis(),
            };
            CommandResult::success(chat_output).print(format)?;
        }
        (Err(e), _) => {
            CommandResult::<ChatOutput>::failure(format!("Request failed: {e}")).print(format)?;
        }
    }

    Ok(())
}

/// Print a stream as it arrives. Ctrl-C cancels the stream.
///
/// Returns the completion summary when the stream ends successfully.
async fn stream_to_stdout(gateway: &ModelGateway, request: &GenerationRequest) -> Result<Option<Completion>> {
    let mut stream = gateway.generate_stream(request)?;

    loop {
        let next = tokio::select! {
            event = stream.next() => Some(event),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(event) = next else {
            stream.cancel();
            output::stream_newline();
            output::warning("Cancelled");
            return Ok(None);
        };

        match event {
            Some(StreamEvent::ContentDelta(text)) => output::stream_text(&text),
            Some(StreamEvent::Heartbeat) => {}
            Some(StreamEvent::Complete(completion)) => {
                output::stream_newline();
                return Ok(Some(completion));
            }
            Some(StreamEvent::Error(failure)) => {
                output::stream_newline();
                output::error(&format!("Stream error ({}): {}", failure.error_type, failure.message));
                return Ok(None);
            }
            None => {
                output::stream_newline();
                return Ok(None);
            }
        }
    }
}

fn print_usage(usage: &TokenUsage) {
    output::section("Token Usage");
    output::key_value("Input", &usage.input_tokens.to_string());
    output::key_value("Output", &usage.output_tokens.to_string());
    output::key_value("Total", &usage.total_tokens.to_string());
}

/// Run interactive chat mode.
async fn run_interactive_mode(gateway: &ModelGateway, args: &ChatArgs) -> Result<()> {
    output::info(&format!(
        "Interactive chat with {} ({}) (type 'exit' to quit)",
        gateway.name(),
        gateway.model()
    ));

    let mut messages: Vec<Message> = Vec::new();

    loop {
        print!("You: ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            output::info("Goodbye!");
            break;
        }
        if input.is_empty() {
            continue;
        }

        messages.push(Message::user(input));

        let mut builder = GenerationRequest::builder().messages(messages.clone());
        if let Some(ref system) = args.system {
            builder = builder.system_prompt(system);
        }
        if let Some(temperature) = args.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max) = args.max_tokens {
            builder = builder.max_output_tokens(max);
        }
        let request = builder.build()?;

        let reply = if args.stream {
            print!("Assistant: ");
            io::stdout().flush()?;
            stream_to_stdout(gateway, &request)
                .await?
                .map(|completion| completion.content)
        } else {
            match gateway.generate(&request).await {
                Ok(response) => {
                    println!("Assistant: {}", response.content);
                    Some(response.content)
                }
                Err(e) => {
                    output::error(&format!("Error: {e}"));
                    None
                }
            }
        };

        match reply {
            Some(content) if !content.is_empty() => messages.push(Message::assistant(content)),
            // The turn failed, so it is not part of the history
            _ => {
                messages.pop();
            }
        }

        println!();
    }

    Ok(())
}
