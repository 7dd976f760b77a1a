//! Terminal rendering for CLI commands.
//!
//! Human output goes through the helpers here; `--json` output is wrapped in
//! a [`CommandResult`] envelope so scripts always see the same shape.

use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::time::Duration;

/// How a command renders its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Colored text for a terminal
    Text,
    /// One pretty-printed JSON document
    Json,
}

impl OutputFormat {
    /// Pick the format from the global `--json` flag
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }
}

#[derive(Clone, Copy)]
enum Notice {
    Success,
    Error,
    Warning,
    Info,
}

impl Notice {
    fn marker(self) -> ColoredString {
        match self {
            Self::Success => "✓".green().bold(),
            Self::Error => "✗".red().bold(),
            Self::Warning => "!".yellow().bold(),
            Self::Info => "›".cyan().bold(),
        }
    }

    fn print(self, message: &str) {
        match self {
            Self::Error | Self::Warning => eprintln!("{} {message}", self.marker()),
            Self::Success | Self::Info => println!("{} {message}", self.marker()),
        }
    }
}

/// Report a completed step
pub fn success(message: &str) {
    Notice::Success.print(message);
}

/// Report a failure on stderr
pub fn error(message: &str) {
    Notice::Error.print(message);
}

/// Report a problem that does not stop the command
pub fn warning(message: &str) {
    Notice::Warning.print(message);
}

/// Neutral progress note
pub fn info(message: &str) {
    Notice::Info.print(message);
}

/// Aligned `key: value` line under a section
pub fn key_value(key: &str, value: &str) {
    let label = format!("{:<18}", format!("{key}:"));
    println!("  {}{value}", label.bold());
}

/// Section title with an underline sized to it
pub fn section(title: &str) {
    let rule = "─".repeat(title.chars().count());
    println!("\n{}\n{}", title.bold(), rule.dimmed());
}

/// Probe outcome for one gateway
pub fn status(label: &str, ok: bool) {
    let verdict = if ok { "accepted".green() } else { "rejected".red() };
    println!("  {label:<40} {verdict}");
}

/// Write any serializable value as pretty JSON
pub fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

/// Spinner shown while waiting on a vendor. Finish it with
/// `finish_and_clear` before printing the result.
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}") {
        bar.set_style(style.tick_strings(&["◐", "◓", "◑", "◒", "●"]));
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Render rows as a table, or a placeholder when there are none
pub fn table<T: tabled::Tabled>(rows: &[T]) {
    use tabled::{settings::Style, Table};

    if rows.is_empty() {
        println!("  {}", "nothing to show".dimmed());
    } else {
        println!("{}", Table::new(rows).with(Style::psql()));
    }
}

/// Append a streamed delta to stdout without a newline
pub fn stream_text(text: &str) {
    let mut out = io::stdout().lock();
    out.write_all(text.as_bytes()).and_then(|()| out.flush()).ok();
}

/// End a streamed reply
pub fn stream_newline() {
    println!();
}

/// Cost amount with enough precision for sub-cent prompts
pub fn format_amount(amount: f64, currency: &str) -> String {
    format!("{amount:.6} {currency}")
}

/// JSON envelope for every command
#[derive(Debug, Serialize)]
pub struct CommandResult<T: Serialize> {
    /// Whether the command did what was asked
    pub success: bool,
    /// Command payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    fn new(success: bool, data: Option<T>, error: Option<String>) -> Self {
        Self { success, data, error }
    }

    /// Successful envelope
    pub fn success(data: T) -> Self {
        Self::new(true, Some(data), None)
    }

    /// Failed envelope without a payload
    pub fn failure(error: impl Into<String>) -> Self {
        Self::new(false, None, Some(error.into()))
    }

    /// Failed envelope that still reports what was found
    pub fn failure_with(data: T, error: impl Into<String>) -> Self {
        Self::new(false, Some(data), Some(error.into()))
    }

    /// Print as JSON, or only the error line in text mode
    pub fn print(&self, format: OutputFormat) -> anyhow::Result<()> {
        if format == OutputFormat::Json {
            return json(self);
        }
        if let Some(message) = &self.error {
            error(message);
        }
        Ok(())
    }
}
