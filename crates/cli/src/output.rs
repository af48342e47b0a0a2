//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, a tree painter, and Unicode symbols.

use std::time::{Duration, UNIX_EPOCH};

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use flakes_lib::util::tree::Paint;

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
}

/// Colors tree output written to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Colors;

impl Paint for Colors {
  fn prefix(&self, text: &str) -> String {
    text.if_supports_color(Stream::Stdout, |s| s.green()).to_string()
  }

  fn name(&self, text: &str) -> String {
    text.if_supports_color(Stream::Stdout, |s| s.bold()).to_string()
  }

  fn attention(&self, text: &str) -> String {
    text.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string()
  }
}

/// Render a unix timestamp as an RFC 3339 UTC time.
pub fn format_timestamp(secs: u64) -> String {
  humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(secs)).to_string()
}

/// Join an error and its causes with `: `, skipping causes whose message the
/// previous error already ends with.
pub fn format_error_chain(err: &anyhow::Error) -> String {
  let mut message = String::new();
  for cause in err.chain() {
    let text = cause.to_string();
    if message.is_empty() {
      message = text;
    } else if !message.ends_with(&text) {
      message = format!("{}: {}", message, text);
    }
  }
  message
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

/// One `Label:  value` line of `flake info`, labels padded to a common width.
pub fn print_field(label: &str, value: &str) {
  let padded = format!("{:<15}", format!("{}:", label));
  println!("{}{}", padded.if_supports_color(Stream::Stdout, |s| s.bold()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
