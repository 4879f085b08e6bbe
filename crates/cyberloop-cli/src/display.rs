//! Display utilities for CLI output formatting
//!
//! Renders streamed text, tool status lines and run metrics.

use std::io::Write;

use colored::Colorize;

use cyberloop::{Metrics, ToolCallUpdate, ToolStatus};

/// Longest tool payload echoed to the terminal.
const RESULT_PREVIEW_CHARS: usize = 200;

/// Writes a streamed content fragment without a newline.
pub fn display_content(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

/// Writes a streamed reasoning fragment, dimmed.
pub fn display_thinking(text: &str) {
    print!("{}", text.dimmed());
    let _ = std::io::stdout().flush();
}

fn preview(payload: &str) -> String {
    let count = payload.chars().count();
    if count <= RESULT_PREVIEW_CHARS {
        return payload.to_string();
    }
    let head: String = payload.chars().take(RESULT_PREVIEW_CHARS).collect();
    format!("{head}... ({count} chars)")
}

/// Prints one line per tool status change.
pub fn display_tool_update(update: &ToolCallUpdate) {
    let name = update.name();
    match update.status() {
        ToolStatus::Pending => {
            println!(
                "\n{} {}{}",
                "⚙".bright_yellow(),
                name.bright_green(),
                format!("({})", update.call.function.arguments_json()).dimmed()
            );
        }
        ToolStatus::Success => {
            println!("  {} {}", "✓".bright_green(), name.bright_green());
            if let Some(payload) = update.payload() {
                println!("  {}", preview(payload).dimmed());
            }
        }
        ToolStatus::Error => {
            println!("  {} {}", "✗".bright_red(), name.bright_red());
            if let Some(payload) = update.payload() {
                println!("  {}", preview(payload).red());
            }
        }
    }
}

pub fn display_fallback(from: &str, to: &str) {
    eprintln!(
        "{} {from} is unavailable, retrying with {to}",
        "Warning:".bright_yellow()
    );
}

/// Prints the token and timing summary of a finished run.
pub fn display_metrics(metrics: &Metrics) {
    let mut line = format!(
        "[{}↑ {}↓",
        metrics.input_tokens.to_string().cyan(),
        metrics.output_tokens.to_string().green()
    );
    if metrics.thinking_tokens > 0 {
        line.push_str(&format!(" {}✻", metrics.thinking_tokens.to_string().magenta()));
    }
    line.push_str(&format!(
        " {} tools {:.1}s]",
        metrics.tool_calls.to_string().yellow(),
        metrics.elapsed().as_secs_f64()
    ));
    println!("{}", line.dimmed());
}

pub fn display_error(message: &str) {
    eprintln!("{} {message}", "Error:".bright_red());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_long_payloads() {
        let long = "é".repeat(250);
        let shown = preview(&long);
        assert!(shown.ends_with("... (250 chars)"));
        assert_eq!(shown.chars().filter(|c| *c == 'é').count(), 200);

        assert_eq!(preview("{\"ok\":true}"), "{\"ok\":true}");
    }
}
