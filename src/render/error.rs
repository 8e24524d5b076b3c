//! Fatal error rendering.
//!
//! Errors that stop the whole run (bad config, unreadable device list) are
//! printed with their code and fix suggestions. Per-device errors never come
//! through here; they end up in the result records.

use colored::Colorize;

use crate::cli::args::OutputFormat;
use crate::error::{FixSuggestion, ScanError};

// =============================================================================
// Public API
// =============================================================================

/// Render a fatal error for the given format.
///
/// Human output is colored only when `no_color` is off and stderr is a
/// terminal; otherwise it falls back to two plain lines.
#[must_use]
pub fn render_error(error: &ScanError, format: OutputFormat, no_color: bool) -> String {
    match format {
        OutputFormat::Json => render_error_json(error),
        OutputFormat::Human if !no_color && crate::util::env::stderr_is_tty() => {
            render_colored(error)
        }
        OutputFormat::Human => render_simple(error),
    }
}

/// Render error as structured JSON for machine consumption.
#[must_use]
pub fn render_error_json(error: &ScanError) -> String {
    serde_json::to_string_pretty(&ErrorJson::from_error(error))
        .unwrap_or_else(|_| render_simple(error))
}

// =============================================================================
// Terminal Rendering
// =============================================================================

fn render_colored(error: &ScanError) -> String {
    let suggestions = error.fix_suggestions();
    let mut lines = vec![format!(
        "{} {}",
        error.to_string().red().bold(),
        format!("[{}]", error.error_code()).bright_black()
    )];

    if !suggestions.is_empty() {
        lines.push(String::new());
        lines.push(render_suggestions_section(&suggestions));
    }

    if let Some(suggestion) = suggestions.first() {
        if !suggestion.context.is_empty() {
            lines.push(String::new());
            lines.push("Why this happened:".yellow().to_string());
            lines.extend(wrap_text(&suggestion.context, 70).into_iter().map(|l| format!("  {l}")));
        }
        if let Some(prevention) = &suggestion.prevention {
            lines.push(String::new());
            lines.push("Prevention:".green().to_string());
            lines.extend(wrap_text(prevention, 70).into_iter().map(|l| format!("  {l}")));
        }
    }

    lines.join("\n")
}

fn render_suggestions_section(suggestions: &[FixSuggestion]) -> String {
    let mut lines = vec!["How to fix:".bold().to_string()];
    for (i, suggestion) in suggestions.iter().enumerate() {
        for (j, cmd) in suggestion.commands.iter().enumerate() {
            let prefix = if j == 0 {
                format!("  {}. ", i + 1)
            } else {
                "     Or: ".to_string()
            };
            lines.push(format!("{prefix}{}", cmd.cyan()));
        }
    }
    lines.join("\n")
}

/// Render error as simple text (no ANSI codes).
fn render_simple(error: &ScanError) -> String {
    let mut lines = vec![format!("Error [{}]: {}", error.error_code(), error)];
    let fix = error
        .fix_suggestions()
        .into_iter()
        .flat_map(|s| s.commands)
        .find(|cmd| !cmd.starts_with('#'));
    if let Some(cmd) = fix {
        lines.push(format!("Fix: {cmd}"));
    }
    lines.join("\n")
}

// =============================================================================
// JSON Rendering
// =============================================================================

/// JSON representation of an error for machine consumption.
#[derive(serde::Serialize)]
struct ErrorJson {
    error_code: &'static str,
    category: String,
    message: String,
    is_retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    suggestions: Vec<SuggestionJson>,
}

#[derive(serde::Serialize)]
struct SuggestionJson {
    commands: Vec<String>,
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prevention: Option<String>,
}

impl ErrorJson {
    fn from_error(error: &ScanError) -> Self {
        Self {
            error_code: error.error_code(),
            category: error.category().to_string(),
            message: error.to_string(),
            is_retryable: error.is_retryable(),
            host: error.host().map(String::from),
            suggestions: error
                .fix_suggestions()
                .into_iter()
                .map(|s| SuggestionJson {
                    commands: s.commands,
                    context: s.context,
                    prevention: s.prevention,
                })
                .collect(),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn input_error() -> ScanError {
        ScanError::InputFile {
            path: "devices.csv".to_string(),
            message: "No such file or directory".to_string(),
        }
    }

    #[test]
    fn simple_render_includes_code_and_fix() {
        let output = render_simple(&input_error());
        assert!(output.starts_with("Error [BIGSCAN-C004]"));
        assert!(output.contains("devices.csv"));
        assert!(output.contains("\nFix: "));
        assert!(!output.contains("\x1b["));
    }

    #[test]
    fn no_color_human_is_plain() {
        let output = render_error(&input_error(), OutputFormat::Human, true);
        assert_eq!(output, render_simple(&input_error()));
    }

    #[test]
    fn json_render_is_structured() {
        let err = ScanError::ConnectionRefused {
            host: "10.0.0.9".to_string(),
        };
        let json: Value = serde_json::from_str(&render_error_json(&err)).unwrap();
        assert_eq!(json["error_code"], err.error_code());
        assert_eq!(json["host"], "10.0.0.9");
        assert_eq!(json["is_retryable"], true);
        assert!(json["suggestions"].as_array().is_some_and(|s| !s.is_empty()));
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("one two three four five six", 9);
        assert!(lines.iter().all(|l| l.len() <= 9));
        assert_eq!(lines.join(" "), "one two three four five six");
    }
}
