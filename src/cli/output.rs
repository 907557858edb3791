//! Output formatting for CLI commands.
//!
//! Supports text and JSON output formats. Engine operations already
//! render human-readable bundles; JSON mode wraps them for
//! programmatic consumption.

use crate::error::Error;
use serde::Serialize;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Wraps successful command output for the selected format.
#[must_use]
pub fn format_output(output: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => output.to_string(),
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Wrapper<'a> {
                ok: bool,
                output: &'a str,
            }
            serde_json::to_string_pretty(&Wrapper { ok: true, output })
                .unwrap_or_else(|_| "{\"ok\":false}".to_string())
        }
    }
}

/// Formats an error for the selected format.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Wrapper {
                ok: bool,
                error: String,
            }
            serde_json::to_string_pretty(&Wrapper {
                ok: false,
                error: error.to_string(),
            })
            .unwrap_or_else(|_| "{\"ok\":false}".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("anything"), OutputFormat::Text);
    }

    #[test]
    fn test_format_output_text_passthrough() {
        assert_eq!(format_output("hello", OutputFormat::Text), "hello");
    }

    #[test]
    fn test_format_output_json_wraps() {
        let json = format_output("hello", OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["output"], "hello");
    }

    #[test]
    fn test_format_error_both_modes() {
        let error: Error = StoreError::BlobNotFound {
            hash: "abcd".to_string(),
        }
        .into();

        let text = format_error(&error, OutputFormat::Text);
        assert!(text.contains("blob not found"));

        let json = format_error(&error, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ok"], false);
        assert!(value["error"].as_str().unwrap().contains("abcd"));
    }
}
