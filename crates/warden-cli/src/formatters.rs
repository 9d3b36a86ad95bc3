//! Output formatters for CLI commands.
//!
//! Every command renders a serializable value in one of three modes:
//! - `json`: pretty-printed JSON
//! - `text`: one `dotted.key=value` line per scalar, for scripts
//! - `pretty`: indented, colorized `key: value` tree

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use warden_core::cli::OutputFormat;

/// Format data according to the specified output format.
///
/// # Errors
///
/// Returns an error if the data cannot be serialized.
///
/// # Examples
///
/// ```
/// use warden_cli::formatters::format_output;
/// use warden_core::cli::OutputFormat;
///
/// let data = serde_json::json!({"name": "warden-plugin-a", "hooks": {"push": 10}});
/// let output = format_output(&data, OutputFormat::Text)?;
/// assert_eq!(output, "hooks.push=10\nname=warden-plugin-a");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn format_output<T: Serialize>(data: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => json::format(data),
        OutputFormat::Text => text::format(data),
        OutputFormat::Pretty => pretty::format(data),
    }
}

/// JSON output formatting.
pub mod json {
    use super::{Result, Serialize};

    /// Format data as indented JSON.
    pub fn format<T: Serialize>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }
}

/// Flat `key=value` output.
pub mod text {
    use super::{Result, Serialize, Value};

    /// Format data as `dotted.key=value` lines. Array elements use their
    /// index as the key segment.
    pub fn format<T: Serialize>(data: &T) -> Result<String> {
        let value = serde_json::to_value(data)?;
        let mut lines = Vec::new();
        flatten("", &value, &mut lines);
        Ok(lines.join("\n"))
    }

    fn flatten(prefix: &str, value: &Value, lines: &mut Vec<String>) {
        let key = |segment: &str| {
            if prefix.is_empty() {
                segment.to_string()
            } else {
                format!("{prefix}.{segment}")
            }
        };
        match value {
            Value::Object(map) => {
                for (name, child) in map {
                    flatten(&key(name), child, lines);
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    flatten(&key(&index.to_string()), child, lines);
                }
            }
            Value::String(s) => lines.push(format!("{prefix}={s}")),
            Value::Null => lines.push(format!("{prefix}=")),
            scalar => lines.push(format!("{prefix}={scalar}")),
        }
    }
}

/// Human-readable, colorized output.
pub mod pretty {
    use super::{Colorize, Result, Serialize, Value};

    /// Format data as an indented tree.
    pub fn format<T: Serialize>(data: &T) -> Result<String> {
        let value = serde_json::to_value(data)?;
        let mut out = String::new();
        match &value {
            Value::Object(_) | Value::Array(_) => write_nested(&value, 0, &mut out),
            scalar => out.push_str(&scalar_text(scalar)),
        }
        Ok(out.trim_end().to_string())
    }

    fn write_nested(value: &Value, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        match value {
            Value::Object(map) if map.is_empty() => {}
            Value::Object(map) => {
                for (name, child) in map {
                    out.push_str(&indent);
                    out.push_str(&name.blue().bold().to_string());
                    out.push(':');
                    write_child(child, depth, out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    out.push_str(&indent);
                    out.push('-');
                    write_child(item, depth, out);
                }
            }
            scalar => {
                out.push_str(&indent);
                out.push_str(&scalar_text(scalar));
                out.push('\n');
            }
        }
    }

    fn write_child(child: &Value, depth: usize, out: &mut String) {
        match child {
            Value::Object(map) if map.is_empty() => out.push_str(" {}\n"),
            Value::Array(items) if items.is_empty() => out.push_str(" []\n"),
            Value::Object(_) | Value::Array(_) => {
                out.push('\n');
                write_nested(child, depth + 1, out);
            }
            scalar => {
                out.push(' ');
                out.push_str(&scalar_text(scalar));
                out.push('\n');
            }
        }
    }

    fn scalar_text(value: &Value) -> String {
        match value {
            Value::Null => "-".dimmed().to_string(),
            Value::Bool(b) => b.to_string().yellow().to_string(),
            Value::Number(n) => n.to_string().cyan().to_string(),
            Value::String(s) => s.green().to_string(),
            other => other.to_string(),
        }
    }
}
