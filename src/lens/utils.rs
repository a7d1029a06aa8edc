//! Output helpers shared by lens modules

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default maximum length for statement previews in tables
pub const DEFAULT_PREVIEW_LEN: usize = 60;

/// Output format for lens results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Table with rounded borders (default)
    #[default]
    Table,
    /// Markdown table
    Markdown,
    /// Compact JSON
    Json,
    /// Indented JSON
    JsonPretty,
    /// Pipe-separated values with header
    Psv,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table | Self::Markdown)
    }

    pub fn all_names() -> &'static [&'static str] {
        &["table", "markdown", "json", "json-pretty", "psv"]
    }

    /// Serialize `value` as JSON in this format's style
    pub fn to_json<T: Serialize + ?Sized>(&self, value: &T) -> String {
        match self {
            Self::JsonPretty => serde_json::to_string_pretty(value).unwrap_or_default(),
            _ => serde_json::to_string(value).unwrap_or_default(),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Markdown => write!(f, "markdown"),
            Self::Json => write!(f, "json"),
            Self::JsonPretty => write!(f, "json-pretty"),
            Self::Psv => write!(f, "psv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "pretty" => Ok(Self::Table),
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            "json-pretty" | "jsonpretty" => Ok(Self::JsonPretty),
            "psv" | "pipe" => Ok(Self::Psv),
            _ => Err(format!(
                "Unknown output format '{}'. Valid formats: {}",
                s,
                Self::all_names().join(", ")
            )),
        }
    }
}

/// Render rows as a table in the given table style
///
/// Falls back to pretty JSON when the `display` feature is off.
#[cfg(feature = "display")]
pub fn render_table<T: tabled::Tabled + Serialize>(rows: &[T], format: OutputFormat) -> String {
    use tabled::settings::Style;
    use tabled::Table;

    match format {
        OutputFormat::Markdown => Table::new(rows).with(Style::markdown()).to_string(),
        _ => Table::new(rows).with(Style::rounded()).to_string(),
    }
}

#[cfg(not(feature = "display"))]
pub fn render_table<T: Serialize>(rows: &[T], _format: OutputFormat) -> String {
    serde_json::to_string_pretty(rows).unwrap_or_default()
}

/// One-line preview of a statement: whitespace collapsed, truncated with "..."
pub fn preview_statement(statement: &str, max_len: usize) -> String {
    let collapsed = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_len {
        collapsed
    } else {
        let truncated: String = collapsed.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_collapses_whitespace() {
        assert_eq!(
            preview_statement("CREATE TABLE users(\n    id INTEGER\n);", 60),
            "CREATE TABLE users( id INTEGER );"
        );
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(
            preview_statement("ALTER TABLE users ADD COLUMN email TEXT", 20),
            "ALTER TABLE users..."
        );
        assert_eq!(preview_statement("SELECT 1", 3), "...");
        assert_eq!(preview_statement("", 10), "");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("pretty").unwrap(), OutputFormat::Table);
        assert_eq!(OutputFormat::from_str("md").unwrap(), OutputFormat::Markdown);
        assert_eq!(
            OutputFormat::from_str("JSON-PRETTY").unwrap(),
            OutputFormat::JsonPretty
        );
        assert_eq!(OutputFormat::from_str("pipe").unwrap(), OutputFormat::Psv);
        assert!(OutputFormat::from_str("yaml").is_err());
    }

    #[test]
    fn test_output_format_kinds() {
        assert!(OutputFormat::Json.is_json());
        assert!(!OutputFormat::Psv.is_json());
        assert!(OutputFormat::Markdown.is_table());
        assert_eq!(OutputFormat::JsonPretty.to_string(), "json-pretty");
    }

    #[test]
    fn test_to_json() {
        let value = serde_json::json!({"a": 1});
        assert_eq!(OutputFormat::Json.to_json(&value), r#"{"a":1}"#);
        assert!(OutputFormat::JsonPretty.to_json(&value).contains('\n'));
    }
}
