//! crates/query_curation_core/src/export.rs
//!
//! Turns a set of query items into a downloadable file body: pretty JSON or
//! CSV, named `queries_<categoryId|all>_<ISO-date>.<ext>`.

use chrono::Utc;

use crate::csv::encode_csv;
use crate::domain::QueryItem;
use crate::ports::{PortError, PortResult};

/// The two supported export encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
        }
    }

    /// Parses the query-string spelling.
    pub fn parse(value: &str) -> PortResult<Self> {
        match value {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(PortError::Validation(format!(
                "unknown export format: {other}"
            ))),
        }
    }
}

/// A named, typed file body ready to hand to a download response.
#[derive(Debug)]
pub struct ExportFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub body: String,
}

/// The download name: scope segment (category id or `all`) plus today's date.
pub fn export_file_name(category_id: Option<&str>, format: ExportFormat) -> String {
    format!(
        "queries_{}_{}.{}",
        category_id.unwrap_or("all"),
        Utc::now().format("%Y-%m-%d"),
        format.extension()
    )
}

/// Encodes the items (already filtered to one category when `category_id` is
/// given) into an export file. Export covers every status; archiving hides an
/// item from the working list, not from a dataset dump.
pub fn export_queries(
    items: &[QueryItem],
    category_id: Option<&str>,
    format: ExportFormat,
) -> PortResult<ExportFile> {
    let filtered: Vec<&QueryItem> = match category_id {
        Some(id) => items.iter().filter(|q| q.category_id == id).collect(),
        None => items.iter().collect(),
    };

    let body = match format {
        ExportFormat::Json => serde_json::to_string_pretty(&filtered)
            .map_err(|e| PortError::Unexpected(format!("JSON export failed: {e}")))?,
        ExportFormat::Csv => {
            let owned: Vec<QueryItem> = filtered.into_iter().cloned().collect();
            encode_csv(&owned)
        }
    };

    Ok(ExportFile {
        file_name: export_file_name(category_id, format),
        content_type: format.content_type(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewQueryItem;

    fn item(category: &str, text: &str) -> QueryItem {
        NewQueryItem::manual(category.to_string(), text.to_string(), vec![]).into_item()
    }

    #[test]
    fn file_name_carries_scope_and_extension() {
        let all = export_file_name(None, ExportFormat::Json);
        assert!(all.starts_with("queries_all_"));
        assert!(all.ends_with(".json"));

        let scoped = export_file_name(Some("weather"), ExportFormat::Csv);
        assert!(scoped.starts_with("queries_weather_"));
        assert!(scoped.ends_with(".csv"));
    }

    #[test]
    fn category_filter_limits_the_export() {
        let items = vec![item("weather", "a"), item("traffic", "b"), item("weather", "c")];

        let file = export_queries(&items, Some("weather"), ExportFormat::Json).unwrap();
        let parsed: Vec<QueryItem> = serde_json::from_str(&file.body).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|q| q.category_id == "weather"));

        let everything = export_queries(&items, None, ExportFormat::Csv).unwrap();
        assert_eq!(everything.body.lines().count(), 4); // header + 3 rows
    }

    #[test]
    fn json_export_uses_camel_case_fields() {
        let items = vec![item("weather", "a")];
        let file = export_queries(&items, None, ExportFormat::Json).unwrap();
        assert!(file.body.contains("\"categoryId\""));
        assert!(file.body.contains("\"createdAt\""));
    }
}
