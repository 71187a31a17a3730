//! crates/query_curation_core/src/csv.rs
//!
//! CSV encode/decode for query items, plus the import-side validation and
//! sanitization rules. The format is line-oriented: a header row names the
//! columns, free-text fields are quoted with internal quotes doubled, and
//! newlines inside free text are carried as the literal two-character
//! sequence `\n` so one record always occupies one line.

use std::collections::HashSet;

use crate::domain::{NewQueryItem, QueryItem, QuerySource, QueryStatus};

/// Whole-payload ceiling before any row is looked at.
pub const MAX_IMPORT_BYTES: usize = 1024 * 1024;
/// Data-row ceiling (header excluded).
pub const MAX_IMPORT_ROWS: usize = 1000;
/// Per-field caps applied during sanitization.
pub const MAX_TEXT_CHARS: usize = 1000;
pub const MAX_ANSWER_CHARS: usize = 4000;
pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_CHARS: usize = 50;

/// Column order used for export and for positional fallback on import.
pub const CSV_HEADERS: [&str; 15] = [
    "id",
    "categoryId",
    "text",
    "tags",
    "source",
    "status",
    "answer",
    "sourceUrl",
    "aiEngine",
    "queryLength",
    "answerLength",
    "queryTokens",
    "answerTokens",
    "createdAt",
    "updatedAt",
];

/// The outcome of a CSV import: rows that passed validation, and one
/// human-readable message per row (or payload) that did not. Partial success
/// is normal; ceiling violations reject wholesale and leave `items` empty.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub items: Vec<NewQueryItem>,
    pub errors: Vec<String>,
}

//=========================================================================================
// Encoding
//=========================================================================================

/// Serializes query items into CSV with the [`CSV_HEADERS`] column order.
pub fn encode_csv(items: &[QueryItem]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_HEADERS.join(","));
    for q in items {
        out.push('\n');
        let row = [
            q.id.clone(),
            q.category_id.clone(),
            quote(&q.text),
            quote(&q.tags.join(";")),
            q.source.as_str().to_string(),
            q.status.as_str().to_string(),
            quote(q.answer.as_deref().unwrap_or("")),
            quote(q.source_url.as_deref().unwrap_or("")),
            q.ai_engine.clone().unwrap_or_default(),
            q.query_length.map(|n| n.to_string()).unwrap_or_default(),
            q.answer_length.map(|n| n.to_string()).unwrap_or_default(),
            usage_cell(&q.query_tokens),
            usage_cell(&q.answer_tokens),
            q.created_at.to_rfc3339(),
            q.updated_at.to_rfc3339(),
        ];
        out.push_str(&row.join(","));
    }
    out
}

/// Quotes a free-text field: internal quotes doubled, newlines flattened to
/// the literal escape.
fn quote(value: &str) -> String {
    let escaped = value.replace('"', "\"\"").replace('\n', "\\n");
    format!("\"{escaped}\"")
}

fn usage_cell(usage: &Option<crate::domain::TokenUsage>) -> String {
    match usage {
        // to_string on a plain struct cannot fail
        Some(u) => quote(&serde_json::to_string(u).unwrap_or_default()),
        None => String::new(),
    }
}

//=========================================================================================
// Decoding + sanitization
//=========================================================================================

/// Parses a CSV payload into validated insert rows.
///
/// `valid_category_ids` is the live set for the importing user; rows that
/// reference anything else are rejected individually. Column positions come
/// from the header row by name, with positional fallback for the core columns
/// when the expected names are absent.
pub fn parse_csv(content: &str, valid_category_ids: &HashSet<String>) -> ImportReport {
    let mut report = ImportReport::default();

    if content.len() > MAX_IMPORT_BYTES {
        report.errors.push(format!(
            "File is too large. The maximum allowed size is {} KB.",
            MAX_IMPORT_BYTES / 1024
        ));
        return report;
    }

    let lines: Vec<&str> = content.trim().split('\n').collect();
    if lines.len() < 2 {
        report
            .errors
            .push("The CSV file contains no data rows.".to_string());
        return report;
    }
    if lines.len() - 1 > MAX_IMPORT_ROWS {
        report.errors.push(format!(
            "Too many rows. The maximum allowed is {MAX_IMPORT_ROWS}."
        ));
        return report;
    }

    let headers: Vec<String> = lines[0].split(',').map(|h| h.trim().to_string()).collect();
    let col = |name: &str| headers.iter().position(|h| h == name);

    // Core columns fall back to their canonical positions when the header
    // does not name them; the rest are header-only with safe defaults.
    let category_idx = col("categoryId").unwrap_or(1);
    let text_idx = col("text").unwrap_or(2);
    let tags_idx = col("tags").unwrap_or(3);
    let source_idx = col("source");
    let status_idx = col("status");
    let answer_idx = col("answer");
    let source_url_idx = col("sourceUrl");
    let ai_engine_idx = col("aiEngine");

    for (i, line) in lines.iter().enumerate().skip(1) {
        let row_no = i + 1;
        let values = split_row(line);

        let get = |idx: usize| values.get(idx).map(String::as_str).unwrap_or("");
        let get_opt = |idx: Option<usize>| idx.map(get).unwrap_or("");

        let category_id = get(category_idx).to_string();
        if category_id.is_empty() || !valid_category_ids.contains(&category_id) {
            report
                .errors
                .push(format!("Row {row_no}: unknown category id."));
            continue;
        }

        let text = sanitize_text(&unescape(get(text_idx)), MAX_TEXT_CHARS);
        if text.is_empty() {
            report
                .errors
                .push(format!("Row {row_no}: query text is empty."));
            continue;
        }

        let tags = sanitize_tags(get(tags_idx));
        let answer = match unescape(get_opt(answer_idx)) {
            a if a.is_empty() => None,
            a => Some(sanitize_text(&a, MAX_ANSWER_CHARS)),
        };
        let source_url = match get_opt(source_url_idx) {
            "" => None,
            u => Some(u.to_string()),
        };
        let ai_engine = match get_opt(ai_engine_idx) {
            "" => None,
            e => Some(e.to_string()),
        };

        report.items.push(NewQueryItem {
            category_id,
            text,
            tags,
            source: QuerySource::parse_or_default(get_opt(source_idx)),
            status: QueryStatus::parse_or_default(get_opt(status_idx)),
            answer,
            source_url,
            ai_engine,
            query_length: None,
            query_tokens: None,
        });
    }

    report
}

/// Splits one CSV line into fields. A quote toggles the in-quotes flag, a
/// doubled quote inside a quoted field yields one literal quote, and commas
/// inside quotes are not separators. Fields come back trimmed.
fn split_row(line: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                values.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    values.push(current.trim().to_string());
    values
}

/// Restores the literal `\n` escape produced by [`encode_csv`].
fn unescape(value: &str) -> String {
    value.replace("\\n", "\n")
}

/// Truncates to `max` characters and neutralizes spreadsheet formula
/// injection: a value whose first character is one of `=`, `+`, `-`, `@`,
/// tab or carriage return gets a leading `'`.
fn sanitize_text(value: &str, max: usize) -> String {
    let truncated: String = value.chars().take(max).collect();
    match truncated.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t' | '\r') => format!("'{truncated}"),
        _ => truncated,
    }
}

fn sanitize_tags(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .take(MAX_TAGS)
        .map(|t| sanitize_text(t, MAX_TAG_CHARS))
        .collect()
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewQueryItem, QuerySource, QueryStatus};

    fn categories(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn item(category: &str, text: &str, tags: &[&str]) -> QueryItem {
        NewQueryItem::manual(
            category.to_string(),
            text.to_string(),
            tags.iter().map(|t| t.to_string()).collect(),
        )
        .into_item()
    }

    #[test]
    fn round_trip_preserves_text_tags_and_category() {
        let items = vec![
            item("weather", "Will it rain today?", &["rain", "weather"]),
            item("traffic", "How busy is the bridge, right now?", &["bridge"]),
            item("weather", "Line one\nline two", &[]),
            item("weather", "She said \"go left\" twice", &["quote"]),
        ];
        let csv = encode_csv(&items);
        let report = parse_csv(&csv, &categories(&["weather", "traffic"]));

        assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
        assert_eq!(report.items.len(), items.len());
        for (parsed, original) in report.items.iter().zip(&items) {
            assert_eq!(parsed.text, original.text);
            assert_eq!(parsed.tags, original.tags);
            assert_eq!(parsed.category_id, original.category_id);
        }
    }

    #[test]
    fn minimal_headers_import_with_defaults() {
        let csv = "text,categoryId\n\"Test query\",weather";
        let report = parse_csv(csv, &categories(&["weather"]));

        assert!(report.errors.is_empty());
        assert_eq!(report.items.len(), 1);
        let q = &report.items[0];
        assert_eq!(q.text, "Test query");
        assert_eq!(q.category_id, "weather");
        assert_eq!(q.source, QuerySource::Manual);
        assert_eq!(q.status, QueryStatus::Active);
    }

    #[test]
    fn positional_fallback_when_headers_missing() {
        // No recognized names: categoryId/text/tags fall back to columns 1-3.
        let csv = "a,b,c,d\nx1,weather,\"hello there\",\"one;two\"";
        let report = parse_csv(csv, &categories(&["weather"]));

        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].category_id, "weather");
        assert_eq!(report.items[0].text, "hello there");
        assert_eq!(report.items[0].tags, vec!["one", "two"]);
    }

    #[test]
    fn commas_inside_quotes_are_not_separators() {
        let csv = "text,categoryId\n\"First, second, third\",weather";
        let report = parse_csv(csv, &categories(&["weather"]));
        assert_eq!(report.items[0].text, "First, second, third");
    }

    #[test]
    fn doubled_quotes_reconstruct() {
        let csv = "text,categoryId\n\"say \"\"hi\"\" now\",weather";
        let report = parse_csv(csv, &categories(&["weather"]));
        assert_eq!(report.items[0].text, "say \"hi\" now");
    }

    #[test]
    fn escaped_newlines_restore() {
        let csv = "text,categoryId,answer\n\"q\",weather,\"line one\\nline two\"";
        let report = parse_csv(csv, &categories(&["weather"]));
        assert_eq!(report.items[0].answer.as_deref(), Some("line one\nline two"));
    }

    #[test]
    fn unknown_category_fails_row_but_not_import() {
        let csv = "text,categoryId\n\"good\",weather\n\"bad\",nope";
        let report = parse_csv(csv, &categories(&["weather"]));

        assert_eq!(report.items.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("Row 3"));
    }

    #[test]
    fn formula_prefixes_are_neutralized() {
        // Tab and CR are also covered by the sanitizer, but field trimming
        // strips them before it runs, so only the four printable triggers
        // are observable through an import.
        for lead in ["=SUM(A1)", "+1+2", "-cmd", "@foo"] {
            let csv = format!("text,categoryId\n\"{lead}\",weather");
            let report = parse_csv(&csv, &categories(&["weather"]));
            assert_eq!(report.items[0].text, format!("'{lead}"));
        }
    }

    #[test]
    fn oversize_payload_rejects_wholesale() {
        let mut csv = String::from("text,categoryId\n");
        csv.push_str(&"x".repeat(MAX_IMPORT_BYTES + 1));
        let report = parse_csv(&csv, &categories(&["weather"]));
        assert!(report.items.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn too_many_rows_rejects_wholesale() {
        let mut csv = String::from("text,categoryId");
        for i in 0..(MAX_IMPORT_ROWS + 1) {
            csv.push_str(&format!("\n\"q{i}\",weather"));
        }
        let report = parse_csv(&csv, &categories(&["weather"]));
        assert!(report.items.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn long_fields_and_tags_are_capped() {
        let long_text = "y".repeat(MAX_TEXT_CHARS + 50);
        let many_tags = (0..20).map(|i| format!("t{i}")).collect::<Vec<_>>().join(";");
        let csv = format!("text,categoryId,tags\n\"{long_text}\",weather,\"{many_tags}\"");
        let report = parse_csv(&csv, &categories(&["weather"]));

        let q = &report.items[0];
        assert_eq!(q.text.chars().count(), MAX_TEXT_CHARS);
        assert_eq!(q.tags.len(), MAX_TAGS);
    }

    #[test]
    fn bad_enum_values_coerce_to_defaults() {
        let csv = "text,categoryId,source,status\n\"q\",weather,robot,frozen";
        let report = parse_csv(csv, &categories(&["weather"]));
        assert_eq!(report.items[0].source, QuerySource::Manual);
        assert_eq!(report.items[0].status, QueryStatus::Active);
    }
}
