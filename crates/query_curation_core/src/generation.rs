//! crates/query_curation_core/src/generation.rs
//!
//! Provider-independent pieces of the generation pipeline: the prompts every
//! provider sends, the count clamp, extraction of the JSON array a model was
//! asked to produce, and candidate deduplication before persistence.

use regex::Regex;

use crate::domain::{CategoryContext, GeneratedQuery};
use crate::ports::{PortError, PortResult};

/// Inclusive bounds on how many query candidates one call may request.
pub const MIN_GENERATE_COUNT: u8 = 1;
pub const MAX_GENERATE_COUNT: u8 = 20;

/// Marker appended to a bulk answer that exactly repeats an earlier one.
pub const DUPLICATE_ANSWER_MARKER: &str = " [duplicate answer]";

/// Clamps a requested candidate count into the allowed range.
pub fn clamp_count(requested: i64) -> u8 {
    requested.clamp(MIN_GENERATE_COUNT as i64, MAX_GENERATE_COUNT as i64) as u8
}

/// A system/user prompt pair, shaped per wire format by each adapter.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// The instruction set for generating query candidates in one category.
///
/// The model is told to answer with nothing but a JSON array so that
/// [`parse_query_candidates`] can find it in the raw response text.
pub fn query_generation_prompt(category: &CategoryContext, count: u8) -> Prompt {
    let system = "You are an expert at writing test-case utterances for a \
conversational AI agent. You produce short, natural spoken-language queries a \
real user would say, phrased in varied ways: questions, commands and \
confirmations. Every query gets 2-3 short topical tags. When a real public \
web page inspired a query, include its URL; otherwise leave the field as an \
empty string. Never repeat a query."
        .to_string();

    let user = format!(
        "Generate {count} natural-language user queries for the category \
\"{name}\" ({hint}).\n\nRespond with a JSON array only, in this exact shape:\n\
[\n  {{\"text\": \"the query\", \"tags\": [\"tag1\", \"tag2\"], \"sourceUrl\": \"url or empty string\"}},\n  ...\n]",
        name = category.name,
        hint = category.hint(),
    );

    Prompt { system, user }
}

/// The instruction set for answering one query in its category context.
pub fn answer_prompt(query_text: &str, category: &CategoryContext) -> Prompt {
    let system = format!(
        "You are the AI agent under test. Answer the user's query as if you \
had live access to a {hint} data source: concrete, concise and specific, with \
realistic figures and times where they fit, plus a short recommendation when \
one helps.",
        hint = category.hint(),
    );

    let user = format!(
        "User query: \"{query_text}\"\n\nAnswer it using the {hint} context.",
        hint = category.hint(),
    );

    Prompt { system, user }
}

/// Pulls the first JSON-array-shaped substring out of a raw model response
/// and parses it into candidates. Models often wrap the array in prose or
/// code fences; anything without a parseable array is a hard failure.
pub fn parse_query_candidates(raw: &str) -> PortResult<Vec<GeneratedQuery>> {
    // Greedy first-'[' to last-']', the widest span that can hold the array.
    let re = Regex::new(r"(?s)\[.*\]").expect("valid literal regex");
    let span = re
        .find(raw)
        .ok_or_else(|| PortError::MalformedResponse("no JSON array in response".to_string()))?;

    let candidates: Vec<GeneratedQuery> = serde_json::from_str(span.as_str())
        .map_err(|e| PortError::MalformedResponse(format!("invalid JSON array: {e}")))?;

    Ok(candidates)
}

/// The comparison key for dedup: trimmed, case-insensitive text.
fn dedup_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Drops candidates whose text already exists in the category or repeats an
/// earlier candidate in the same batch. Returns the survivors and the number
/// dropped.
pub fn dedup_candidates<'a, I>(
    candidates: Vec<GeneratedQuery>,
    existing_texts: I,
) -> (Vec<GeneratedQuery>, usize)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: std::collections::HashSet<String> =
        existing_texts.into_iter().map(dedup_key).collect();

    let total = candidates.len();
    let kept: Vec<GeneratedQuery> = candidates
        .into_iter()
        .filter(|c| !c.text.trim().is_empty() && seen.insert(dedup_key(&c.text)))
        .collect();

    let dropped = total - kept.len();
    (kept, dropped)
}

/// Tracks answers produced so far in one bulk run and appends the duplicate
/// marker to any exact (case-insensitive) repeat.
#[derive(Debug, Default)]
pub struct AnswerDedup {
    seen: std::collections::HashSet<String>,
}

impl AnswerDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an answer, returning it marked if it repeats a previous one.
    pub fn mark(&mut self, answer: String) -> String {
        if self.seen.insert(answer.to_lowercase()) {
            answer
        } else {
            format!("{answer}{DUPLICATE_ANSWER_MARKER}")
        }
    }
}
