//! crates/query_curation_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or HTTP wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named grouping of query items with a display icon.
///
/// Ids are opaque strings. Server-created categories get a UUID string, but
/// imports may reference any id a user has (readable slugs included), so the
/// id is not typed as `Uuid`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Creates a category with a generated id and current timestamps.
    pub fn new(name: String, description: String, icon: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            icon,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Where a query item came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuerySource {
    Generated,
    Manual,
}

impl QuerySource {
    /// Parses the CSV/API spelling, falling back to `Manual` for anything
    /// unrecognized (imports must not fail a row over this field).
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim() {
            "generated" => Self::Generated,
            _ => Self::Manual,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Manual => "manual",
        }
    }
}

/// Whether a query item is live or shelved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Active,
    Archived,
}

impl QueryStatus {
    /// Parses the CSV/API spelling, falling back to `Active`.
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim() {
            "archived" => Self::Archived,
            _ => Self::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

/// Token accounting a provider reported for one generation call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single test-case utterance plus its metadata and optional answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryItem {
    pub id: String,
    pub category_id: String,
    pub text: String,
    pub tags: Vec<String>,
    pub source: QuerySource,
    pub status: QueryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_tokens: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_tokens: Option<TokenUsage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The insert shape of a query item: everything except the id and timestamps,
/// which the store assigns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewQueryItem {
    pub category_id: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: QuerySource,
    pub status: QueryStatus,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub ai_engine: Option<String>,
    #[serde(default)]
    pub query_length: Option<usize>,
    #[serde(default)]
    pub query_tokens: Option<TokenUsage>,
}

impl NewQueryItem {
    /// A manual, active item with just text and a category.
    pub fn manual(category_id: String, text: String, tags: Vec<String>) -> Self {
        Self {
            category_id,
            text,
            tags,
            source: QuerySource::Manual,
            status: QueryStatus::Active,
            answer: None,
            source_url: None,
            ai_engine: None,
            query_length: None,
            query_tokens: None,
        }
    }

    /// Materializes the insert shape into a full item.
    pub fn into_item(self) -> QueryItem {
        let now = Utc::now();
        QueryItem {
            id: Uuid::new_v4().to_string(),
            category_id: self.category_id,
            text: self.text,
            tags: self.tags,
            source: self.source,
            status: self.status,
            answer: self.answer,
            source_url: self.source_url,
            ai_engine: self.ai_engine,
            query_length: self.query_length,
            answer_length: None,
            query_tokens: self.query_tokens,
            answer_tokens: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A field-level patch for a query item. `None` leaves the field alone;
/// `answer` distinguishes "absent" from "set to null" so answers can be
/// cleared.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPatch {
    pub category_id: Option<String>,
    pub text: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<QueryStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub answer: Option<Option<String>>,
    pub ai_engine: Option<String>,
    pub answer_length: Option<usize>,
    pub answer_tokens: Option<TokenUsage>,
}

/// A field-level patch for a category.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

// Keeps "field absent" distinct from "field: null" when deserializing patches.
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// One candidate returned by a query-generation call, before dedup
/// and persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuery {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// The result of a single answer-generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// The category context handed to a provider when shaping prompts.
#[derive(Debug, Clone)]
pub struct CategoryContext {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl CategoryContext {
    /// The free-text hint a prompt embeds: the description when the user
    /// wrote one, otherwise the name.
    pub fn hint(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.name
        } else {
            &self.description
        }
    }
}

impl From<&Category> for CategoryContext {
    fn from(c: &Category) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            description: c.description.clone(),
        }
    }
}

/// Which backend performs text generation. A closed union: each variant owns
/// its credentials and its model choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSelection {
    /// The zero-configuration default gateway (server-side secret).
    Gateway { model: String },
    /// Direct OpenAI API with a user-supplied key.
    OpenAiDirect { api_key: String, model: String },
    /// Direct Gemini API with a user-supplied key.
    GeminiDirect { api_key: String, model: String },
}

impl ProviderSelection {
    /// The engine label recorded on items produced through this provider.
    pub fn engine_label(&self) -> String {
        match self {
            Self::Gateway { model } => format!("gateway/{model}"),
            Self::OpenAiDirect { model, .. } => format!("openai/{model}"),
            Self::GeminiDirect { model, .. } => format!("gemini/{model}"),
        }
    }
}

/// Per-user generation preferences, persisted behind the settings port.
/// API keys are deliberately not part of this: they travel per-request only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub provider: ProviderKind,
    pub generate_count: u8,
    pub gateway_model: String,
    pub openai_model: String,
    pub gemini_model: String,
}

/// The provider a user has picked in settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gateway,
    OpenAi,
    Gemini,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gateway,
            generate_count: 5,
            gateway_model: "google/gemini-2.5-flash".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            gemini_model: "gemini-2.5-flash".to_string(),
        }
    }
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}
