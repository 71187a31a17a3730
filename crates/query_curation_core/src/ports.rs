//! crates/query_curation_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of specific external implementations like databases
//! or provider APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AiSettings, Category, CategoryContext, CategoryPatch, GeneratedAnswer, GeneratedQuery,
    NewQueryItem, QueryItem, QueryPatch, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
///
/// Store-side failures and the provider error taxonomy live in one enum so a
/// handler can map every outcome to a user-facing message without peeking at
/// adapter internals. Provider variants are never retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Provider API key is missing or invalid: {0}")]
    InvalidApiKey(String),
    #[error("Provider rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("Provider quota or credit exhausted: {0}")]
    QuotaExhausted(String),
    #[error("Provider returned an unparseable response: {0}")]
    MalformedResponse(String),
    #[error("Provider request failed: {0}")]
    Upstream(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The category/query data store. Every operation is scoped to one user;
/// implementations must never let one user's rows leak into another's view.
///
/// Implementations are expected to enforce referential integrity: any
/// operation that writes a `category_id` fails with `Validation` when that
/// category does not exist for the user.
#[async_trait]
pub trait QueryStore: Send + Sync {
    // --- Categories ---
    async fn list_categories(&self, user_id: Uuid) -> PortResult<Vec<Category>>;

    async fn add_category(&self, user_id: Uuid, category: Category) -> PortResult<Category>;

    async fn update_category(
        &self,
        user_id: Uuid,
        category_id: &str,
        patch: CategoryPatch,
    ) -> PortResult<Category>;

    /// Deletes the category and every query that references it.
    /// Returns the number of cascaded query deletions.
    async fn delete_category(&self, user_id: Uuid, category_id: &str) -> PortResult<u64>;

    // --- Queries ---
    async fn list_queries(&self, user_id: Uuid) -> PortResult<Vec<QueryItem>>;

    /// Active queries in one category.
    async fn get_queries_by_category(
        &self,
        user_id: Uuid,
        category_id: &str,
    ) -> PortResult<Vec<QueryItem>>;

    async fn add_query(&self, user_id: Uuid, query: NewQueryItem) -> PortResult<QueryItem>;

    /// Batch insert. All-or-nothing: one bad category id fails the batch.
    async fn add_queries(
        &self,
        user_id: Uuid,
        queries: Vec<NewQueryItem>,
    ) -> PortResult<Vec<QueryItem>>;

    async fn update_query(
        &self,
        user_id: Uuid,
        query_id: &str,
        patch: QueryPatch,
    ) -> PortResult<QueryItem>;

    async fn delete_query(&self, user_id: Uuid, query_id: &str) -> PortResult<()>;
}

/// User accounts and cookie auth sessions.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}

/// Load/save contract for per-user generation settings. Injected where it is
/// needed rather than read as ambient state; `load` returns defaults for a
/// user who has never saved.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_settings(&self, user_id: Uuid) -> PortResult<AiSettings>;

    async fn save_settings(&self, user_id: Uuid, settings: AiSettings) -> PortResult<()>;
}

/// One text-generation backend. Each provider adapter owns its request
/// shaping and its mapping from wire errors onto [`PortError`].
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generates up to `count` query candidates for the category. `count`
    /// has already been clamped to the allowed range by the caller.
    async fn generate_queries(
        &self,
        category: &CategoryContext,
        count: u8,
    ) -> PortResult<Vec<GeneratedQuery>>;

    /// Generates a free-text answer for one query, with token usage when the
    /// provider reports it.
    async fn generate_answer(
        &self,
        query_text: &str,
        category: &CategoryContext,
    ) -> PortResult<GeneratedAnswer>;
}
