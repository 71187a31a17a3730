//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete
//! implementation of the store ports from the `core` crate. It handles all
//! interactions with the PostgreSQL database using `sqlx`.
//!
//! Queries use the runtime API with explicit record structs; ids and
//! timestamps are generated in Rust so the in-memory store and this adapter
//! agree on record shape.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use query_curation_core::domain::{
    AiSettings, Category, CategoryPatch, NewQueryItem, QueryItem, QueryPatch, QuerySource,
    QueryStatus, TokenUsage, User, UserCredentials,
};
use query_curation_core::ports::{
    AuthStore, PortError, PortResult, QueryStore, SettingsStore,
};

// Postgres error codes used to translate constraint failures.
const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps constraint violations from insert/update paths onto port errors.
fn map_write_err(e: sqlx::Error) -> PortError {
    if let Some(db_err) = e.as_database_error() {
        match db_err.code().as_deref() {
            Some(FOREIGN_KEY_VIOLATION) => {
                return PortError::Validation("unknown category id".to_string())
            }
            Some(UNIQUE_VIOLATION) => {
                return PortError::Validation("id already exists".to_string())
            }
            _ => {}
        }
    }
    unexpected(e)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct CategoryRecord {
    id: String,
    name: String,
    description: String,
    icon: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CategoryRecord {
    fn to_domain(self) -> Category {
        Category {
            id: self.id,
            name: self.name,
            description: self.description,
            icon: self.icon,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct QueryRecord {
    id: String,
    category_id: String,
    text: String,
    tags: Vec<String>,
    source: String,
    status: String,
    answer: Option<String>,
    source_url: Option<String>,
    ai_engine: Option<String>,
    query_length: Option<i32>,
    answer_length: Option<i32>,
    query_tokens: Option<Json<TokenUsage>>,
    answer_tokens: Option<Json<TokenUsage>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl QueryRecord {
    fn to_domain(self) -> QueryItem {
        QueryItem {
            id: self.id,
            category_id: self.category_id,
            text: self.text,
            tags: self.tags,
            source: QuerySource::parse_or_default(&self.source),
            status: QueryStatus::parse_or_default(&self.status),
            answer: self.answer,
            source_url: self.source_url,
            ai_engine: self.ai_engine,
            query_length: self.query_length.map(|n| n as usize),
            answer_length: self.answer_length.map(|n| n as usize),
            query_tokens: self.query_tokens.map(|j| j.0),
            answer_tokens: self.answer_tokens.map(|j| j.0),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const QUERY_COLUMNS: &str = "id, category_id, text, tags, source, status, answer, source_url, \
     ai_engine, query_length, answer_length, query_tokens, answer_tokens, created_at, updated_at";

async fn insert_query<'e, E>(executor: E, user_id: Uuid, item: &QueryItem) -> PortResult<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO queries (id, user_id, category_id, text, tags, source, status, answer, \
         source_url, ai_engine, query_length, query_tokens, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(&item.id)
    .bind(user_id)
    .bind(&item.category_id)
    .bind(&item.text)
    .bind(&item.tags)
    .bind(item.source.as_str())
    .bind(item.status.as_str())
    .bind(&item.answer)
    .bind(&item.source_url)
    .bind(&item.ai_engine)
    .bind(item.query_length.map(|n| n as i32))
    .bind(item.query_tokens.map(Json))
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(executor)
    .await
    .map_err(map_write_err)?;
    Ok(())
}

//=========================================================================================
// `QueryStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl QueryStore for DbAdapter {
    async fn list_categories(&self, user_id: Uuid) -> PortResult<Vec<Category>> {
        let records = sqlx::query_as::<_, CategoryRecord>(
            "SELECT id, name, description, icon, created_at, updated_at FROM categories \
             WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn add_category(&self, user_id: Uuid, category: Category) -> PortResult<Category> {
        sqlx::query(
            "INSERT INTO categories (id, user_id, name, description, icon, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&category.id)
        .bind(user_id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.icon)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_err)?;

        Ok(category)
    }

    async fn update_category(
        &self,
        user_id: Uuid,
        category_id: &str,
        patch: CategoryPatch,
    ) -> PortResult<Category> {
        let record = sqlx::query_as::<_, CategoryRecord>(
            "UPDATE categories SET \
               name = COALESCE($3, name), \
               description = COALESCE($4, description), \
               icon = COALESCE($5, icon), \
               updated_at = now() \
             WHERE user_id = $1 AND id = $2 \
             RETURNING id, name, description, icon, created_at, updated_at",
        )
        .bind(user_id)
        .bind(category_id)
        .bind(patch.name)
        .bind(patch.description)
        .bind(patch.icon)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Category {category_id} not found"))
            }
            _ => unexpected(e),
        })?;

        Ok(record.to_domain())
    }

    async fn delete_category(&self, user_id: Uuid, category_id: &str) -> PortResult<u64> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let cascaded = sqlx::query("DELETE FROM queries WHERE user_id = $1 AND category_id = $2")
            .bind(user_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?
            .rows_affected();

        let deleted = sqlx::query("DELETE FROM categories WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await.map_err(unexpected)?;
            return Err(PortError::NotFound(format!(
                "Category {category_id} not found"
            )));
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(cascaded)
    }

    async fn list_queries(&self, user_id: Uuid) -> PortResult<Vec<QueryItem>> {
        let records = sqlx::query_as::<_, QueryRecord>(&format!(
            "SELECT {QUERY_COLUMNS} FROM queries WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_queries_by_category(
        &self,
        user_id: Uuid,
        category_id: &str,
    ) -> PortResult<Vec<QueryItem>> {
        let records = sqlx::query_as::<_, QueryRecord>(&format!(
            "SELECT {QUERY_COLUMNS} FROM queries \
             WHERE user_id = $1 AND category_id = $2 AND status = 'active' \
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn add_query(&self, user_id: Uuid, query: NewQueryItem) -> PortResult<QueryItem> {
        let item = query.into_item();
        insert_query(&self.pool, user_id, &item).await?;
        Ok(item)
    }

    async fn add_queries(
        &self,
        user_id: Uuid,
        queries: Vec<NewQueryItem>,
    ) -> PortResult<Vec<QueryItem>> {
        let items: Vec<QueryItem> = queries.into_iter().map(NewQueryItem::into_item).collect();

        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        for item in &items {
            insert_query(&mut *tx, user_id, item).await?;
        }
        tx.commit().await.map_err(unexpected)?;

        Ok(items)
    }

    async fn update_query(
        &self,
        user_id: Uuid,
        query_id: &str,
        patch: QueryPatch,
    ) -> PortResult<QueryItem> {
        let set_answer = patch.answer.is_some();
        let answer_value = patch.answer.flatten();

        let record = sqlx::query_as::<_, QueryRecord>(&format!(
            "UPDATE queries SET \
               category_id = COALESCE($3, category_id), \
               text = COALESCE($4, text), \
               tags = COALESCE($5, tags), \
               status = COALESCE($6, status), \
               answer = CASE WHEN $7 THEN $8 ELSE answer END, \
               ai_engine = COALESCE($9, ai_engine), \
               answer_length = COALESCE($10, answer_length), \
               answer_tokens = COALESCE($11, answer_tokens), \
               updated_at = now() \
             WHERE user_id = $1 AND id = $2 \
             RETURNING {QUERY_COLUMNS}"
        ))
        .bind(user_id)
        .bind(query_id)
        .bind(patch.category_id)
        .bind(patch.text)
        .bind(patch.tags)
        .bind(patch.status.map(|s| s.as_str().to_string()))
        .bind(set_answer)
        .bind(answer_value)
        .bind(patch.ai_engine)
        .bind(patch.answer_length.map(|n| n as i32))
        .bind(patch.answer_tokens.map(Json))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Query {query_id} not found")),
            _ => map_write_err(e),
        })?;

        Ok(record.to_domain())
    }

    async fn delete_query(&self, user_id: Uuid, query_id: &str) -> PortResult<()> {
        let deleted = sqlx::query("DELETE FROM queries WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(query_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?
            .rows_affected();

        if deleted == 0 {
            return Err(PortError::NotFound(format!("Query {query_id} not found")));
        }
        Ok(())
    }
}

//=========================================================================================
// `AuthStore` Trait Implementation
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}

#[async_trait]
impl AuthStore for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING user_id, email",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                    return PortError::Validation(format!(
                        "an account already exists for {email}"
                    ));
                }
            }
            unexpected(e)
        })?;

        Ok(User {
            user_id: record.user_id,
            email: record.email,
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("No user for {email}")),
            _ => unexpected(e),
        })?;

        Ok(UserCredentials {
            user_id: record.user_id,
            email: record.email,
            hashed_password: record.hashed_password,
        })
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let user_id: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        user_id.map(|(id,)| id).ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}

//=========================================================================================
// `SettingsStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SettingsStore for DbAdapter {
    async fn load_settings(&self, user_id: Uuid) -> PortResult<AiSettings> {
        let row: Option<(Json<AiSettings>,)> =
            sqlx::query_as("SELECT settings FROM ai_settings WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;

        Ok(row.map(|(j,)| j.0).unwrap_or_default())
    }

    async fn save_settings(&self, user_id: Uuid, settings: AiSettings) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO ai_settings (user_id, settings, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (user_id) DO UPDATE SET settings = $2, updated_at = now()",
        )
        .bind(user_id)
        .bind(Json(settings))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}
