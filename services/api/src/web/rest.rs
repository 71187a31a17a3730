//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::web::{port_error, state::AppState};
use query_curation_core::{
    csv::{self, ImportReport},
    domain::{
        AiSettings, Category, CategoryPatch, NewQueryItem, QueryItem, QueryPatch, QuerySource,
        QueryStatus, TokenUsage,
    },
    export::{export_queries, ExportFormat},
    generation::clamp_count,
    stats,
};

const MAX_CATEGORY_ID_CHARS: usize = 100;
const MAX_CATEGORY_NAME_CHARS: usize = 200;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        list_categories_handler,
        create_category_handler,
        update_category_handler,
        delete_category_handler,
        list_category_queries_handler,
        list_queries_handler,
        create_query_handler,
        create_queries_handler,
        update_query_handler,
        delete_query_handler,
        export_handler,
        import_csv_handler,
        get_settings_handler,
        put_settings_handler,
        stats_handler,
        crate::web::generate::generate_queries_handler,
        crate::web::generate::generate_answer_handler,
        crate::web::generate::generate_answers_handler,
    ),
    components(schemas(
        crate::web::auth::SignupRequest,
        crate::web::auth::LoginRequest,
        crate::web::auth::AuthResponse,
        CategoryDto,
        QueryItemDto,
        TokenUsageDto,
        CreateCategoryRequest,
        UpdateCategoryRequest,
        DeleteCategoryResponse,
        CreateQueryRequest,
        BatchCreateRequest,
        UpdateQueryRequest,
        ImportResponse,
        AiSettingsDto,
        crate::web::generate::GenerateQueriesRequest,
        crate::web::generate::GenerateQueriesResponse,
        crate::web::generate::GenerateAnswerRequest,
        crate::web::generate::GenerateAnswerResponse,
        crate::web::generate::GenerateAnswersRequest,
        crate::web::generate::GenerateAnswersResponse,
        crate::web::generate::AnswerResultDto,
    )),
    tags(
        (name = "Query Curation API", description = "Category/query curation plus LLM-backed generation.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDto {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Category> for CategoryDto {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            name: c.name,
            description: c.description,
            icon: c.icon,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsageDto {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl From<TokenUsage> for TokenUsageDto {
    fn from(u: TokenUsage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryItemDto {
    pub id: String,
    pub category_id: String,
    pub text: String,
    pub tags: Vec<String>,
    pub source: String,
    pub status: String,
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
    pub query_tokens: Option<TokenUsageDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_tokens: Option<TokenUsageDto>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<QueryItem> for QueryItemDto {
    fn from(q: QueryItem) -> Self {
        Self {
            id: q.id,
            category_id: q.category_id,
            text: q.text,
            tags: q.tags,
            source: q.source.as_str().to_string(),
            status: q.status.as_str().to_string(),
            answer: q.answer,
            source_url: q.source_url,
            ai_engine: q.ai_engine,
            query_length: q.query_length,
            answer_length: q.answer_length,
            query_tokens: q.query_tokens.map(Into::into),
            answer_tokens: q.answer_tokens.map(Into::into),
            created_at: q.created_at,
            updated_at: q.updated_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    /// Optional caller-chosen id (e.g. a readable slug); generated when absent.
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCategoryResponse {
    /// Queries removed by the cascade.
    pub deleted_queries: u64,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateQueryRequest {
    pub category_id: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Coerced to `manual` when absent or unrecognized.
    pub source: Option<String>,
    /// Coerced to `active` when absent or unrecognized.
    pub status: Option<String>,
    pub answer: Option<String>,
    pub source_url: Option<String>,
}

impl CreateQueryRequest {
    fn into_new_item(self) -> Result<NewQueryItem, (StatusCode, String)> {
        let text = self.text.trim().to_string();
        if text.is_empty() || text.chars().count() > csv::MAX_TEXT_CHARS {
            return Err((
                StatusCode::BAD_REQUEST,
                "Query text must be between 1 and 1000 characters".to_string(),
            ));
        }
        Ok(NewQueryItem {
            category_id: self.category_id,
            text,
            tags: self.tags,
            source: QuerySource::parse_or_default(self.source.as_deref().unwrap_or("")),
            status: QueryStatus::parse_or_default(self.status.as_deref().unwrap_or("")),
            answer: self.answer,
            source_url: self.source_url,
            ai_engine: None,
            query_length: None,
            query_tokens: None,
        })
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateRequest {
    pub queries: Vec<CreateQueryRequest>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQueryRequest {
    pub category_id: Option<String>,
    pub text: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<String>,
    /// Send `null` to clear a stored answer; omit to leave it unchanged.
    #[schema(value_type = Option<String>)]
    #[serde(default, deserialize_with = "double_option")]
    pub answer: Option<Option<String>>,
    pub ai_engine: Option<String>,
}

fn double_option<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(de).map(Some)
}

impl UpdateQueryRequest {
    fn into_patch(self) -> QueryPatch {
        QueryPatch {
            category_id: self.category_id,
            text: self.text,
            tags: self.tags,
            status: self.status.map(|s| QueryStatus::parse_or_default(&s)),
            answer: self.answer,
            ai_engine: self.ai_engine,
            answer_length: None,
            answer_tokens: None,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub imported: Vec<QueryItemDto>,
    pub errors: Vec<String>,
    pub imported_count: usize,
    pub failed_count: usize,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AiSettingsDto {
    /// One of `gateway`, `openai`, `gemini`.
    pub provider: String,
    pub generate_count: u8,
    pub gateway_model: String,
    pub openai_model: String,
    pub gemini_model: String,
}

impl From<AiSettings> for AiSettingsDto {
    fn from(s: AiSettings) -> Self {
        let provider = match s.provider {
            query_curation_core::domain::ProviderKind::Gateway => "gateway",
            query_curation_core::domain::ProviderKind::OpenAi => "openai",
            query_curation_core::domain::ProviderKind::Gemini => "gemini",
        };
        Self {
            provider: provider.to_string(),
            generate_count: s.generate_count,
            gateway_model: s.gateway_model,
            openai_model: s.openai_model,
            gemini_model: s.gemini_model,
        }
    }
}

impl AiSettingsDto {
    fn into_settings(self) -> Result<AiSettings, (StatusCode, String)> {
        let provider = match self.provider.as_str() {
            "gateway" => query_curation_core::domain::ProviderKind::Gateway,
            "openai" => query_curation_core::domain::ProviderKind::OpenAi,
            "gemini" => query_curation_core::domain::ProviderKind::Gemini,
            other => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    format!("Invalid AI provider: {other}"),
                ))
            }
        };
        Ok(AiSettings {
            provider,
            generate_count: clamp_count(self.generate_count as i64),
            gateway_model: self.gateway_model,
            openai_model: self.openai_model,
            gemini_model: self.gemini_model,
        })
    }
}

//=========================================================================================
// Category Handlers
//=========================================================================================

/// List the user's categories.
#[utoipa::path(
    get,
    path = "/categories",
    responses(
        (status = 200, description = "All categories", body = [CategoryDto]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_categories_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<CategoryDto>>, (StatusCode, String)> {
    let categories = state
        .store
        .list_categories(user_id)
        .await
        .map_err(port_error)?;
    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

/// Create a category.
#[utoipa::path(
    post,
    path = "/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = CategoryDto),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_CATEGORY_NAME_CHARS {
        return Err((
            StatusCode::BAD_REQUEST,
            "Category name must be between 1 and 200 characters".to_string(),
        ));
    }

    let mut category = Category::new(
        name,
        req.description.unwrap_or_default(),
        req.icon.unwrap_or_else(|| "Folder".to_string()),
    );
    if let Some(id) = req.id {
        let id = id.trim().to_string();
        if id.is_empty() || id.chars().count() > MAX_CATEGORY_ID_CHARS {
            return Err((
                StatusCode::BAD_REQUEST,
                "Category id must be between 1 and 100 characters".to_string(),
            ));
        }
        category.id = id;
    }

    let created = state
        .store
        .add_category(user_id, category)
        .await
        .map_err(port_error)?;
    Ok((StatusCode::CREATED, Json(CategoryDto::from(created))))
}

/// Update a category's name, description or icon.
#[utoipa::path(
    put,
    path = "/categories/{id}",
    request_body = UpdateCategoryRequest,
    params(("id" = String, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category updated", body = CategoryDto),
        (status = 404, description = "Unknown category")
    )
)]
pub async fn update_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Result<Json<CategoryDto>, (StatusCode, String)> {
    let patch = CategoryPatch {
        name: req.name,
        description: req.description,
        icon: req.icon,
    };
    let updated = state
        .store
        .update_category(user_id, &id, patch)
        .await
        .map_err(port_error)?;
    Ok(Json(updated.into()))
}

/// Delete a category and, by cascade, all of its queries.
#[utoipa::path(
    delete,
    path = "/categories/{id}",
    params(("id" = String, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category deleted", body = DeleteCategoryResponse),
        (status = 404, description = "Unknown category")
    )
)]
pub async fn delete_category_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
) -> Result<Json<DeleteCategoryResponse>, (StatusCode, String)> {
    let deleted_queries = state
        .store
        .delete_category(user_id, &id)
        .await
        .map_err(port_error)?;
    Ok(Json(DeleteCategoryResponse { deleted_queries }))
}

/// List the active queries in one category.
#[utoipa::path(
    get,
    path = "/categories/{id}/queries",
    params(("id" = String, Path, description = "Category id")),
    responses(
        (status = 200, description = "Active queries", body = [QueryItemDto]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_category_queries_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
) -> Result<Json<Vec<QueryItemDto>>, (StatusCode, String)> {
    let queries = state
        .store
        .get_queries_by_category(user_id, &id)
        .await
        .map_err(port_error)?;
    Ok(Json(queries.into_iter().map(Into::into).collect()))
}

//=========================================================================================
// Query Handlers
//=========================================================================================

/// List every query the user has, across categories and statuses.
#[utoipa::path(
    get,
    path = "/queries",
    responses((status = 200, description = "All queries", body = [QueryItemDto]))
)]
pub async fn list_queries_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<QueryItemDto>>, (StatusCode, String)> {
    let queries = state.store.list_queries(user_id).await.map_err(port_error)?;
    Ok(Json(queries.into_iter().map(Into::into).collect()))
}

/// Add one query.
#[utoipa::path(
    post,
    path = "/queries",
    request_body = CreateQueryRequest,
    responses(
        (status = 201, description = "Query created", body = QueryItemDto),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn create_query_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateQueryRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let item = req.into_new_item()?;
    let created = state
        .store
        .add_query(user_id, item)
        .await
        .map_err(port_error)?;
    Ok((StatusCode::CREATED, Json(QueryItemDto::from(created))))
}

/// Add a batch of queries. All-or-nothing: any invalid row fails the batch.
#[utoipa::path(
    post,
    path = "/queries/batch",
    request_body = BatchCreateRequest,
    responses(
        (status = 201, description = "Queries created", body = [QueryItemDto]),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn create_queries_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<BatchCreateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let items = req
        .queries
        .into_iter()
        .map(CreateQueryRequest::into_new_item)
        .collect::<Result<Vec<_>, _>>()?;
    let created = state
        .store
        .add_queries(user_id, items)
        .await
        .map_err(port_error)?;
    Ok((
        StatusCode::CREATED,
        Json(created.into_iter().map(QueryItemDto::from).collect::<Vec<_>>()),
    ))
}

/// Patch a query.
#[utoipa::path(
    put,
    path = "/queries/{id}",
    request_body = UpdateQueryRequest,
    params(("id" = String, Path, description = "Query id")),
    responses(
        (status = 200, description = "Query updated", body = QueryItemDto),
        (status = 404, description = "Unknown query")
    )
)]
pub async fn update_query_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
    Json(req): Json<UpdateQueryRequest>,
) -> Result<Json<QueryItemDto>, (StatusCode, String)> {
    let updated = state
        .store
        .update_query(user_id, &id, req.into_patch())
        .await
        .map_err(port_error)?;
    Ok(Json(updated.into()))
}

/// Delete a query.
#[utoipa::path(
    delete,
    path = "/queries/{id}",
    params(("id" = String, Path, description = "Query id")),
    responses(
        (status = 204, description = "Query deleted"),
        (status = 404, description = "Unknown query")
    )
)]
pub async fn delete_query_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .store
        .delete_query(user_id, &id)
        .await
        .map_err(port_error)?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Import / Export Handlers
//=========================================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    pub format: Option<String>,
    pub category_id: Option<String>,
}

/// Download the user's queries as a JSON or CSV file.
#[utoipa::path(
    get,
    path = "/export",
    params(
        ("format" = Option<String>, Query, description = "`json` (default) or `csv`"),
        ("categoryId" = Option<String>, Query, description = "Limit the export to one category")
    ),
    responses(
        (status = 200, description = "The export file"),
        (status = 400, description = "Unknown format")
    )
)]
pub async fn export_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(params): Query<ExportParams>,
) -> Result<Response, (StatusCode, String)> {
    let format = ExportFormat::parse(params.format.as_deref().unwrap_or("json"))
        .map_err(port_error)?;
    let queries = state.store.list_queries(user_id).await.map_err(port_error)?;

    let file = export_queries(&queries, params.category_id.as_deref(), format)
        .map_err(port_error)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.file_name),
            ),
        ],
        file.body,
    )
        .into_response())
}

/// Import queries from a CSV payload.
///
/// Valid rows are inserted even when other rows fail; every rejected row gets
/// a message in `errors`. Payloads over the size or row ceiling are rejected
/// wholesale with zero imports.
#[utoipa::path(
    post,
    path = "/import/csv",
    request_body(content = String, content_type = "text/csv"),
    responses(
        (status = 200, description = "Import outcome", body = ImportResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn import_csv_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    body: String,
) -> Result<Json<ImportResponse>, (StatusCode, String)> {
    let categories = state
        .store
        .list_categories(user_id)
        .await
        .map_err(port_error)?;
    let valid_ids: HashSet<String> = categories.into_iter().map(|c| c.id).collect();

    let ImportReport { items, errors } = csv::parse_csv(&body, &valid_ids);

    let imported = if items.is_empty() {
        Vec::new()
    } else {
        state
            .store
            .add_queries(user_id, items)
            .await
            .map_err(port_error)?
    };

    let response = ImportResponse {
        imported_count: imported.len(),
        failed_count: errors.len(),
        imported: imported.into_iter().map(Into::into).collect(),
        errors,
    };
    Ok(Json(response))
}

//=========================================================================================
// Settings / Stats Handlers
//=========================================================================================

/// Fetch the user's generation settings (defaults until first saved).
#[utoipa::path(
    get,
    path = "/settings",
    responses((status = 200, description = "Current settings", body = AiSettingsDto))
)]
pub async fn get_settings_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<AiSettingsDto>, (StatusCode, String)> {
    let settings = state
        .settings
        .load_settings(user_id)
        .await
        .map_err(port_error)?;
    Ok(Json(settings.into()))
}

/// Save the user's generation settings.
#[utoipa::path(
    put,
    path = "/settings",
    request_body = AiSettingsDto,
    responses(
        (status = 200, description = "Settings saved", body = AiSettingsDto),
        (status = 400, description = "Invalid provider")
    )
)]
pub async fn put_settings_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<AiSettingsDto>,
) -> Result<Json<AiSettingsDto>, (StatusCode, String)> {
    let settings = req.into_settings()?;
    state
        .settings
        .save_settings(user_id, settings.clone())
        .await
        .map_err(port_error)?;
    Ok(Json(settings.into()))
}

/// Per-engine generation statistics over the user's queries.
#[utoipa::path(
    get,
    path = "/stats",
    responses((status = 200, description = "Engine statistics"))
)]
pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<stats::StatsReport>, (StatusCode, String)> {
    let queries = state.store.list_queries(user_id).await.map_err(port_error)?;
    Ok(Json(stats::engine_stats(&queries)))
}
