//! services/api/src/web/generate.rs
//!
//! The generation endpoints: query generation for a category, a single
//! answer, and the sequential bulk-answer run. All input validation happens
//! before any provider call; provider failures map onto specific statuses
//! and are never retried here.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{port_error, rest::QueryItemDto, rest::TokenUsageDto, state::AppState};
use query_curation_core::{
    batch::{run_answer_batch, AnswerOutcome, AnswerWorkItem},
    csv::MAX_TAGS,
    domain::{
        Category, CategoryContext, NewQueryItem, ProviderSelection, QueryItem, QueryPatch,
        QuerySource, QueryStatus,
    },
    generation::{clamp_count, dedup_candidates},
};

use crate::adapters::provider::{
    DEFAULT_GATEWAY_MODEL, DEFAULT_GEMINI_MODEL, DEFAULT_OPENAI_MODEL,
};

//=========================================================================================
// Provider selection payload (shared by all generation endpoints)
//=========================================================================================

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderParams {
    /// One of `gateway` (default), `openai`, `gemini`.
    pub provider: Option<String>,
    /// Gateway model override.
    pub model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
}

impl ProviderParams {
    fn into_selection(self) -> Result<ProviderSelection, (StatusCode, String)> {
        match self.provider.as_deref().unwrap_or("gateway") {
            "gateway" => Ok(ProviderSelection::Gateway {
                model: self
                    .model
                    .unwrap_or_else(|| DEFAULT_GATEWAY_MODEL.to_string()),
            }),
            "openai" => Ok(ProviderSelection::OpenAiDirect {
                api_key: self.openai_api_key.unwrap_or_default(),
                model: self
                    .openai_model
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            }),
            "gemini" => Ok(ProviderSelection::GeminiDirect {
                api_key: self.gemini_api_key.unwrap_or_default(),
                model: self
                    .gemini_model
                    .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            }),
            other => Err((
                StatusCode::BAD_REQUEST,
                format!("Invalid AI provider: {other}"),
            )),
        }
    }
}

async fn find_category(
    state: &AppState,
    user_id: Uuid,
    category_id: &str,
) -> Result<Category, (StatusCode, String)> {
    let categories = state
        .store
        .list_categories(user_id)
        .await
        .map_err(port_error)?;
    categories
        .into_iter()
        .find(|c| c.id == category_id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Unknown category id".to_string()))
}

//=========================================================================================
// Generate queries
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQueriesRequest {
    pub category_id: String,
    /// Clamped to 1..=20; defaults to 5.
    pub count: Option<i64>,
    #[serde(flatten)]
    pub provider: ProviderParams,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQueriesResponse {
    pub imported: Vec<QueryItemDto>,
    pub requested: u8,
    pub received: usize,
    pub duplicates_skipped: usize,
}

/// Generate query candidates for a category, dedup them against the
/// category's existing texts, and persist the survivors.
#[utoipa::path(
    post,
    path = "/generate/queries",
    request_body = GenerateQueriesRequest,
    responses(
        (status = 200, description = "Generated queries persisted", body = GenerateQueriesResponse),
        (status = 400, description = "Invalid provider, model or key"),
        (status = 401, description = "Provider rejected the API key"),
        (status = 402, description = "Provider quota exhausted"),
        (status = 404, description = "Unknown category"),
        (status = 429, description = "Provider rate limit hit"),
        (status = 502, description = "Unparseable provider response")
    )
)]
pub async fn generate_queries_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<GenerateQueriesRequest>,
) -> Result<Json<GenerateQueriesResponse>, (StatusCode, String)> {
    let category = find_category(&state, user_id, &req.category_id).await?;
    let count = clamp_count(req.count.unwrap_or(5));
    let selection = req.provider.into_selection()?;

    let service = state.providers.resolve(&selection).map_err(port_error)?;
    let context = CategoryContext::from(&category);

    let candidates = service
        .generate_queries(&context, count)
        .await
        .map_err(port_error)?;
    let received = candidates.len();

    // Dedup against everything already in the category, archived included,
    // then within the batch itself.
    let existing = state.store.list_queries(user_id).await.map_err(port_error)?;
    let existing_texts: Vec<&str> = existing
        .iter()
        .filter(|q| q.category_id == category.id)
        .map(|q| q.text.as_str())
        .collect();
    let (kept, duplicates_skipped) = dedup_candidates(candidates, existing_texts);

    let engine = selection.engine_label();
    let items: Vec<NewQueryItem> = kept
        .into_iter()
        .map(|c| {
            let text = c.text.trim().to_string();
            NewQueryItem {
                query_length: Some(text.chars().count()),
                category_id: category.id.clone(),
                text,
                tags: c.tags.into_iter().take(MAX_TAGS).collect(),
                source: QuerySource::Generated,
                status: QueryStatus::Active,
                answer: None,
                source_url: c.source_url.filter(|u| !u.trim().is_empty()),
                ai_engine: Some(engine.clone()),
                query_tokens: None,
            }
        })
        .collect();

    let imported = if items.is_empty() {
        Vec::new()
    } else {
        state
            .store
            .add_queries(user_id, items)
            .await
            .map_err(port_error)?
    };

    info!(
        category = %category.id,
        requested = count,
        received,
        imported = imported.len(),
        "query generation finished"
    );

    Ok(Json(GenerateQueriesResponse {
        imported: imported.into_iter().map(Into::into).collect(),
        requested: count,
        received,
        duplicates_skipped,
    }))
}

//=========================================================================================
// Generate a single answer
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAnswerRequest {
    pub query_id: String,
    #[serde(flatten)]
    pub provider: ProviderParams,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAnswerResponse {
    pub query: QueryItemDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsageDto>,
}

/// Generate and persist the answer for one query.
#[utoipa::path(
    post,
    path = "/generate/answer",
    request_body = GenerateAnswerRequest,
    responses(
        (status = 200, description = "Answer persisted", body = GenerateAnswerResponse),
        (status = 400, description = "Invalid provider, model or key"),
        (status = 401, description = "Provider rejected the API key"),
        (status = 402, description = "Provider quota exhausted"),
        (status = 404, description = "Unknown query"),
        (status = 429, description = "Provider rate limit hit"),
        (status = 502, description = "Unparseable provider response")
    )
)]
pub async fn generate_answer_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<GenerateAnswerRequest>,
) -> Result<Json<GenerateAnswerResponse>, (StatusCode, String)> {
    let queries = state.store.list_queries(user_id).await.map_err(port_error)?;
    let query: QueryItem = queries
        .into_iter()
        .find(|q| q.id == req.query_id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Unknown query id".to_string()))?;

    let category = find_category(&state, user_id, &query.category_id).await?;
    let selection = req.provider.into_selection()?;
    let service = state.providers.resolve(&selection).map_err(port_error)?;

    let answer = service
        .generate_answer(&query.text, &CategoryContext::from(&category))
        .await
        .map_err(port_error)?;

    let patch = QueryPatch {
        answer: Some(Some(answer.text.clone())),
        ai_engine: Some(selection.engine_label()),
        answer_length: Some(answer.text.chars().count()),
        answer_tokens: answer.usage,
        ..Default::default()
    };
    let updated = state
        .store
        .update_query(user_id, &query.id, patch)
        .await
        .map_err(port_error)?;

    Ok(Json(GenerateAnswerResponse {
        query: updated.into(),
        usage: answer.usage.map(Into::into),
    }))
}

//=========================================================================================
// Generate answers in bulk
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAnswersRequest {
    pub category_id: String,
    #[serde(flatten)]
    pub provider: ProviderParams,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResultDto {
    pub query_id: String,
    /// `answered` or `failed`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAnswersResponse {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub results: Vec<AnswerResultDto>,
}

/// Answer every active, unanswered query in a category, one request at a
/// time. Per-item failures are reported in the result list; the run keeps
/// going to the next item.
#[utoipa::path(
    post,
    path = "/generate/answers",
    request_body = GenerateAnswersRequest,
    responses(
        (status = 200, description = "Bulk run finished", body = GenerateAnswersResponse),
        (status = 400, description = "Invalid provider, model or key"),
        (status = 404, description = "Unknown category")
    )
)]
pub async fn generate_answers_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<GenerateAnswersRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let category = find_category(&state, user_id, &req.category_id).await?;
    let selection = req.provider.into_selection()?;
    let service = state.providers.resolve(&selection).map_err(port_error)?;

    let work: Vec<AnswerWorkItem> = state
        .store
        .get_queries_by_category(user_id, &category.id)
        .await
        .map_err(port_error)?
        .into_iter()
        .filter(|q| q.answer.is_none())
        .map(|q| AnswerWorkItem {
            query_id: q.id,
            text: q.text,
        })
        .collect();

    let context = CategoryContext::from(&category);
    let engine = selection.engine_label();

    let summary = run_answer_batch(
        work,
        |item| {
            let service = service.clone();
            let context = context.clone();
            async move { service.generate_answer(&item.text, &context).await }
        },
        |p| info!(done = p.done, total = p.total, "bulk answer progress"),
    )
    .await;

    let mut results = Vec::with_capacity(summary.outcomes.len());
    let mut completed = 0usize;
    let mut failed = 0usize;

    for (item, outcome) in summary.outcomes {
        match outcome {
            AnswerOutcome::Answered { answer, usage } => {
                let patch = QueryPatch {
                    answer: Some(Some(answer.clone())),
                    ai_engine: Some(engine.clone()),
                    answer_length: Some(answer.chars().count()),
                    answer_tokens: usage,
                    ..Default::default()
                };
                match state.store.update_query(user_id, &item.query_id, patch).await {
                    Ok(_) => {
                        completed += 1;
                        results.push(AnswerResultDto {
                            query_id: item.query_id,
                            status: "answered".to_string(),
                            answer: Some(answer),
                            error: None,
                        });
                    }
                    Err(e) => {
                        warn!("failed to persist answer for {}: {:?}", item.query_id, e);
                        failed += 1;
                        results.push(AnswerResultDto {
                            query_id: item.query_id,
                            status: "failed".to_string(),
                            answer: None,
                            error: Some("failed to save the generated answer".to_string()),
                        });
                    }
                }
            }
            AnswerOutcome::Failed { message } => {
                failed += 1;
                results.push(AnswerResultDto {
                    query_id: item.query_id,
                    status: "failed".to_string(),
                    answer: None,
                    error: Some(message),
                });
            }
        }
    }

    Ok(Json(GenerateAnswersResponse {
        total: summary.total,
        completed,
        failed,
        results,
    }))
}
