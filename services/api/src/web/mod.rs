use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tracing::{error, warn};

use query_curation_core::ports::PortError;

pub mod auth;
pub mod generate;
pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_auth;
pub use state::AppState;

/// Translates a port error into a response status plus a user-facing message.
/// Provider and internal details are logged here and never leak to the user.
pub(crate) fn port_error(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Unauthorized => (StatusCode::UNAUTHORIZED, "Not authorized".to_string()),
        PortError::InvalidApiKey(detail) => {
            warn!("provider rejected API key: {detail}");
            (
                StatusCode::UNAUTHORIZED,
                "The provider API key is missing or invalid".to_string(),
            )
        }
        PortError::RateLimited(detail) => {
            warn!("provider rate limit: {detail}");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "The provider rate limit was exceeded. Try again shortly.".to_string(),
            )
        }
        PortError::QuotaExhausted(detail) => {
            warn!("provider quota exhausted: {detail}");
            (
                StatusCode::PAYMENT_REQUIRED,
                "Provider credits are exhausted. Top up and try again.".to_string(),
            )
        }
        PortError::MalformedResponse(detail) => {
            warn!("unparseable provider response: {detail}");
            (
                StatusCode::BAD_GATEWAY,
                "The provider returned a response that could not be parsed".to_string(),
            )
        }
        PortError::Upstream(detail) => {
            error!("provider request failed: {detail}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "The generation request failed".to_string(),
            )
        }
        PortError::Unexpected(detail) => {
            error!("unexpected error: {detail}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred".to_string(),
            )
        }
    }
}

/// Assembles the application router: public auth routes plus the protected
/// store and generation endpoints behind the session middleware.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    let protected_routes = Router::new()
        .route(
            "/categories",
            get(rest::list_categories_handler).post(rest::create_category_handler),
        )
        .route(
            "/categories/{id}",
            put(rest::update_category_handler).delete(rest::delete_category_handler),
        )
        .route(
            "/categories/{id}/queries",
            get(rest::list_category_queries_handler),
        )
        .route(
            "/queries",
            get(rest::list_queries_handler).post(rest::create_query_handler),
        )
        .route("/queries/batch", post(rest::create_queries_handler))
        .route(
            "/queries/{id}",
            put(rest::update_query_handler).delete(rest::delete_query_handler),
        )
        .route("/export", get(rest::export_handler))
        .route("/import/csv", post(rest::import_csv_handler))
        .route(
            "/settings",
            get(rest::get_settings_handler).put(rest::put_settings_handler),
        )
        .route("/stats", get(rest::stats_handler))
        .route("/generate/queries", post(generate::generate_queries_handler))
        .route("/generate/answer", post(generate::generate_answer_handler))
        .route("/generate/answers", post(generate::generate_answers_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(app_state)
}
