//! End-to-end handler tests: the real router and middleware over the
//! in-memory store, with a scripted provider factory standing in for the
//! LLM backends.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use api_lib::adapters::provider::{validate_selection, ProviderFactory};
use api_lib::config::Config;
use api_lib::web::{build_router, AppState};
use query_curation_core::domain::{
    CategoryContext, GeneratedAnswer, GeneratedQuery, ProviderSelection,
};
use query_curation_core::ports::{GenerationService, PortResult};
use query_curation_core::MemoryStore;

//=========================================================================================
// Scripted provider
//=========================================================================================

#[derive(Default)]
struct FakeProvider {
    /// Candidate batches handed out per generate_queries call.
    candidate_batches: Mutex<VecDeque<Vec<GeneratedQuery>>>,
    /// The count the handler actually requested (clamp check).
    last_count: Mutex<Option<u8>>,
    /// When set, every answer call returns this text.
    fixed_answer: Mutex<Option<String>>,
}

#[async_trait]
impl GenerationService for FakeProvider {
    async fn generate_queries(
        &self,
        _category: &CategoryContext,
        count: u8,
    ) -> PortResult<Vec<GeneratedQuery>> {
        *self.last_count.lock().unwrap() = Some(count);
        Ok(self
            .candidate_batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn generate_answer(
        &self,
        query_text: &str,
        _category: &CategoryContext,
    ) -> PortResult<GeneratedAnswer> {
        let text = self
            .fixed_answer
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| format!("answer to: {query_text}"));
        Ok(GeneratedAnswer { text, usage: None })
    }
}

struct FakeFactory {
    provider: Arc<FakeProvider>,
}

impl ProviderFactory for FakeFactory {
    fn resolve(
        &self,
        selection: &ProviderSelection,
    ) -> PortResult<Arc<dyn GenerationService>> {
        validate_selection(selection)?;
        Ok(self.provider.clone())
    }
}

//=========================================================================================
// Harness
//=========================================================================================

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: String::new(),
        log_level: tracing::Level::INFO,
        allowed_origins: vec![],
        gateway_api_key: Some("server-secret".to_string()),
        gateway_base_url: "http://localhost:8787/v1".to_string(),
    }
}

fn make_app() -> (Router, Arc<FakeProvider>) {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(FakeProvider::default());
    let state = Arc::new(AppState {
        store: store.clone(),
        auth: store.clone(),
        settings: store,
        providers: Arc::new(FakeFactory {
            provider: provider.clone(),
        }),
        config: Arc::new(test_config()),
    });
    (build_router(state), provider)
}

fn request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Signs up a fresh user and returns the session cookie.
async fn signup(app: &Router, email: &str) -> String {
    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({"email": email, "password": "hunter2hunter2"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("signup must set a session cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn create_category(app: &Router, cookie: &str, id: &str, name: &str) {
    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/categories",
            Some(cookie),
            Some(json!({"id": id, "name": name, "description": format!("{name} things")})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

async fn create_query(app: &Router, cookie: &str, category_id: &str, text: &str) -> String {
    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/queries",
            Some(cookie),
            Some(json!({"categoryId": category_id, "text": text, "tags": ["t"]})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"].as_str().unwrap().to_string()
}

//=========================================================================================
// Auth
//=========================================================================================

#[tokio::test]
async fn protected_routes_require_a_session() {
    let (app, _) = make_app();

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/categories", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let cookie = signup(&app, "alice@example.com").await;
    let response = app
        .clone()
        .oneshot(request(Method::GET, "/categories", Some(&cookie), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_round_trip_works() {
    let (app, _) = make_app();
    signup(&app, "bob@example.com").await;

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "bob@example.com", "password": "hunter2hunter2"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bad = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "bob@example.com", "password": "wrong"})),
        ))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::UNAUTHORIZED);
}

//=========================================================================================
// Store endpoints
//=========================================================================================

#[tokio::test]
async fn category_delete_cascades() {
    let (app, _) = make_app();
    let cookie = signup(&app, "carol@example.com").await;
    create_category(&app, &cookie, "weather", "Weather").await;
    create_category(&app, &cookie, "traffic", "Traffic").await;
    create_query(&app, &cookie, "weather", "Will it rain?").await;
    create_query(&app, &cookie, "weather", "Is it icy?").await;
    create_query(&app, &cookie, "traffic", "Is the bridge jammed?").await;

    let response = app
        .clone()
        .oneshot(request(
            Method::DELETE,
            "/categories/weather",
            Some(&cookie),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["deletedQueries"], 2);

    let remaining = body_json(
        app.clone()
            .oneshot(request(Method::GET, "/queries", Some(&cookie), None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(remaining.as_array().unwrap().len(), 1);
    assert_eq!(remaining[0]["categoryId"], "traffic");
}

#[tokio::test]
async fn adding_a_query_to_an_unknown_category_fails() {
    let (app, _) = make_app();
    let cookie = signup(&app, "dave@example.com").await;

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/queries",
            Some(&cookie),
            Some(json!({"categoryId": "nope", "text": "orphan"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

//=========================================================================================
// Import / export
//=========================================================================================

#[tokio::test]
async fn csv_import_minimal_example() {
    let (app, _) = make_app();
    let cookie = signup(&app, "erin@example.com").await;
    create_category(&app, &cookie, "weather", "Weather").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/import/csv")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "text/csv")
                .body(Body::from("text,categoryId\n\"Test query\",weather"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["importedCount"], 1);
    assert_eq!(body["failedCount"], 0);
    assert_eq!(body["imported"][0]["text"], "Test query");
    assert_eq!(body["imported"][0]["categoryId"], "weather");
    assert_eq!(body["imported"][0]["source"], "manual");
    assert_eq!(body["imported"][0]["status"], "active");
}

#[tokio::test]
async fn csv_import_reports_row_errors_alongside_partial_success() {
    let (app, _) = make_app();
    let cookie = signup(&app, "frank@example.com").await;
    create_category(&app, &cookie, "weather", "Weather").await;

    let csv = "text,categoryId\n\"good row\",weather\n\"bad row\",unknown";
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/import/csv")
                .header(header::COOKIE, &cookie)
                .body(Body::from(csv))
                .unwrap(),
        )
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["importedCount"], 1);
    assert_eq!(body["failedCount"], 1);
    assert!(body["errors"][0].as_str().unwrap().contains("Row 3"));
}

#[tokio::test]
async fn export_then_import_round_trips() {
    let (app, _) = make_app();
    let cookie = signup(&app, "grace@example.com").await;
    create_category(&app, &cookie, "weather", "Weather").await;
    create_query(&app, &cookie, "weather", "Will it rain, or snow?").await;
    create_query(&app, &cookie, "weather", "Quote \"this\" back").await;

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            "/export?format=csv&categoryId=weather",
            Some(&cookie),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("queries_weather_"));
    assert!(disposition.ends_with(".csv\""));

    let csv = body_text(response).await;
    let reimport = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/import/csv")
                .header(header::COOKIE, &cookie)
                .body(Body::from(csv))
                .unwrap(),
        )
        .await
        .unwrap();

    let body = body_json(reimport).await;
    assert_eq!(body["importedCount"], 2);
    let texts: Vec<&str> = body["imported"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["text"].as_str().unwrap())
        .collect();
    assert!(texts.contains(&"Will it rain, or snow?"));
    assert!(texts.contains(&"Quote \"this\" back"));
}

//=========================================================================================
// Generation endpoints
//=========================================================================================

fn candidate(text: &str) -> GeneratedQuery {
    GeneratedQuery {
        text: text.to_string(),
        tags: vec!["tag".to_string()],
        source_url: None,
    }
}

#[tokio::test]
async fn generate_queries_clamps_count_and_dedups() {
    let (app, provider) = make_app();
    let cookie = signup(&app, "heidi@example.com").await;
    create_category(&app, &cookie, "weather", "Weather").await;
    create_query(&app, &cookie, "weather", "Existing query").await;

    provider.candidate_batches.lock().unwrap().push_back(vec![
        candidate("existing QUERY  "),
        candidate("Fresh one"),
        candidate("fresh ONE"),
    ]);

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/generate/queries",
            Some(&cookie),
            Some(json!({"categoryId": "weather", "count": 25})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // 25 must reach the provider as the clamped maximum of 20.
    assert_eq!(*provider.last_count.lock().unwrap(), Some(20));

    let body = body_json(response).await;
    assert_eq!(body["requested"], 20);
    assert_eq!(body["received"], 3);
    assert_eq!(body["duplicatesSkipped"], 2);
    assert_eq!(body["imported"].as_array().unwrap().len(), 1);
    assert_eq!(body["imported"][0]["text"], "Fresh one");
    assert_eq!(body["imported"][0]["source"], "generated");
    assert_eq!(
        body["imported"][0]["aiEngine"],
        "gateway/google/gemini-2.5-flash"
    );
}

#[tokio::test]
async fn generate_queries_rejects_bad_models_before_any_call() {
    let (app, provider) = make_app();
    let cookie = signup(&app, "ivan@example.com").await;
    create_category(&app, &cookie, "weather", "Weather").await;

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/generate/queries",
            Some(&cookie),
            Some(json!({"categoryId": "weather", "model": "not/a-model"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(provider.last_count.lock().unwrap().is_none());
}

#[tokio::test]
async fn single_answer_is_persisted_with_engine_metadata() {
    let (app, _) = make_app();
    let cookie = signup(&app, "judy@example.com").await;
    create_category(&app, &cookie, "weather", "Weather").await;
    let query_id = create_query(&app, &cookie, "weather", "Will it rain?").await;

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/generate/answer",
            Some(&cookie),
            Some(json!({"queryId": query_id})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["query"]["answer"], "answer to: Will it rain?");
    assert_eq!(
        body["query"]["aiEngine"],
        "gateway/google/gemini-2.5-flash"
    );
}

#[tokio::test]
async fn bulk_answers_mark_duplicates_and_report_progress_counts() {
    let (app, provider) = make_app();
    let cookie = signup(&app, "mallory@example.com").await;
    create_category(&app, &cookie, "weather", "Weather").await;
    create_query(&app, &cookie, "weather", "first?").await;
    create_query(&app, &cookie, "weather", "second?").await;

    *provider.fixed_answer.lock().unwrap() = Some("Always the same.".to_string());

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/generate/answers",
            Some(&cookie),
            Some(json!({"categoryId": "weather"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["completed"], 2);
    assert_eq!(body["failed"], 0);

    let answers: Vec<&str> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["answer"].as_str().unwrap())
        .collect();
    assert_eq!(answers[0], "Always the same.");
    assert_eq!(answers[1], "Always the same. [duplicate answer]");

    // Already-answered queries drop out of a second run.
    let rerun = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/generate/answers",
            Some(&cookie),
            Some(json!({"categoryId": "weather"})),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(rerun).await["total"], 0);
}

//=========================================================================================
// Settings
//=========================================================================================

#[tokio::test]
async fn settings_round_trip_and_clamp() {
    let (app, _) = make_app();
    let cookie = signup(&app, "nina@example.com").await;

    let defaults = body_json(
        app.clone()
            .oneshot(request(Method::GET, "/settings", Some(&cookie), None))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(defaults["provider"], "gateway");
    assert_eq!(defaults["generateCount"], 5);

    let saved = body_json(
        app.clone()
            .oneshot(request(
                Method::PUT,
                "/settings",
                Some(&cookie),
                Some(json!({
                    "provider": "gemini",
                    "generateCount": 99,
                    "gatewayModel": "google/gemini-2.5-flash",
                    "openaiModel": "gpt-4o-mini",
                    "geminiModel": "gemini-2.5-pro"
                })),
            ))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(saved["provider"], "gemini");
    assert_eq!(saved["generateCount"], 20);

    let bad = app
        .clone()
        .oneshot(request(
            Method::PUT,
            "/settings",
            Some(&cookie),
            Some(json!({
                "provider": "mystery",
                "generateCount": 5,
                "gatewayModel": "m",
                "openaiModel": "m",
                "geminiModel": "m"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}
