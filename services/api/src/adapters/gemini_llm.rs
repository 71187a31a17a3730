//! services/api/src/adapters/gemini_llm.rs
//!
//! This module contains the adapter for the direct Gemini provider. Gemini
//! speaks its own `generateContent` wire format, so this adapter talks plain
//! `reqwest` instead of going through the chat-completions client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use query_curation_core::{
    domain::{CategoryContext, GeneratedAnswer, GeneratedQuery, TokenUsage},
    generation::{self, Prompt},
    ports::{GenerationService, PortError, PortResult},
};

use crate::adapters::openai_llm::{
    ANSWER_MAX_TOKENS, ANSWER_TEMPERATURE, QUERY_MAX_TOKENS, QUERY_TEMPERATURE,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

//=========================================================================================
// Wire types (reduced to what this service sends and reads)
//=========================================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter for the direct Gemini API, built per request from the
/// user-supplied key.
pub struct GeminiDirectAdapter {
    api_key: String,
    model: String,
    base_url: String,
    http_client: reqwest::Client,
}

impl GeminiDirectAdapter {
    pub fn new(api_key: String, model: String) -> PortResult<Self> {
        if api_key.is_empty() {
            return Err(PortError::InvalidApiKey(
                "API key cannot be empty".to_string(),
            ));
        }
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(Self {
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            http_client,
        })
    }

    /// Points the adapter at a different API base (used by tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn generate_content(
        &self,
        prompt: &Prompt,
        temperature: f32,
        max_output_tokens: u32,
    ) -> PortResult<(String, Option<TokenUsage>)> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| PortError::InvalidApiKey(format!("invalid API key format: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Gemini takes the whole instruction set as a single user part.
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(format!("{}\n\n{}", prompt.system, prompt.user)),
                }],
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| PortError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());

            if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(&error_body) {
                return Err(Self::map_error(parsed.error.code, parsed.error.message));
            }
            return Err(Self::map_error(status.as_u16(), error_body));
        }

        let body = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| PortError::MalformedResponse(format!("failed to parse response: {e}")))?;

        let usage = body.usage_metadata.as_ref().map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| {
                PortError::MalformedResponse("response contained no text candidate".to_string())
            })?;

        Ok((text, usage))
    }

    fn map_error(status: u16, message: String) -> PortError {
        match status {
            401 | 403 => PortError::InvalidApiKey(message),
            429 => PortError::RateLimited(message),
            402 => PortError::QuotaExhausted(message),
            _ => PortError::Upstream(message),
        }
    }
}

//=========================================================================================
// `GenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerationService for GeminiDirectAdapter {
    async fn generate_queries(
        &self,
        category: &CategoryContext,
        count: u8,
    ) -> PortResult<Vec<GeneratedQuery>> {
        let prompt = generation::query_generation_prompt(category, count);
        let (content, _usage) = self
            .generate_content(&prompt, QUERY_TEMPERATURE, QUERY_MAX_TOKENS)
            .await?;
        generation::parse_query_candidates(&content)
    }

    async fn generate_answer(
        &self,
        query_text: &str,
        category: &CategoryContext,
    ) -> PortResult<GeneratedAnswer> {
        let prompt = generation::answer_prompt(query_text, category);
        let (content, usage) = self
            .generate_content(&prompt, ANSWER_TEMPERATURE, ANSWER_MAX_TOKENS)
            .await?;
        Ok(GeneratedAnswer {
            text: content,
            usage,
        })
    }
}
