//! services/api/src/adapters/openai_llm.rs
//!
//! This module contains the adapter for the direct OpenAI provider, plus the
//! chat-completions helpers shared with the gateway adapter (both speak the
//! same wire format through `async-openai`).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
    Client,
};
use async_trait::async_trait;
use query_curation_core::{
    domain::{CategoryContext, GeneratedAnswer, GeneratedQuery, TokenUsage},
    generation::{self, Prompt},
    ports::{GenerationService, PortError, PortResult},
};

use crate::adapters::provider::NEWER_OPENAI_MODELS;

/// Token ceilings matching what the upstream functions always sent.
pub(crate) const QUERY_MAX_TOKENS: u32 = 2048;
pub(crate) const ANSWER_MAX_TOKENS: u32 = 1024;
pub(crate) const QUERY_TEMPERATURE: f32 = 0.8;
pub(crate) const ANSWER_TEMPERATURE: f32 = 0.7;

//=========================================================================================
// Shared chat-completions helpers
//=========================================================================================

/// Classifies an `async-openai` failure into the port error taxonomy. The
/// library surfaces upstream failures as an `ApiError` with free-form type
/// and message strings, so classification goes by their content.
pub(crate) fn map_openai_error(err: OpenAIError) -> PortError {
    match err {
        OpenAIError::ApiError(api) => {
            let text = format!(
                "{} {}",
                api.r#type.clone().unwrap_or_default(),
                api.message
            )
            .to_lowercase();
            if text.contains("api key") || text.contains("invalid_api_key") || text.contains("authentication") {
                PortError::InvalidApiKey(api.message)
            } else if text.contains("quota") || text.contains("billing") || text.contains("credit") {
                PortError::QuotaExhausted(api.message)
            } else if text.contains("rate limit") || text.contains("rate_limit") {
                PortError::RateLimited(api.message)
            } else {
                PortError::Upstream(api.message)
            }
        }
        OpenAIError::JSONDeserialize(e, _) => PortError::MalformedResponse(e.to_string()),
        other => PortError::Upstream(other.to_string()),
    }
}

/// Pulls the first choice's text and the reported usage out of a response.
pub(crate) fn first_choice_content(
    response: CreateChatCompletionResponse,
) -> PortResult<(String, Option<TokenUsage>)> {
    let usage = response.usage.as_ref().map(|u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| {
            PortError::MalformedResponse("chat completion contained no text content".to_string())
        })?;

    Ok((content, usage))
}

pub(crate) fn chat_messages(
    prompt: &Prompt,
) -> PortResult<Vec<async_openai::types::chat::ChatCompletionRequestMessage>> {
    Ok(vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(prompt.system.as_str())
            .build()
            .map_err(map_openai_error)?
            .into(),
        ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.user.as_str())
            .build()
            .map_err(map_openai_error)?
            .into(),
    ])
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter for the direct OpenAI API, built per request from the
/// user-supplied key.
#[derive(Clone)]
pub struct OpenAiDirectAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    /// Newer models take `max_completion_tokens` and reject a temperature.
    newer_model: bool,
}

impl OpenAiDirectAdapter {
    /// Creates a new `OpenAiDirectAdapter`.
    pub fn new(api_key: String, model: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        let newer_model = NEWER_OPENAI_MODELS.contains(&model.as_str());
        Self {
            client: Client::with_config(config),
            model,
            newer_model,
        }
    }

    /// Points the adapter at a different API base (used by tests).
    pub fn with_api_base(mut self, api_base: &str, api_key: String) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        self.client = Client::with_config(config);
        self
    }

    async fn complete(
        &self,
        prompt: &Prompt,
        max_tokens: u32,
        temperature: f32,
    ) -> PortResult<(String, Option<TokenUsage>)> {
        let messages = chat_messages(prompt)?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(messages);
        if self.newer_model {
            args.max_completion_tokens(max_tokens);
        } else {
            args.max_tokens(max_tokens).temperature(temperature);
        }
        let request = args.build().map_err(map_openai_error)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        first_choice_content(response)
    }
}

//=========================================================================================
// `GenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerationService for OpenAiDirectAdapter {
    async fn generate_queries(
        &self,
        category: &CategoryContext,
        count: u8,
    ) -> PortResult<Vec<GeneratedQuery>> {
        let prompt = generation::query_generation_prompt(category, count);
        let (content, _usage) = self
            .complete(&prompt, QUERY_MAX_TOKENS, QUERY_TEMPERATURE)
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
            .complete(&prompt, ANSWER_MAX_TOKENS, ANSWER_TEMPERATURE)
            .await?;
        Ok(GeneratedAnswer {
            text: content,
            usage,
        })
    }
}
