//! services/api/src/adapters/gateway_llm.rs
//!
//! This module contains the adapter for the default generation gateway: an
//! OpenAI-compatible chat-completions endpoint fronted by a server-side
//! secret, so users need no key of their own.

use async_openai::{
    config::OpenAIConfig, types::chat::CreateChatCompletionRequestArgs, Client,
};
use async_trait::async_trait;
use query_curation_core::{
    domain::{CategoryContext, GeneratedAnswer, GeneratedQuery, TokenUsage},
    generation::{self, Prompt},
    ports::{GenerationService, PortResult},
};

use crate::adapters::openai_llm::{chat_messages, first_choice_content, map_openai_error};

/// An adapter that implements `GenerationService` against the gateway.
#[derive(Clone)]
pub struct GatewayAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl GatewayAdapter {
    /// Creates a new `GatewayAdapter`. The client is shared and already
    /// carries the gateway base URL and server-side secret.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// The gateway owns per-model limits, so requests carry only the model
    /// and messages.
    async fn complete(&self, prompt: &Prompt) -> PortResult<(String, Option<TokenUsage>)> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(chat_messages(prompt)?)
            .build()
            .map_err(map_openai_error)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        first_choice_content(response)
    }
}

#[async_trait]
impl GenerationService for GatewayAdapter {
    async fn generate_queries(
        &self,
        category: &CategoryContext,
        count: u8,
    ) -> PortResult<Vec<GeneratedQuery>> {
        let prompt = generation::query_generation_prompt(category, count);
        let (content, _usage) = self.complete(&prompt).await?;
        generation::parse_query_candidates(&content)
    }

    async fn generate_answer(
        &self,
        query_text: &str,
        category: &CategoryContext,
    ) -> PortResult<GeneratedAnswer> {
        let prompt = generation::answer_prompt(query_text, category);
        let (content, usage) = self.complete(&prompt).await?;
        Ok(GeneratedAnswer {
            text: content,
            usage,
        })
    }
}
