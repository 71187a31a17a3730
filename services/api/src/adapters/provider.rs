//! services/api/src/adapters/provider.rs
//!
//! Provider selection: the model allow-lists, request-time validation, and
//! the factory that turns a validated [`ProviderSelection`] into a concrete
//! generation adapter.

use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};

use crate::adapters::{GatewayAdapter, GeminiDirectAdapter, OpenAiDirectAdapter};
use crate::config::Config;
use query_curation_core::domain::ProviderSelection;
use query_curation_core::ports::{GenerationService, PortError, PortResult};

/// Models the default gateway will proxy.
pub const ALLOWED_GATEWAY_MODELS: &[&str] = &[
    "google/gemini-2.5-flash",
    "google/gemini-2.5-pro",
    "openai/gpt-5-mini",
    "openai/gpt-5",
];

/// Models accepted for the direct Gemini API.
pub const ALLOWED_GEMINI_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-2.0-flash",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
];

/// Models accepted for the direct OpenAI API.
pub const ALLOWED_OPENAI_MODELS: &[&str] = &[
    "gpt-4o-mini",
    "gpt-4o",
    "gpt-4.1-2025-04-14",
    "gpt-4.1-mini-2025-04-14",
    "gpt-5-2025-08-07",
    "gpt-5-mini-2025-08-07",
];

/// OpenAI models that take `max_completion_tokens` and reject a temperature.
pub const NEWER_OPENAI_MODELS: &[&str] = &[
    "gpt-5-2025-08-07",
    "gpt-5-mini-2025-08-07",
    "gpt-4.1-2025-04-14",
    "gpt-4.1-mini-2025-04-14",
];

pub const DEFAULT_GATEWAY_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

// Anything shorter is certainly not a real key.
const MIN_KEY_LEN: usize = 10;

/// Checks a provider selection before any network call is made: model must be
/// on the provider's allow-list and direct providers need a plausible key.
pub fn validate_selection(selection: &ProviderSelection) -> PortResult<()> {
    match selection {
        ProviderSelection::Gateway { model } => {
            if !ALLOWED_GATEWAY_MODELS.contains(&model.as_str()) {
                return Err(PortError::Validation(format!(
                    "model '{model}' is not available through the gateway"
                )));
            }
        }
        ProviderSelection::OpenAiDirect { api_key, model } => {
            if api_key.trim().len() < MIN_KEY_LEN {
                return Err(PortError::Validation(
                    "a valid OpenAI API key is required".to_string(),
                ));
            }
            if !ALLOWED_OPENAI_MODELS.contains(&model.as_str()) {
                return Err(PortError::Validation(format!(
                    "model '{model}' is not an allowed OpenAI model"
                )));
            }
        }
        ProviderSelection::GeminiDirect { api_key, model } => {
            if api_key.trim().len() < MIN_KEY_LEN {
                return Err(PortError::Validation(
                    "a valid Gemini API key is required".to_string(),
                ));
            }
            if !ALLOWED_GEMINI_MODELS.contains(&model.as_str()) {
                return Err(PortError::Validation(format!(
                    "model '{model}' is not an allowed Gemini model"
                )));
            }
        }
    }
    Ok(())
}

/// Resolves a provider selection into a ready-to-call generation service.
/// The handler tests swap in a scripted factory through this seam.
pub trait ProviderFactory: Send + Sync {
    fn resolve(&self, selection: &ProviderSelection) -> PortResult<Arc<dyn GenerationService>>;
}

/// The production factory: one shared gateway client, direct adapters built
/// per request from the user-supplied key.
pub struct LiveProviderFactory {
    gateway_client: Option<Client<OpenAIConfig>>,
}

impl LiveProviderFactory {
    pub fn from_config(config: &Config) -> Self {
        let gateway_client = config.gateway_api_key.as_ref().map(|key| {
            let openai_config = OpenAIConfig::new()
                .with_api_key(key)
                .with_api_base(&config.gateway_base_url);
            Client::with_config(openai_config)
        });
        Self { gateway_client }
    }
}

impl ProviderFactory for LiveProviderFactory {
    fn resolve(&self, selection: &ProviderSelection) -> PortResult<Arc<dyn GenerationService>> {
        validate_selection(selection)?;
        match selection {
            ProviderSelection::Gateway { model } => {
                let client = self.gateway_client.clone().ok_or_else(|| {
                    PortError::Unexpected("the generation gateway is not configured".to_string())
                })?;
                Ok(Arc::new(GatewayAdapter::new(client, model.clone())))
            }
            ProviderSelection::OpenAiDirect { api_key, model } => Ok(Arc::new(
                OpenAiDirectAdapter::new(api_key.clone(), model.clone()),
            )),
            ProviderSelection::GeminiDirect { api_key, model } => Ok(Arc::new(
                GeminiDirectAdapter::new(api_key.clone(), model.clone())?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_models_are_allow_listed() {
        let ok = ProviderSelection::Gateway {
            model: DEFAULT_GATEWAY_MODEL.to_string(),
        };
        assert!(validate_selection(&ok).is_ok());

        let bad = ProviderSelection::Gateway {
            model: "anything/else".to_string(),
        };
        assert!(matches!(
            validate_selection(&bad),
            Err(PortError::Validation(_))
        ));
    }

    #[test]
    fn direct_providers_require_a_plausible_key() {
        let short = ProviderSelection::GeminiDirect {
            api_key: "short".to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
        };
        assert!(matches!(
            validate_selection(&short),
            Err(PortError::Validation(_))
        ));

        let ok = ProviderSelection::OpenAiDirect {
            api_key: "sk-0123456789".to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
        };
        assert!(validate_selection(&ok).is_ok());
    }
}
