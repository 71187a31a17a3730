//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::adapters::ProviderFactory;
use crate::config::Config;
use query_curation_core::ports::{AuthStore, QueryStore, SettingsStore};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers. Stores and the provider factory sit behind trait objects so the
/// handler tests can run against the in-memory store and scripted providers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn QueryStore>,
    pub auth: Arc<dyn AuthStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub providers: Arc<dyn ProviderFactory>,
    pub config: Arc<Config>,
}
