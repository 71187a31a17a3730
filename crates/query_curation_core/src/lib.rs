pub mod batch;
pub mod csv;
pub mod domain;
pub mod export;
pub mod generation;
pub mod ports;
pub mod stats;
pub mod store;

pub use domain::{
    AiSettings, AuthSession, Category, CategoryContext, CategoryPatch, GeneratedAnswer,
    GeneratedQuery, NewQueryItem, ProviderKind, ProviderSelection, QueryItem, QueryPatch,
    QuerySource, QueryStatus, TokenUsage, User, UserCredentials,
};
pub use ports::{
    AuthStore, GenerationService, PortError, PortResult, QueryStore, SettingsStore,
};
pub use store::MemoryStore;
