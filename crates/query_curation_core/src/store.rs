//! crates/query_curation_core/src/store.rs
//!
//! An in-memory implementation of the store ports, keyed by user. One map
//! behind a mutex is plenty here: operations are short and never hold the
//! lock across an await point. The database adapter in the API service is
//! the remote-backed twin of this store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AiSettings, AuthSession, Category, CategoryPatch, NewQueryItem, QueryItem, QueryPatch,
    QueryStatus, User, UserCredentials,
};
use crate::ports::{AuthStore, PortError, PortResult, QueryStore, SettingsStore};

#[derive(Debug, Default)]
struct UserData {
    categories: Vec<Category>,
    queries: Vec<QueryItem>,
    settings: Option<AiSettings>,
}

#[derive(Debug, Default)]
struct AuthData {
    users: Vec<UserCredentials>,
    sessions: Vec<AuthSession>,
}

/// In-memory store for tests and single-process use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<Uuid, UserData>>,
    auth: Mutex<AuthData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_user<T>(&self, user_id: Uuid, f: impl FnOnce(&mut UserData) -> PortResult<T>) -> PortResult<T> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| PortError::Unexpected("store lock poisoned".to_string()))?;
        f(inner.entry(user_id).or_default())
    }
}

fn category_exists(data: &UserData, category_id: &str) -> bool {
    data.categories.iter().any(|c| c.id == category_id)
}

fn require_category(data: &UserData, category_id: &str) -> PortResult<()> {
    if category_exists(data, category_id) {
        Ok(())
    } else {
        Err(PortError::Validation(format!(
            "unknown category id: {category_id}"
        )))
    }
}

#[async_trait]
impl QueryStore for MemoryStore {
    async fn list_categories(&self, user_id: Uuid) -> PortResult<Vec<Category>> {
        self.with_user(user_id, |data| Ok(data.categories.clone()))
    }

    async fn add_category(&self, user_id: Uuid, category: Category) -> PortResult<Category> {
        self.with_user(user_id, |data| {
            if category_exists(data, &category.id) {
                return Err(PortError::Validation(format!(
                    "category id already exists: {}",
                    category.id
                )));
            }
            data.categories.push(category.clone());
            Ok(category)
        })
    }

    async fn update_category(
        &self,
        user_id: Uuid,
        category_id: &str,
        patch: CategoryPatch,
    ) -> PortResult<Category> {
        self.with_user(user_id, |data| {
            let cat = data
                .categories
                .iter_mut()
                .find(|c| c.id == category_id)
                .ok_or_else(|| PortError::NotFound(format!("Category {category_id} not found")))?;
            if let Some(name) = patch.name {
                cat.name = name;
            }
            if let Some(description) = patch.description {
                cat.description = description;
            }
            if let Some(icon) = patch.icon {
                cat.icon = icon;
            }
            cat.updated_at = Utc::now();
            Ok(cat.clone())
        })
    }

    async fn delete_category(&self, user_id: Uuid, category_id: &str) -> PortResult<u64> {
        self.with_user(user_id, |data| {
            let before = data.categories.len();
            data.categories.retain(|c| c.id != category_id);
            if data.categories.len() == before {
                return Err(PortError::NotFound(format!(
                    "Category {category_id} not found"
                )));
            }
            let query_count = data.queries.len();
            data.queries.retain(|q| q.category_id != category_id);
            Ok((query_count - data.queries.len()) as u64)
        })
    }

    async fn list_queries(&self, user_id: Uuid) -> PortResult<Vec<QueryItem>> {
        self.with_user(user_id, |data| Ok(data.queries.clone()))
    }

    async fn get_queries_by_category(
        &self,
        user_id: Uuid,
        category_id: &str,
    ) -> PortResult<Vec<QueryItem>> {
        self.with_user(user_id, |data| {
            Ok(data
                .queries
                .iter()
                .filter(|q| q.category_id == category_id && q.status == QueryStatus::Active)
                .cloned()
                .collect())
        })
    }

    async fn add_query(&self, user_id: Uuid, query: NewQueryItem) -> PortResult<QueryItem> {
        self.with_user(user_id, |data| {
            require_category(data, &query.category_id)?;
            let item = query.into_item();
            data.queries.push(item.clone());
            Ok(item)
        })
    }

    async fn add_queries(
        &self,
        user_id: Uuid,
        queries: Vec<NewQueryItem>,
    ) -> PortResult<Vec<QueryItem>> {
        self.with_user(user_id, |data| {
            for q in &queries {
                require_category(data, &q.category_id)?;
            }
            let items: Vec<QueryItem> = queries.into_iter().map(NewQueryItem::into_item).collect();
            data.queries.extend(items.clone());
            Ok(items)
        })
    }

    async fn update_query(
        &self,
        user_id: Uuid,
        query_id: &str,
        patch: QueryPatch,
    ) -> PortResult<QueryItem> {
        self.with_user(user_id, |data| {
            if let Some(category_id) = &patch.category_id {
                require_category(data, category_id)?;
            }
            let q = data
                .queries
                .iter_mut()
                .find(|q| q.id == query_id)
                .ok_or_else(|| PortError::NotFound(format!("Query {query_id} not found")))?;

            if let Some(category_id) = patch.category_id {
                q.category_id = category_id;
            }
            if let Some(text) = patch.text {
                q.text = text;
            }
            if let Some(tags) = patch.tags {
                q.tags = tags;
            }
            if let Some(status) = patch.status {
                q.status = status;
            }
            if let Some(answer) = patch.answer {
                q.answer = answer;
            }
            if let Some(engine) = patch.ai_engine {
                q.ai_engine = Some(engine);
            }
            if let Some(answer_length) = patch.answer_length {
                q.answer_length = Some(answer_length);
            }
            if let Some(answer_tokens) = patch.answer_tokens {
                q.answer_tokens = Some(answer_tokens);
            }
            q.updated_at = Utc::now();
            Ok(q.clone())
        })
    }

    async fn delete_query(&self, user_id: Uuid, query_id: &str) -> PortResult<()> {
        self.with_user(user_id, |data| {
            let before = data.queries.len();
            data.queries.retain(|q| q.id != query_id);
            if data.queries.len() == before {
                return Err(PortError::NotFound(format!("Query {query_id} not found")));
            }
            Ok(())
        })
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let mut auth = self
            .auth
            .lock()
            .map_err(|_| PortError::Unexpected("store lock poisoned".to_string()))?;
        if auth.users.iter().any(|u| u.email == email) {
            return Err(PortError::Validation(format!(
                "an account already exists for {email}"
            )));
        }
        let creds = UserCredentials {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
        };
        auth.users.push(creds.clone());
        Ok(User {
            user_id: creds.user_id,
            email: creds.email,
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let auth = self
            .auth
            .lock()
            .map_err(|_| PortError::Unexpected("store lock poisoned".to_string()))?;
        auth.users
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("No user for {email}")))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut auth = self
            .auth
            .lock()
            .map_err(|_| PortError::Unexpected("store lock poisoned".to_string()))?;
        auth.sessions.push(AuthSession {
            id: session_id.to_string(),
            user_id,
            expires_at,
        });
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let auth = self
            .auth
            .lock()
            .map_err(|_| PortError::Unexpected("store lock poisoned".to_string()))?;
        auth.sessions
            .iter()
            .find(|s| s.id == session_id && s.expires_at > Utc::now())
            .map(|s| s.user_id)
            .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        let mut auth = self
            .auth
            .lock()
            .map_err(|_| PortError::Unexpected("store lock poisoned".to_string()))?;
        auth.sessions.retain(|s| s.id != session_id);
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load_settings(&self, user_id: Uuid) -> PortResult<AiSettings> {
        self.with_user(user_id, |data| {
            Ok(data.settings.clone().unwrap_or_default())
        })
    }

    async fn save_settings(&self, user_id: Uuid, settings: AiSettings) -> PortResult<()> {
        self.with_user(user_id, |data| {
            data.settings = Some(settings);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuerySource;

    fn category(id: &str) -> Category {
        Category {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            icon: "Folder".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn seeded(user: Uuid) -> MemoryStore {
        let store = MemoryStore::new();
        store.add_category(user, category("weather")).await.unwrap();
        store.add_category(user, category("traffic")).await.unwrap();
        store
    }

    #[tokio::test]
    async fn category_delete_cascades_to_its_queries_only() {
        let user = Uuid::new_v4();
        let store = seeded(user).await;
        for (cat, text) in [("weather", "rain?"), ("weather", "snow?"), ("traffic", "jam?")] {
            store
                .add_query(user, NewQueryItem::manual(cat.into(), text.into(), vec![]))
                .await
                .unwrap();
        }

        let cascaded = store.delete_category(user, "weather").await.unwrap();

        assert_eq!(cascaded, 2);
        let remaining = store.list_queries(user).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].category_id, "traffic");
    }

    #[tokio::test]
    async fn unknown_category_is_rejected_on_every_write_path() {
        let user = Uuid::new_v4();
        let store = seeded(user).await;

        let add = store
            .add_query(user, NewQueryItem::manual("nope".into(), "q".into(), vec![]))
            .await;
        assert!(matches!(add, Err(PortError::Validation(_))));

        let batch = store
            .add_queries(
                user,
                vec![
                    NewQueryItem::manual("weather".into(), "ok".into(), vec![]),
                    NewQueryItem::manual("nope".into(), "bad".into(), vec![]),
                ],
            )
            .await;
        assert!(matches!(batch, Err(PortError::Validation(_))));
        // All-or-nothing: the valid row must not have slipped in.
        assert!(store.list_queries(user).await.unwrap().is_empty());

        let q = store
            .add_query(user, NewQueryItem::manual("weather".into(), "q".into(), vec![]))
            .await
            .unwrap();
        let patch = QueryPatch {
            category_id: Some("nope".into()),
            ..Default::default()
        };
        let update = store.update_query(user, &q.id, patch).await;
        assert!(matches!(update, Err(PortError::Validation(_))));
    }

    #[tokio::test]
    async fn category_listing_filters_archived_queries() {
        let user = Uuid::new_v4();
        let store = seeded(user).await;
        let q = store
            .add_query(user, NewQueryItem::manual("weather".into(), "rain?".into(), vec![]))
            .await
            .unwrap();
        store
            .add_query(user, NewQueryItem::manual("weather".into(), "snow?".into(), vec![]))
            .await
            .unwrap();

        let patch = QueryPatch {
            status: Some(QueryStatus::Archived),
            ..Default::default()
        };
        store.update_query(user, &q.id, patch).await.unwrap();

        let active = store.get_queries_by_category(user, "weather").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].text, "snow?");
    }

    #[tokio::test]
    async fn users_do_not_see_each_other() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let store = seeded(alice).await;

        assert_eq!(store.list_categories(alice).await.unwrap().len(), 2);
        assert!(store.list_categories(bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn settings_default_until_saved() {
        let user = Uuid::new_v4();
        let store = MemoryStore::new();

        let initial = store.load_settings(user).await.unwrap();
        assert_eq!(initial, AiSettings::default());

        let mut custom = AiSettings::default();
        custom.generate_count = 12;
        store.save_settings(user, custom.clone()).await.unwrap();
        assert_eq!(store.load_settings(user).await.unwrap(), custom);
    }

    #[tokio::test]
    async fn update_patches_fields_and_clears_answer() {
        let user = Uuid::new_v4();
        let store = seeded(user).await;
        let q = store
            .add_query(
                user,
                NewQueryItem {
                    answer: Some("old answer".into()),
                    ..NewQueryItem::manual("weather".into(), "rain?".into(), vec![])
                },
            )
            .await
            .unwrap();
        assert_eq!(q.source, QuerySource::Manual);

        let patch = QueryPatch {
            text: Some("rain tomorrow?".into()),
            answer: Some(None),
            ..Default::default()
        };
        let updated = store.update_query(user, &q.id, patch).await.unwrap();

        assert_eq!(updated.text, "rain tomorrow?");
        assert_eq!(updated.answer, None);
        assert!(updated.updated_at >= q.updated_at);
    }
}
