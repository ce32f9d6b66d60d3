use async_trait::async_trait;
use std::sync::Arc;

use super::backend::FavoritesBackend;
use super::models::Favorite;
use crate::errors::FavoritesError;
use crate::kv::KeyValueStore;

/// Fallback backend: one key per user holding a JSON array of recipe ids, newest first.
///
/// Each call is a synchronous read-modify-write. Two overlapping writers on
/// the same user race and the last write wins.
pub struct LocalFavorites {
    storage: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl LocalFavorites {
    pub fn new(storage: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    pub fn storage_key(&self, user_id: &str) -> String {
        format!("{}_favorites_{}", self.prefix, user_id)
    }

    fn read(&self, user_id: &str) -> Result<Vec<String>, FavoritesError> {
        let key = self.storage_key(user_id);
        let Some(raw) = self.storage.get_item(&key)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => Ok(ids),
            Err(e) => {
                log::warn!("Unreadable favorites under '{}', treating as empty: {}", key, e);
                Ok(Vec::new())
            }
        }
    }

    fn write(&self, user_id: &str, ids: &[String]) -> Result<(), FavoritesError> {
        let json = serde_json::to_string(ids)?;
        self.storage.set_item(&self.storage_key(user_id), &json)
    }
}

#[async_trait]
impl FavoritesBackend for LocalFavorites {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn add(&self, recipe_id: &str, user_id: &str) -> Result<(), FavoritesError> {
        let mut ids = self.read(user_id)?;
        ids.retain(|id| id != recipe_id);
        ids.insert(0, recipe_id.to_string());
        self.write(user_id, &ids)
    }

    async fn remove(&self, recipe_id: &str, user_id: &str) -> Result<(), FavoritesError> {
        let mut ids = self.read(user_id)?;
        let before = ids.len();
        ids.retain(|id| id != recipe_id);
        if ids.len() == before {
            return Ok(());
        }
        self.write(user_id, &ids)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<String>, FavoritesError> {
        self.read(user_id)
    }

    async fn contains(&self, recipe_id: &str, user_id: &str) -> Result<bool, FavoritesError> {
        Ok(self.read(user_id)?.iter().any(|id| id == recipe_id))
    }

    async fn details(&self, user_id: &str) -> Result<Vec<Favorite>, FavoritesError> {
        Ok(self
            .read(user_id)?
            .into_iter()
            .map(|recipe_id| Favorite {
                id: None,
                recipe_id,
                user_id: user_id.to_string(),
                added_at: None,
            })
            .collect())
    }

    async fn clear(&self, user_id: &str) -> Result<(), FavoritesError> {
        self.storage.remove_item(&self.storage_key(user_id))
    }
}
