use async_trait::async_trait;

use super::models::Favorite;
use crate::errors::FavoritesError;

/// Storage capability shared by the relational backend and the key-value fallback.
///
/// Listings are ordered most recently added first.
#[async_trait]
pub trait FavoritesBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Upsert; re-adding refreshes the timestamp instead of duplicating.
    async fn add(&self, recipe_id: &str, user_id: &str) -> Result<(), FavoritesError>;

    async fn remove(&self, recipe_id: &str, user_id: &str) -> Result<(), FavoritesError>;

    async fn list(&self, user_id: &str) -> Result<Vec<String>, FavoritesError>;

    async fn contains(&self, recipe_id: &str, user_id: &str) -> Result<bool, FavoritesError>;

    async fn count(&self, user_id: &str) -> Result<usize, FavoritesError> {
        Ok(self.list(user_id).await?.len())
    }

    async fn details(&self, user_id: &str) -> Result<Vec<Favorite>, FavoritesError>;

    async fn clear(&self, user_id: &str) -> Result<(), FavoritesError>;

    /// Release connections held by the backend.
    async fn close(&self) {}
}
