use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

use super::backend::FavoritesBackend;
use super::models::{timestamp_now, Favorite};
use crate::errors::FavoritesError;

pub struct SqliteFavorites {
    pool: Pool<Sqlite>,
}

impl SqliteFavorites {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FavoritesBackend for SqliteFavorites {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn add(&self, recipe_id: &str, user_id: &str) -> Result<(), FavoritesError> {
        sqlx::query("INSERT OR REPLACE INTO favorites (recipeId, userId, addedAt) VALUES (?, ?, ?)")
            .bind(recipe_id)
            .bind(user_id)
            .bind(timestamp_now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn remove(&self, recipe_id: &str, user_id: &str) -> Result<(), FavoritesError> {
        sqlx::query("DELETE FROM favorites WHERE recipeId = ? AND userId = ?")
            .bind(recipe_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<String>, FavoritesError> {
        // id breaks ties between adds inside the same microsecond
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT recipeId FROM favorites WHERE userId = ? ORDER BY addedAt DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn contains(&self, recipe_id: &str, user_id: &str) -> Result<bool, FavoritesError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM favorites WHERE recipeId = ? AND userId = ?",
        )
        .bind(recipe_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn count(&self, user_id: &str) -> Result<usize, FavoritesError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM favorites WHERE userId = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as usize)
    }

    async fn details(&self, user_id: &str) -> Result<Vec<Favorite>, FavoritesError> {
        let favorites = sqlx::query_as::<_, Favorite>(
            r#"
            SELECT id, recipeId AS recipe_id, userId AS user_id, addedAt AS added_at
            FROM favorites
            WHERE userId = ?
            ORDER BY addedAt DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(favorites)
    }

    async fn clear(&self, user_id: &str) -> Result<(), FavoritesError> {
        let result = sqlx::query("DELETE FROM favorites WHERE userId = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        log::info!(
            "Cleared {} favorites for user {}",
            result.rows_affected(),
            user_id
        );
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseLocation;
    use crate::database::DatabaseManager;

    async fn backend() -> SqliteFavorites {
        let manager = DatabaseManager::connect(&DatabaseLocation::Memory)
            .await
            .unwrap();
        SqliteFavorites::new(manager.pool)
    }

    #[tokio::test]
    async fn test_upsert_keeps_single_row_and_refreshes_timestamp() {
        let db = backend().await;

        db.add("r1", "u1").await.unwrap();
        let first = db.details("u1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        db.add("r1", "u1").await.unwrap();
        let second = db.details("u1").await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert!(second[0].added_at > first[0].added_at);
        assert!(second[0].id.is_some());
        assert_eq!(db.count("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let db = backend().await;

        db.add("r1", "u1").await.unwrap();
        db.add("r1", "u2").await.unwrap();
        db.add("r2", "u2").await.unwrap();
        db.clear("u2").await.unwrap();

        assert_eq!(db.list("u1").await.unwrap(), vec!["r1"]);
        assert!(db.list("u2").await.unwrap().is_empty());
        assert!(db.contains("r1", "u1").await.unwrap());
        assert!(!db.contains("r1", "u2").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let db = backend().await;

        for recipe in ["r1", "r2", "r3"] {
            db.add(recipe, "u1").await.unwrap();
        }
        db.add("r1", "u1").await.unwrap();

        assert_eq!(db.list("u1").await.unwrap(), vec!["r1", "r3", "r2"]);
    }

    #[tokio::test]
    async fn test_remove_missing_is_noop() {
        let db = backend().await;
        db.remove("nope", "u1").await.unwrap();
        assert_eq!(db.count("u1").await.unwrap(), 0);
    }
}
