use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::fs;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::DatabaseLocation;
use crate::errors::FavoritesError;
use crate::favorites::{FavoritesBackend, SqliteFavorites};

pub struct DatabaseManager {
    pub pool: Pool<Sqlite>,
}

impl DatabaseManager {
    /// Opens the database with a single shared connection and applies the schema.
    pub async fn connect(location: &DatabaseLocation) -> Result<Self, FavoritesError> {
        let options = match location {
            DatabaseLocation::File(db_path) => {
                if let Some(dir) = db_path.parent() {
                    if !dir.as_os_str().is_empty() && !dir.exists() {
                        fs::create_dir_all(dir)?;
                    }
                }
                log::info!("Connecting to database at: {:?}", db_path);
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .create_if_missing(true)
            }
            DatabaseLocation::Memory => {
                log::info!("Connecting to in-memory database");
                SqliteConnectOptions::from_str("sqlite::memory:")?
            }
        };

        // one connection: only the queue worker talks to it, and an in-memory
        // database lives exactly as long as its connection
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| FavoritesError::Unavailable(format!("Failed to connect to database: {}", e)))?;

        let schema = include_str!("schema.sql");

        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&pool).await.map_err(|e| {
                    FavoritesError::Database(format!(
                        "Failed to execute schema statement '{}': {}",
                        stmt, e
                    ))
                })?;
            }
        }

        Ok(Self { pool })
    }
}

/// Opens the relational backend. Used once per store.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Web hosts: set up the in-page store before the first connection.
    async fn prepare_web_store(&self) -> Result<(), FavoritesError> {
        Ok(())
    }

    async fn connect(&self) -> Result<Arc<dyn FavoritesBackend>, FavoritesError>;
}

pub struct SqliteConnector {
    location: DatabaseLocation,
}

impl SqliteConnector {
    pub fn new(location: DatabaseLocation) -> Self {
        Self { location }
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(&self) -> Result<Arc<dyn FavoritesBackend>, FavoritesError> {
        let manager = DatabaseManager::connect(&self.location).await?;
        Ok(Arc::new(SqliteFavorites::new(manager.pool)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let location = DatabaseLocation::File(dir.path().join("db").join("mealmates.db"));

        let first = DatabaseManager::connect(&location).await.unwrap();
        first.pool.close().await;

        let second = DatabaseManager::connect(&location).await.unwrap();
        let indexes: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_favorites_%' ORDER BY name",
        )
        .fetch_all(&second.pool)
        .await
        .unwrap();

        let names: Vec<&str> = indexes.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(names, vec!["idx_favorites_recipe", "idx_favorites_user"]);
    }

    #[tokio::test]
    async fn test_unreachable_path_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        // parent "directory" is a regular file
        let location = DatabaseLocation::File(blocker.join("mealmates.db"));

        let result = SqliteConnector::new(location).connect().await;
        assert!(result.is_err());
    }
}
