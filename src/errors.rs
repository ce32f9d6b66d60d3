use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum FavoritesError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Operation '{0}' timed out")]
    Timeout(String),

    #[error("Operation queue is closed")]
    QueueClosed,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Relational backend unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for FavoritesError {
    fn from(e: sqlx::Error) -> Self {
        FavoritesError::Database(e.to_string())
    }
}

impl From<std::io::Error> for FavoritesError {
    fn from(e: std::io::Error) -> Self {
        FavoritesError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for FavoritesError {
    fn from(e: serde_json::Error) -> Self {
        FavoritesError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_with_tag() {
        let err = FavoritesError::Timeout("add_favorite".to_string());
        let json = serde_json::to_value(&err).unwrap();

        assert_eq!(json["type"], "Timeout");
        assert_eq!(json["message"], "add_favorite");
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: FavoritesError = io.into();

        assert!(matches!(err, FavoritesError::Storage(_)));
        assert_eq!(err.to_string(), "Storage error: disk full");
    }
}
