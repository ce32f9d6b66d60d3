use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    /// Row id; only the relational backend has one.
    pub id: Option<i64>,
    pub recipe_id: String,
    pub user_id: String,
    /// RFC 3339 timestamp; the fallback store does not record it.
    pub added_at: Option<String>,
}

pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
