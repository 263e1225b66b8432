use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Inline annotation attached to one specific document version, addressed by
/// `(document_id, document_created_at)`. Suggestions are removed together
/// with their version when forward history is truncated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Suggestion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub document_created_at: DateTime<Utc>,
    pub owner_id: Uuid,
    pub original_text: String,
    pub suggested_text: String,
    pub description: Option<String>,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSuggestion {
    pub document_id: Uuid,
    pub document_created_at: DateTime<Utc>,
    pub owner_id: Uuid,
    pub original_text: String,
    pub suggested_text: String,
    pub description: Option<String>,
}

impl Suggestion {
    pub async fn find_by_document_id(
        pool: &SqlitePool,
        document_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT id, document_id, document_created_at, owner_id,
                      original_text, suggested_text, description, is_resolved, created_at
               FROM suggestions
               WHERE document_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(document_id)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateSuggestion,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO suggestions
                   (id, document_id, document_created_at, owner_id,
                    original_text, suggested_text, description, is_resolved, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8)
               RETURNING id, document_id, document_created_at, owner_id,
                         original_text, suggested_text, description, is_resolved, created_at"#,
        )
        .bind(id)
        .bind(data.document_id)
        .bind(data.document_created_at)
        .bind(data.owner_id)
        .bind(&data.original_text)
        .bind(&data.suggested_text)
        .bind(&data.description)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn resolve(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE suggestions SET is_resolved = 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
