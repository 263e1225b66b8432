use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Closed set of artifact content types. Fixed for the lifetime of a
/// document: every version of one `document_id` carries the same kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, Display, EnumString, TS,
)]
#[sqlx(type_name = "artifact_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ArtifactKind {
    Text,
    Code,
    Sheet,
    Image,
}

/// One immutable version of a document. Versions of a document are totally
/// ordered by `created_at`; the row id is a surrogate and plays no part in
/// ordering.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentVersion {
    pub id: Uuid,
    pub document_id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub kind: ArtifactKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocumentVersion {
    pub document_id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub kind: ArtifactKind,
    pub content: String,
}

impl DocumentVersion {
    pub async fn find_by_document_id(
        pool: &SqlitePool,
        document_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT id, document_id, owner_id, title, kind, content, created_at
               FROM documents
               WHERE document_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(document_id)
        .fetch_all(pool)
        .await
    }

    pub async fn latest(
        pool: &SqlitePool,
        document_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT id, document_id, owner_id, title, kind, content, created_at
               FROM documents
               WHERE document_id = $1
               ORDER BY created_at DESC
               LIMIT 1"#,
        )
        .bind(document_id)
        .fetch_optional(pool)
        .await
    }

    /// Appends a new version. The timestamp is taken from the wall clock but
    /// bumped past the current latest version when the clock has not moved,
    /// so `created_at` is strictly increasing within a document.
    pub async fn create(
        pool: &SqlitePool,
        data: &CreateDocumentVersion,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let latest = Self::latest(pool, data.document_id).await?;
        let created_at =
            utils::timestamp::next_version_timestamp(latest.map(|version| version.created_at));

        sqlx::query_as::<_, Self>(
            r#"INSERT INTO documents (id, document_id, owner_id, title, kind, content, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, document_id, owner_id, title, kind, content, created_at"#,
        )
        .bind(id)
        .bind(data.document_id)
        .bind(data.owner_id)
        .bind(&data.title)
        .bind(data.kind)
        .bind(&data.content)
        .bind(created_at)
        .fetch_one(pool)
        .await
    }

    /// Deletes every version with `created_at` strictly after `after`, along
    /// with the suggestions attached to the removed versions. Returns the
    /// deleted versions, oldest first.
    pub async fn delete_after_timestamp(
        pool: &SqlitePool,
        document_id: Uuid,
        after: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let deleted = sqlx::query_as::<_, Self>(
            r#"SELECT id, document_id, owner_id, title, kind, content, created_at
               FROM documents
               WHERE document_id = $1 AND created_at > $2
               ORDER BY created_at ASC"#,
        )
        .bind(document_id)
        .bind(after)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM suggestions WHERE document_id = $1 AND document_created_at > $2",
        )
        .bind(document_id)
        .bind(after)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM documents WHERE document_id = $1 AND created_at > $2")
            .bind(document_id)
            .bind(after)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted)
    }
}
