use chrono::{DateTime, Utc};
use db::models::{
    document::{ArtifactKind, CreateDocumentVersion, DocumentVersion},
    suggestion::Suggestion,
};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ArtifactStoreError {
    #[error("Document not found")]
    NotFound,
    #[error("Document belongs to another owner")]
    Forbidden,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Per-kind validation strategy. The kind set is closed, so dispatch is a
/// plain lookup rather than anything trait-based.
struct KindStrategy {
    validate: fn(&str) -> Result<(), String>,
}

fn validate_any(_content: &str) -> Result<(), String> {
    Ok(())
}

fn validate_image_reference(content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("image artifacts require a storage reference".to_string());
    }
    if content.lines().count() > 1 {
        return Err("image reference must be a single line".to_string());
    }
    Ok(())
}

fn strategy(kind: ArtifactKind) -> &'static KindStrategy {
    static OPAQUE: KindStrategy = KindStrategy {
        validate: validate_any,
    };
    static IMAGE: KindStrategy = KindStrategy {
        validate: validate_image_reference,
    };
    match kind {
        ArtifactKind::Text | ArtifactKind::Code | ArtifactKind::Sheet => &OPAQUE,
        ArtifactKind::Image => &IMAGE,
    }
}

/// All versions of a document, oldest first. The caller only ever sees its
/// own documents: an id owned by someone else fails with `Forbidden`, an
/// unknown id with `NotFound`.
pub async fn list_versions(
    pool: &SqlitePool,
    owner_id: Uuid,
    document_id: Uuid,
) -> Result<Vec<DocumentVersion>, ArtifactStoreError> {
    let versions = DocumentVersion::find_by_document_id(pool, document_id).await?;
    let Some(first) = versions.first() else {
        return Err(ArtifactStoreError::NotFound);
    };
    if first.owner_id != owner_id {
        return Err(ArtifactStoreError::Forbidden);
    }
    Ok(versions)
}

/// Appends one new version. Never overwrites: the version list only grows.
/// The kind is fixed by the first version; a mismatching kind is rejected.
pub async fn append_version(
    pool: &SqlitePool,
    owner_id: Uuid,
    document_id: Uuid,
    title: &str,
    kind: ArtifactKind,
    content: &str,
) -> Result<DocumentVersion, ArtifactStoreError> {
    if title.trim().is_empty() {
        return Err(ArtifactStoreError::Validation(
            "title must not be empty".to_string(),
        ));
    }
    (strategy(kind).validate)(content).map_err(ArtifactStoreError::Validation)?;

    if let Some(latest) = DocumentVersion::latest(pool, document_id).await? {
        if latest.owner_id != owner_id {
            return Err(ArtifactStoreError::Forbidden);
        }
        if latest.kind != kind {
            return Err(ArtifactStoreError::Validation(format!(
                "artifact kind is fixed once created (existing: {}, got: {})",
                latest.kind, kind
            )));
        }
    }

    let version = DocumentVersion::create(
        pool,
        &CreateDocumentVersion {
            document_id,
            owner_id,
            title: title.to_string(),
            kind,
            content: content.to_string(),
        },
        Uuid::new_v4(),
    )
    .await?;

    tracing::debug!(
        document_id = %document_id,
        created_at = %version.created_at,
        "appended document version"
    );
    Ok(version)
}

/// Truncates forward history: removes exactly the versions with
/// `created_at > timestamp` (the version at the timestamp is retained),
/// cascading the suggestions attached to the removed versions. Returns the
/// deleted versions.
pub async fn delete_versions_after(
    pool: &SqlitePool,
    owner_id: Uuid,
    document_id: Uuid,
    timestamp: DateTime<Utc>,
) -> Result<Vec<DocumentVersion>, ArtifactStoreError> {
    // Ownership is checked against the full history, not just the tail,
    // so a truncation past every version still authorizes correctly.
    list_versions(pool, owner_id, document_id).await?;

    let deleted = DocumentVersion::delete_after_timestamp(pool, document_id, timestamp).await?;
    tracing::debug!(
        document_id = %document_id,
        deleted = deleted.len(),
        "truncated document history"
    );
    Ok(deleted)
}

pub async fn list_suggestions(
    pool: &SqlitePool,
    owner_id: Uuid,
    document_id: Uuid,
) -> Result<Vec<Suggestion>, ArtifactStoreError> {
    list_versions(pool, owner_id, document_id).await?;
    Ok(Suggestion::find_by_document_id(pool, document_id).await?)
}
