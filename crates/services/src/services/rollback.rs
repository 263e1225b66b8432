use db::{DBService, models::document::DocumentVersion};
use uuid::Uuid;

use super::{
    artifact_store::{self, ArtifactStoreError},
    optimistic::CacheTxn,
    version_cache::VersionCache,
};

/// Truncates a document's forward history at a chosen version. The cached
/// list is trimmed optimistically before the store round-trip; a failed
/// delete restores it, so the client never sits on a partially truncated
/// list.
#[derive(Clone)]
pub struct RollbackOperator {
    db: DBService,
    cache: VersionCache,
}

impl RollbackOperator {
    pub fn new(db: DBService, cache: VersionCache) -> Self {
        Self { db, cache }
    }

    /// Reverts the document to the version at `index` (kept), deleting every
    /// later version. Returns the retained list, oldest first.
    pub async fn revert_to(
        &self,
        owner_id: Uuid,
        document_id: Uuid,
        index: usize,
    ) -> Result<Vec<DocumentVersion>, ArtifactStoreError> {
        let versions = match self.cache.snapshot(document_id) {
            Some(versions) if !versions.is_empty() => versions,
            _ => {
                let versions =
                    artifact_store::list_versions(&self.db.pool, owner_id, document_id).await?;
                self.cache.replace(document_id, versions.clone());
                versions
            }
        };

        let Some(target) = versions.get(index) else {
            return Err(ArtifactStoreError::Validation(format!(
                "version index {} out of range ({} versions)",
                index,
                versions.len()
            )));
        };
        let timestamp = target.created_at;

        let txn = CacheTxn::begin(&self.cache, document_id);
        let removed = self.cache.truncate_after(document_id, timestamp);

        match artifact_store::delete_versions_after(&self.db.pool, owner_id, document_id, timestamp)
            .await
        {
            Ok(deleted) => {
                txn.commit();
                tracing::debug!(
                    document_id = %document_id,
                    retained = index + 1,
                    deleted = deleted.len(),
                    "reverted document history"
                );
                Ok(self.cache.snapshot(document_id).unwrap_or_default())
            }
            Err(err) => {
                tracing::warn!(
                    document_id = %document_id,
                    error = %err,
                    restored = removed.len(),
                    "revert failed; restoring optimistic truncation"
                );
                txn.rollback();
                Err(err)
            }
        }
    }
}
