use db::models::document::DocumentVersion;
use uuid::Uuid;

use super::version_cache::VersionCache;

/// Speculative mutation of one cache entry: capture the pre-mutation list,
/// mutate, run the remote call, then either commit (keep the mutation) or
/// roll back (restore the captured list). Both the save coordinator and the
/// rollback operator reconcile through this, so a failed remote call can
/// never leave a partially truncated or padded list behind.
pub(crate) struct CacheTxn<'a> {
    cache: &'a VersionCache,
    document_id: Uuid,
    snapshot: Option<Vec<DocumentVersion>>,
}

impl<'a> CacheTxn<'a> {
    pub(crate) fn begin(cache: &'a VersionCache, document_id: Uuid) -> Self {
        Self {
            cache,
            document_id,
            snapshot: cache.snapshot(document_id),
        }
    }

    pub(crate) fn commit(self) {}

    pub(crate) fn rollback(self) {
        match self.snapshot {
            Some(versions) => self.cache.replace(self.document_id, versions),
            None => self.cache.remove(self.document_id),
        }
    }
}
