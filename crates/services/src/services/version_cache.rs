use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use db::models::document::DocumentVersion;
use uuid::Uuid;

/// Client-visible version lists, keyed by document id. This is the single
/// shared mutable resource of the artifact layer: only the save coordinator
/// and the rollback operator write to it (the setters are crate-private),
/// everything else reads snapshots. Every write replaces or restores a whole
/// list under the entry lock, so a reader never observes a half-applied
/// update.
#[derive(Clone, Default)]
pub struct VersionCache {
    entries: Arc<DashMap<Uuid, Vec<DocumentVersion>>>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, document_id: Uuid) -> Option<Vec<DocumentVersion>> {
        self.entries.get(&document_id).map(|entry| entry.clone())
    }

    pub fn latest_content(&self, document_id: Uuid) -> Option<String> {
        self.entries
            .get(&document_id)
            .and_then(|entry| entry.last().map(|version| version.content.clone()))
    }

    pub(crate) fn replace(&self, document_id: Uuid, versions: Vec<DocumentVersion>) {
        self.entries.insert(document_id, versions);
    }

    pub(crate) fn push(&self, document_id: Uuid, version: DocumentVersion) {
        self.entries.entry(document_id).or_default().push(version);
    }

    /// Removes every cached version strictly after `timestamp`. Returns the
    /// removed tail so a failed remote call can put it back.
    pub(crate) fn truncate_after(
        &self,
        document_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Vec<DocumentVersion> {
        let Some(mut entry) = self.entries.get_mut(&document_id) else {
            return Vec::new();
        };
        let keep = entry
            .iter()
            .take_while(|version| version.created_at <= timestamp)
            .count();
        entry.split_off(keep)
    }

    pub(crate) fn remove(&self, document_id: Uuid) {
        self.entries.remove(&document_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use db::models::document::ArtifactKind;

    fn version(document_id: Uuid, content: &str, offset_ms: i64) -> DocumentVersion {
        DocumentVersion {
            id: Uuid::new_v4(),
            document_id,
            owner_id: Uuid::new_v4(),
            title: "Essay".to_string(),
            kind: ArtifactKind::Text,
            content: content.to_string(),
            created_at: Utc::now() + Duration::milliseconds(offset_ms),
        }
    }

    #[test]
    fn truncate_returns_removed_tail_and_keeps_boundary() {
        let cache = VersionCache::new();
        let document_id = Uuid::new_v4();
        let a = version(document_id, "A", 0);
        let b = version(document_id, "B", 1);
        let c = version(document_id, "C", 2);
        cache.replace(document_id, vec![a.clone(), b.clone(), c.clone()]);

        let removed = cache.truncate_after(document_id, b.created_at);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].content, "C");

        let snapshot = cache.snapshot(document_id).unwrap();
        let contents: Vec<_> = snapshot.iter().map(|v| v.content.as_str()).collect();
        assert_eq!(contents, ["A", "B"]);
    }

    #[test]
    fn latest_content_reads_the_tail() {
        let cache = VersionCache::new();
        let document_id = Uuid::new_v4();
        cache.replace(
            document_id,
            vec![version(document_id, "A", 0), version(document_id, "B", 1)],
        );
        assert_eq!(cache.latest_content(document_id).as_deref(), Some("B"));
        assert_eq!(cache.latest_content(Uuid::new_v4()), None);
    }
}
