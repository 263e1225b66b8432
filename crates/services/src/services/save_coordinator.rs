use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use db::{
    DBService,
    models::document::{ArtifactKind, DocumentVersion},
};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    artifact_store::{self, ArtifactStoreError},
    artifact_view::StreamingRegistry,
    optimistic::CacheTxn,
    version_cache::VersionCache,
};

/// Quiet window for debounced saves.
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(2000);

#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Store(#[from] ArtifactStoreError),
}

#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub owner_id: Uuid,
    pub document_id: Uuid,
    pub title: String,
    pub kind: ArtifactKind,
    pub content: String,
}

#[derive(Debug)]
pub enum SaveOutcome {
    /// Content matches the last persisted version; no store call was made.
    Unchanged,
    /// Queued behind the debounce window or an in-flight persist.
    Scheduled,
    /// Persisted immediately.
    Saved(DocumentVersion),
    /// The document is still streaming; provisional content is never
    /// committed as a version.
    DeferredStreaming,
}

#[derive(Default)]
struct DocState {
    /// Content of the most recent persisted version, loaded lazily.
    last_persisted: Option<String>,
    loaded: bool,
    pending: Option<SaveRequest>,
    in_flight: bool,
    /// Bumped on every new edit and on cancellation. A flush task that wakes
    /// up holding a stale epoch does nothing.
    epoch: u64,
}

/// Turns a stream of content-change notifications into a minimal set of
/// persisted versions: identical content is dropped before any I/O, rapid
/// edits coalesce into one append per quiet window, and at most one append
/// is in flight per document at a time.
#[derive(Clone)]
pub struct SaveCoordinator {
    db: DBService,
    cache: VersionCache,
    streaming: StreamingRegistry,
    states: Arc<DashMap<Uuid, Arc<Mutex<DocState>>>>,
    debounce: Duration,
}

impl SaveCoordinator {
    pub fn new(db: DBService, cache: VersionCache, streaming: StreamingRegistry) -> Self {
        Self {
            db,
            cache,
            streaming,
            states: Arc::new(DashMap::new()),
            debounce: SAVE_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub async fn request_save(
        &self,
        request: SaveRequest,
        debounce: bool,
    ) -> Result<SaveOutcome, SaveError> {
        let document_id = request.document_id;

        if self.streaming.is_streaming(document_id) {
            tracing::debug!(
                document_id = %document_id,
                "content still streaming; save deferred"
            );
            return Ok(SaveOutcome::DeferredStreaming);
        }

        let state = self.state_for(document_id);
        let mut guard = state.lock().await;

        if !guard.loaded {
            guard.last_persisted = self.load_last_persisted(document_id).await?;
            guard.loaded = true;
        }

        if guard.last_persisted.as_deref() == Some(request.content.as_str()) {
            // Also cancels any pending edit: the content is back to what is
            // already persisted, so nothing needs to be written.
            guard.pending = None;
            guard.epoch += 1;
            return Ok(SaveOutcome::Unchanged);
        }

        guard.pending = Some(request);
        guard.epoch += 1;
        let epoch = guard.epoch;

        if guard.in_flight {
            // The running persist reschedules queued edits when it settles.
            return Ok(SaveOutcome::Scheduled);
        }

        drop(guard);

        if debounce {
            self.spawn_flush_after_quiet_window(document_id, epoch);
            Ok(SaveOutcome::Scheduled)
        } else {
            match self.flush(document_id, epoch).await? {
                Some(version) => Ok(SaveOutcome::Saved(version)),
                None => Ok(SaveOutcome::Scheduled),
            }
        }
    }

    /// Cancels any pending debounced save for the document. Called when the
    /// document is unmounted so a stale timer cannot save into a cache entry
    /// nobody is looking at anymore.
    pub async fn cancel_pending(&self, document_id: Uuid) {
        let Some(state) = self.states.get(&document_id).map(|entry| entry.clone()) else {
            return;
        };
        let mut guard = state.lock().await;
        guard.pending = None;
        guard.epoch += 1;
    }

    fn state_for(&self, document_id: Uuid) -> Arc<Mutex<DocState>> {
        self.states.entry(document_id).or_default().clone()
    }

    async fn load_last_persisted(
        &self,
        document_id: Uuid,
    ) -> Result<Option<String>, SaveError> {
        if let Some(content) = self.cache.latest_content(document_id) {
            return Ok(Some(content));
        }
        let latest = DocumentVersion::latest(&self.db.pool, document_id)
            .await
            .map_err(ArtifactStoreError::Database)?;
        Ok(latest.map(|version| version.content))
    }

    fn spawn_flush_after_quiet_window(&self, document_id: Uuid, epoch: u64) {
        let coordinator = self.clone();
        let quiet = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            if let Err(err) = coordinator.flush(document_id, epoch).await {
                tracing::warn!(
                    document_id = %document_id,
                    error = %err,
                    "debounced save failed"
                );
            }
        });
    }

    /// Persists the pending edit if it is still current. The cache gets the
    /// edit speculatively as a provisional version; the server row replaces
    /// it on success, a failure restores the pre-save list. The failed
    /// content stays pending-capable: the next edit re-attempts with the
    /// latest content.
    async fn flush(
        &self,
        document_id: Uuid,
        epoch: u64,
    ) -> Result<Option<DocumentVersion>, SaveError> {
        let state = self.state_for(document_id);
        let mut guard = state.lock().await;
        if guard.epoch != epoch || guard.in_flight {
            return Ok(None);
        }
        if self.streaming.is_streaming(document_id) {
            // A stream started after this flush was scheduled. The edit stays
            // pending; the next request_save after the stream settles will
            // reschedule it.
            return Ok(None);
        }
        let Some(request) = guard.pending.take() else {
            return Ok(None);
        };
        guard.in_flight = true;
        drop(guard);

        let provisional = self.provisional_version(&request);
        let provisional_id = provisional.id;
        let txn = CacheTxn::begin(&self.cache, document_id);
        self.cache.push(document_id, provisional);

        let result = artifact_store::append_version(
            &self.db.pool,
            request.owner_id,
            document_id,
            &request.title,
            request.kind,
            &request.content,
        )
        .await;

        let mut guard = state.lock().await;
        guard.in_flight = false;
        match result {
            Ok(version) => {
                let mut versions = self.cache.snapshot(document_id).unwrap_or_default();
                if versions.last().map(|v| v.id) == Some(provisional_id) {
                    versions.pop();
                }
                versions.push(version.clone());
                self.cache.replace(document_id, versions);
                txn.commit();

                guard.last_persisted = Some(request.content);
                guard.loaded = true;

                if guard.pending.is_some() {
                    // Edits queued behind the in-flight persist get a fresh
                    // quiet window rather than a second concurrent request.
                    let next_epoch = guard.epoch;
                    drop(guard);
                    self.spawn_flush_after_quiet_window(document_id, next_epoch);
                }
                Ok(Some(version))
            }
            Err(err) => {
                txn.rollback();
                if guard.pending.is_some() {
                    // An edit queued behind the failed persist still gets its
                    // own quiet window; the failure must not strand it.
                    let next_epoch = guard.epoch;
                    drop(guard);
                    self.spawn_flush_after_quiet_window(document_id, next_epoch);
                }
                Err(err.into())
            }
        }
    }

    fn provisional_version(&self, request: &SaveRequest) -> DocumentVersion {
        let latest_created_at = self
            .cache
            .snapshot(request.document_id)
            .and_then(|versions| versions.last().map(|version| version.created_at));
        DocumentVersion {
            id: Uuid::new_v4(),
            document_id: request.document_id,
            owner_id: request.owner_id,
            title: request.title.clone(),
            kind: request.kind,
            content: request.content.clone(),
            created_at: utils::timestamp::next_version_timestamp(latest_created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::artifact_store;

    const TEST_DEBOUNCE: Duration = Duration::from_millis(50);

    async fn coordinator() -> (SaveCoordinator, DBService, StreamingRegistry) {
        let db = DBService::in_memory().await.unwrap();
        let streaming = StreamingRegistry::new();
        let coordinator =
            SaveCoordinator::new(db.clone(), VersionCache::new(), streaming.clone())
                .with_debounce(TEST_DEBOUNCE);
        (coordinator, db, streaming)
    }

    fn request(owner_id: Uuid, document_id: Uuid, content: &str) -> SaveRequest {
        SaveRequest {
            owner_id,
            document_id,
            title: "Essay".to_string(),
            kind: ArtifactKind::Text,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn identical_content_saves_at_most_once() {
        let (coordinator, db, _) = coordinator().await;
        let owner_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();

        let first = coordinator
            .request_save(request(owner_id, document_id, "hello"), false)
            .await
            .unwrap();
        assert!(matches!(first, SaveOutcome::Saved(_)));

        let second = coordinator
            .request_save(request(owner_id, document_id, "hello"), false)
            .await
            .unwrap();
        assert!(matches!(second, SaveOutcome::Unchanged));

        let versions = artifact_store::list_versions(&db.pool, owner_id, document_id)
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn rapid_edits_coalesce_into_one_version_with_last_content() {
        let (coordinator, db, _) = coordinator().await;
        let owner_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();

        for content in ["a", "ab", "abc"] {
            let outcome = coordinator
                .request_save(request(owner_id, document_id, content), true)
                .await
                .unwrap();
            assert!(matches!(outcome, SaveOutcome::Scheduled));
        }

        tokio::time::sleep(TEST_DEBOUNCE * 6).await;

        let versions = artifact_store::list_versions(&db.pool, owner_id, document_id)
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].content, "abc");
    }

    #[tokio::test]
    async fn edit_reverted_to_persisted_content_cancels_the_pending_save() {
        let (coordinator, db, _) = coordinator().await;
        let owner_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();

        coordinator
            .request_save(request(owner_id, document_id, "hello"), false)
            .await
            .unwrap();
        coordinator
            .request_save(request(owner_id, document_id, "hello world"), true)
            .await
            .unwrap();
        let outcome = coordinator
            .request_save(request(owner_id, document_id, "hello"), true)
            .await
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::Unchanged));

        tokio::time::sleep(TEST_DEBOUNCE * 6).await;

        let versions = artifact_store::list_versions(&db.pool, owner_id, document_id)
            .await
            .unwrap();
        assert_eq!(versions.len(), 1);
    }

    #[tokio::test]
    async fn streaming_documents_are_never_persisted() {
        let (coordinator, db, streaming) = coordinator().await;
        let owner_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();

        streaming.mark(document_id);
        let outcome = coordinator
            .request_save(request(owner_id, document_id, "partial"), false)
            .await
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::DeferredStreaming));

        let err = artifact_store::list_versions(&db.pool, owner_id, document_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactStoreError::NotFound));

        // Once streaming settles, the next save commits normally.
        streaming.clear(document_id);
        let outcome = coordinator
            .request_save(request(owner_id, document_id, "final"), false)
            .await
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved(_)));
    }

    #[tokio::test]
    async fn edit_queued_behind_a_failing_persist_is_still_saved() {
        let (coordinator, db, _) = coordinator().await;
        let owner_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();

        coordinator
            .request_save(request(owner_id, document_id, "A"), false)
            .await
            .unwrap();

        // Park the in-flight persist on the pool's only connection so the
        // next edit queues behind it.
        let held = db.pool.acquire().await.unwrap();
        let doomed = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .request_save(
                        SaveRequest {
                            owner_id,
                            document_id,
                            title: "Essay".to_string(),
                            kind: ArtifactKind::Code,
                            content: "fn main() {}".to_string(),
                        },
                        false,
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let outcome = coordinator
            .request_save(request(owner_id, document_id, "B"), true)
            .await
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::Scheduled));

        // Release the connection: the kind-mismatched persist now fails,
        // and the queued edit must ride a fresh quiet window anyway.
        drop(held);
        let result = doomed.await.unwrap();
        assert!(matches!(
            result,
            Err(SaveError::Store(ArtifactStoreError::Validation(_)))
        ));

        tokio::time::sleep(TEST_DEBOUNCE * 6).await;

        let versions = artifact_store::list_versions(&db.pool, owner_id, document_id)
            .await
            .unwrap();
        let contents: Vec<_> = versions.iter().map(|v| v.content.as_str()).collect();
        assert_eq!(contents, ["A", "B"]);
    }

    #[tokio::test]
    async fn cancel_pending_drops_the_scheduled_save() {
        let (coordinator, db, _) = coordinator().await;
        let owner_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();

        coordinator
            .request_save(request(owner_id, document_id, "draft"), true)
            .await
            .unwrap();
        coordinator.cancel_pending(document_id).await;

        tokio::time::sleep(TEST_DEBOUNCE * 6).await;

        let err = artifact_store::list_versions(&db.pool, owner_id, document_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactStoreError::NotFound));
    }

    #[tokio::test]
    async fn cache_reflects_the_appended_version_without_refetch() {
        let db = DBService::in_memory().await.unwrap();
        let cache = VersionCache::new();
        let coordinator =
            SaveCoordinator::new(db.clone(), cache.clone(), StreamingRegistry::new())
                .with_debounce(TEST_DEBOUNCE);
        let owner_id = Uuid::new_v4();
        let document_id = Uuid::new_v4();

        let outcome = coordinator
            .request_save(
                SaveRequest {
                    owner_id,
                    document_id,
                    title: "Essay".to_string(),
                    kind: ArtifactKind::Text,
                    content: "hello".to_string(),
                },
                false,
            )
            .await
            .unwrap();

        let SaveOutcome::Saved(version) = outcome else {
            panic!("expected immediate save");
        };
        let snapshot = cache.snapshot(document_id).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, version.id);
        assert_eq!(cache.latest_content(document_id).as_deref(), Some("hello"));
    }
}
