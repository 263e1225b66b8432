use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use db::{
    DBService,
    models::document::{ArtifactKind, DocumentVersion},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    artifact_store::{self, ArtifactStoreError},
    rollback::RollbackOperator,
    save_coordinator::{SaveCoordinator, SaveError, SaveOutcome, SaveRequest},
    version_cache::VersionCache,
    version_resolver,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Streaming,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Edit,
    Diff,
}

/// The one piece of UI-facing artifact state. `document_id == None` is the
/// uninitialized sentinel before any artifact has been opened. Never
/// persisted; only the content it carries ever becomes a version.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ArtifactViewState {
    pub document_id: Option<Uuid>,
    pub kind: Option<ArtifactKind>,
    pub title: String,
    pub content: String,
    pub is_visible: bool,
    pub status: ArtifactStatus,
    pub mode: ViewMode,
}

impl Default for ArtifactViewState {
    fn default() -> Self {
        Self {
            document_id: None,
            kind: None,
            title: String::new(),
            content: String::new(),
            is_visible: false,
            status: ArtifactStatus::Idle,
            mode: ViewMode::Edit,
        }
    }
}

/// Documents currently receiving streamed content. Shared with the save
/// coordinator so provisional content can never be committed as a version.
#[derive(Clone, Default)]
pub struct StreamingRegistry {
    streaming: Arc<DashMap<Uuid, ()>>,
}

impl StreamingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, document_id: Uuid) {
        self.streaming.insert(document_id, ());
    }

    pub fn clear(&self, document_id: Uuid) {
        self.streaming.remove(&document_id);
    }

    pub fn is_streaming(&self, document_id: Uuid) -> bool {
        self.streaming.contains_key(&document_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum ArtifactStreamEvent {
    StreamStarted {
        document_id: Uuid,
        kind: ArtifactKind,
        title: String,
    },
    /// Full content-so-far snapshot, not a diff: the upstream generator
    /// emits complete replacements.
    ContentDelta {
        document_id: Uuid,
        content: String,
    },
    StreamFinished {
        document_id: Uuid,
    },
    VisibilityChanged {
        document_id: Option<Uuid>,
        is_visible: bool,
    },
}

/// Mediates between streamed content from the generation layer and persisted
/// versions. Two states: `Idle` and `Streaming`. While streaming, chunks
/// only touch the in-memory view; a version can be appended only after the
/// stream settles and an edit (or explicit settle) goes through the save
/// coordinator.
#[derive(Clone)]
pub struct ArtifactViewController {
    db: DBService,
    cache: VersionCache,
    saves: SaveCoordinator,
    rollback: RollbackOperator,
    streaming: StreamingRegistry,
    state: Arc<RwLock<ArtifactViewState>>,
    streams: Arc<DashMap<Uuid, broadcast::Sender<ArtifactStreamEvent>>>,
}

impl ArtifactViewController {
    pub fn new(db: DBService) -> Self {
        let cache = VersionCache::new();
        let streaming = StreamingRegistry::new();
        let saves = SaveCoordinator::new(db.clone(), cache.clone(), streaming.clone());
        let rollback = RollbackOperator::new(db.clone(), cache.clone());
        Self {
            db,
            cache,
            saves,
            rollback,
            streaming,
            state: Arc::new(RwLock::new(ArtifactViewState::default())),
            streams: Arc::new(DashMap::new()),
        }
    }

    pub fn cache(&self) -> &VersionCache {
        &self.cache
    }

    pub fn saves(&self) -> &SaveCoordinator {
        &self.saves
    }

    pub fn state(&self) -> ArtifactViewState {
        self.state.read().expect("artifact view state poisoned").clone()
    }

    pub fn subscribe(&self, document_id: Uuid) -> broadcast::Receiver<ArtifactStreamEvent> {
        self.sender_for(document_id).subscribe()
    }

    /// Opens an existing artifact: shows the panel and adopts the latest
    /// persisted content. A failed fetch degrades to the in-memory content
    /// instead of blocking the panel.
    pub async fn open(
        &self,
        owner_id: Uuid,
        document_id: Uuid,
        kind: ArtifactKind,
        title: &str,
    ) {
        {
            let mut state = self.state.write().expect("artifact view state poisoned");
            state.document_id = Some(document_id);
            state.kind = Some(kind);
            state.title = title.to_string();
            state.is_visible = true;
            state.status = ArtifactStatus::Idle;
            state.mode = ViewMode::Edit;
        }

        match artifact_store::list_versions(&self.db.pool, owner_id, document_id).await {
            Ok(versions) => {
                let content =
                    version_resolver::content_at(&versions, version_resolver::latest(&versions))
                        .to_string();
                self.cache.replace(document_id, versions);
                let mut state = self.state.write().expect("artifact view state poisoned");
                state.content = content;
            }
            Err(ArtifactStoreError::NotFound) => {
                // Brand new document: nothing persisted yet.
            }
            Err(err) => {
                tracing::warn!(
                    document_id = %document_id,
                    error = %err,
                    "version fetch failed; showing in-memory content only"
                );
            }
        }
    }

    /// `idle -> streaming`: the generation layer starts emitting content for
    /// a new or existing document.
    pub fn begin_stream(&self, document_id: Uuid, kind: ArtifactKind, title: &str) {
        self.streaming.mark(document_id);
        {
            let mut state = self.state.write().expect("artifact view state poisoned");
            state.document_id = Some(document_id);
            state.kind = Some(kind);
            state.title = title.to_string();
            state.content.clear();
            state.status = ArtifactStatus::Streaming;
            state.mode = ViewMode::Edit;
        }
        self.emit(
            document_id,
            ArtifactStreamEvent::StreamStarted {
                document_id,
                kind,
                title: title.to_string(),
            },
        );
    }

    /// Applies one streamed chunk: full-content replacement. Chunks for a
    /// document that is not the one streaming are dropped.
    pub fn apply_chunk(&self, document_id: Uuid, content: &str) {
        {
            let mut state = self.state.write().expect("artifact view state poisoned");
            if state.status != ArtifactStatus::Streaming
                || state.document_id != Some(document_id)
            {
                return;
            }
            state.content = content.to_string();
        }
        self.emit(
            document_id,
            ArtifactStreamEvent::ContentDelta {
                document_id,
                content: content.to_string(),
            },
        );
    }

    /// `streaming -> idle`: refreshes the version list and reconciles any
    /// drift between streamed and persisted content by adopting the most
    /// recent version. With nothing persisted (or a failed fetch) the
    /// streamed content stays on screen.
    pub async fn finish_stream(&self, owner_id: Uuid, document_id: Uuid) {
        self.streaming.clear(document_id);
        {
            let mut state = self.state.write().expect("artifact view state poisoned");
            state.status = ArtifactStatus::Idle;
        }

        match artifact_store::list_versions(&self.db.pool, owner_id, document_id).await {
            Ok(versions) => {
                let content =
                    version_resolver::content_at(&versions, version_resolver::latest(&versions))
                        .to_string();
                self.cache.replace(document_id, versions);
                let mut state = self.state.write().expect("artifact view state poisoned");
                if state.document_id == Some(document_id) {
                    state.content = content;
                }
            }
            Err(ArtifactStoreError::NotFound) => {}
            Err(err) => {
                tracing::warn!(
                    document_id = %document_id,
                    error = %err,
                    "post-stream refresh failed; keeping streamed content"
                );
            }
        }

        self.emit(document_id, ArtifactStreamEvent::StreamFinished { document_id });
    }

    /// Toggles the panel independently of streaming; closing never cancels
    /// an in-flight stream or save.
    pub fn set_visible(&self, is_visible: bool) {
        let document_id = {
            let mut state = self.state.write().expect("artifact view state poisoned");
            state.is_visible = is_visible;
            state.document_id
        };
        if let Some(document_id) = document_id {
            self.emit(
                document_id,
                ArtifactStreamEvent::VisibilityChanged {
                    document_id: Some(document_id),
                    is_visible,
                },
            );
        }
    }

    /// Direct user edit: updates the view and forwards to the save
    /// coordinator (debounced). The controller never persists on its own.
    pub async fn edit(&self, owner_id: Uuid, content: &str) -> Result<SaveOutcome, SaveError> {
        let (document_id, kind, title) = {
            let mut state = self.state.write().expect("artifact view state poisoned");
            let (Some(document_id), Some(kind)) = (state.document_id, state.kind) else {
                return Err(SaveError::Store(ArtifactStoreError::Validation(
                    "no artifact open".to_string(),
                )));
            };
            state.content = content.to_string();
            (document_id, kind, state.title.clone())
        };

        self.saves
            .request_save(
                SaveRequest {
                    owner_id,
                    document_id,
                    title,
                    kind,
                    content: content.to_string(),
                },
                true,
            )
            .await
    }

    /// Navigates to a historical version. Anything but the current version
    /// is shown in diff mode.
    pub fn view_version(&self, index: usize) {
        let mut state = self.state.write().expect("artifact view state poisoned");
        let Some(document_id) = state.document_id else {
            return;
        };
        let versions = self.cache.snapshot(document_id).unwrap_or_default();
        state.content = version_resolver::content_at(&versions, index).to_string();
        state.mode = if version_resolver::is_current(index, &versions) {
            ViewMode::Edit
        } else {
            ViewMode::Diff
        };
    }

    /// Truncates forward history at `index`. On success the now-last
    /// retained version becomes current and the view returns to the live
    /// edit mode.
    pub async fn revert_to(
        &self,
        owner_id: Uuid,
        document_id: Uuid,
        index: usize,
    ) -> Result<Vec<DocumentVersion>, ArtifactStoreError> {
        let retained = self.rollback.revert_to(owner_id, document_id, index).await?;
        let mut state = self.state.write().expect("artifact view state poisoned");
        if state.document_id == Some(document_id) {
            state.mode = ViewMode::Edit;
            state.content = version_resolver::content_at(
                &retained,
                version_resolver::latest(&retained),
            )
            .to_string();
        }
        Ok(retained)
    }

    /// Unmount hook: drops any pending debounced save so a stale timer
    /// cannot write into a cache entry for a document nobody is viewing.
    pub async fn unmount(&self, document_id: Uuid) {
        self.saves.cancel_pending(document_id).await;
        let mut state = self.state.write().expect("artifact view state poisoned");
        if state.document_id == Some(document_id) {
            *state = ArtifactViewState::default();
        }
    }

    fn emit(&self, document_id: Uuid, event: ArtifactStreamEvent) {
        let sender = self.sender_for(document_id);
        let _ = sender.send(event);
    }

    fn sender_for(&self, document_id: Uuid) -> broadcast::Sender<ArtifactStreamEvent> {
        if let Some(entry) = self.streams.get(&document_id) {
            return entry.clone();
        }
        let (sender, _) = broadcast::channel(1024);
        self.streams.insert(document_id, sender.clone());
        sender
    }
}
