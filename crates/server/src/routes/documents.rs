use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Json as ResponseJson},
};
use chrono::{DateTime, Utc};
use db::models::{
    document::{ArtifactKind, DocumentVersion},
    suggestion::Suggestion,
};
use serde::Deserialize;
use services::services::{
    artifact_store::{self, ArtifactStoreError},
    artifact_view::ArtifactStreamEvent,
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, error::ApiError, middleware::OwnerContext};

pub async fn get_document_versions(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Path(document_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<DocumentVersion>>>, ApiError> {
    let versions =
        artifact_store::list_versions(&state.db.pool, owner.owner_id, document_id).await?;
    Ok(ResponseJson(ApiResponse::success(versions)))
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateDocumentRequest {
    pub title: String,
    pub content: String,
    pub kind: ArtifactKind,
}

pub async fn create_document_version(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<CreateDocumentRequest>,
) -> Result<ResponseJson<ApiResponse<DocumentVersion>>, ApiError> {
    let version = artifact_store::append_version(
        &state.db.pool,
        owner.owner_id,
        document_id,
        &payload.title,
        payload.kind,
        &payload.content,
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(version)))
}

#[derive(Debug, Deserialize, TS)]
pub struct DeleteVersionsQuery {
    pub timestamp: DateTime<Utc>,
}

pub async fn delete_document_versions(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Path(document_id): Path<Uuid>,
    Query(query): Query<DeleteVersionsQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<DocumentVersion>>>, ApiError> {
    let deleted = artifact_store::delete_versions_after(
        &state.db.pool,
        owner.owner_id,
        document_id,
        query.timestamp,
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(deleted)))
}

pub async fn get_document_suggestions(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Path(document_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<Vec<Suggestion>>>, ApiError> {
    let suggestions =
        artifact_store::list_suggestions(&state.db.pool, owner.owner_id, document_id).await?;
    Ok(ResponseJson(ApiResponse::success(suggestions)))
}

pub async fn stream_document_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerContext>,
    Path(document_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    // A document that has never been persisted carries no owner yet; once
    // versions exist, the stream is scoped like every other route.
    match artifact_store::list_versions(&state.db.pool, owner.owner_id, document_id).await {
        Ok(_) | Err(ArtifactStoreError::NotFound) => {}
        Err(err) => return Err(err.into()),
    }

    let rx = state.artifacts.subscribe(document_id);

    Ok(ws.on_upgrade(move |socket| async move {
        if let Err(err) = handle_artifact_stream_ws(socket, rx).await {
            tracing::warn!("artifact stream ws closed: {}", err);
        }
    }))
}

async fn handle_artifact_stream_ws(
    socket: WebSocket,
    mut rx: tokio::sync::broadcast::Receiver<ArtifactStreamEvent>,
) -> anyhow::Result<()> {
    use futures_util::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    tokio::spawn(async move { while let Some(Ok(_)) = receiver.next().await {} });

    loop {
        match rx.recv().await {
            Ok(event) => {
                let json = serde_json::to_string(&event)?;
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    Ok(())
}
