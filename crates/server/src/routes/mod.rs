pub mod documents;

use axum::{Router, routing::get};

use crate::AppState;

pub fn router() -> Router<AppState> {
    let document_router = Router::new()
        .route(
            "/",
            get(documents::get_document_versions)
                .post(documents::create_document_version)
                .delete(documents::delete_document_versions),
        )
        .route("/suggestions", get(documents::get_document_suggestions))
        .route("/stream", get(documents::stream_document_ws));

    Router::new().nest("/api/documents/{document_id}", document_router)
}
