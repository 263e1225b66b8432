pub mod error;
pub mod middleware;
pub mod routes;

use axum::{Router, middleware::from_fn};
use db::DBService;
use services::services::artifact_view::ArtifactViewController;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub artifacts: ArtifactViewController,
}

impl AppState {
    pub fn new(db: DBService) -> Self {
        let artifacts = ArtifactViewController::new(db.clone());
        Self { db, artifacts }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::router())
        .layer(from_fn(middleware::load_owner_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
