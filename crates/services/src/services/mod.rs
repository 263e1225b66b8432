pub mod artifact_store;
pub mod artifact_view;
pub mod optimistic;
pub mod rollback;
pub mod save_coordinator;
pub mod version_cache;
pub mod version_resolver;
