use std::sync::Arc;

use meshforge_pipeline::Pipeline;
use meshforge_store::MetadataStore;
use meshforge_upstream::api::GenerationApi;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Asset metadata, shared with the pipeline.
    pub store: Arc<MetadataStore>,
    pub pipeline: Arc<Pipeline>,
    /// Client for the upstream generation service.
    pub upstream: Arc<GenerationApi>,
    /// Running generation jobs; shutdown waits on it.
    pub jobs: TaskTracker,
}
