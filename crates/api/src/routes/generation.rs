//! Route definitions for generation jobs.
//!
//! ```text
//! POST /generate      start a job and stream its relay
//! ```

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;

/// Largest accepted upload (image plus form fields).
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generation::generate))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}
