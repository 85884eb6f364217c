pub mod assets;
pub mod generation;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /generate                  start a generation job (POST, multipart upload)
///
/// /assets                    list asset records
/// /assets/{id}               get, delete
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(generation::router())
        .nest("/assets", assets::router())
}
