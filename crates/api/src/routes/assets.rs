//! Route definitions for asset metadata.
//!
//! Mounted at `/assets`.
//!
//! ```text
//! GET    /         list
//! GET    /{id}     get_by_id
//! DELETE /{id}     delete
//! ```

use axum::routing::get;
use axum::Router;

use crate::handlers::assets;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(assets::list))
        .route("/{id}", get(assets::get_by_id).delete(assets::delete))
}
