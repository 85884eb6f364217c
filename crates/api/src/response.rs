//! Response envelope for API handlers.
//!
//! Record endpoints answer with `{ "data": ... }`; the generation endpoint
//! streams its relay body instead.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
///
/// ```ignore
/// Ok(Json(DataResponse { data: assets }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
