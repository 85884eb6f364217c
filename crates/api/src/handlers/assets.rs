//! Handlers for asset metadata records.

use std::path::Path as FsPath;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use meshforge_core::error::CoreError;
use meshforge_store::MetadataRecord;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// A metadata record together with its id.
#[derive(Debug, Serialize)]
pub struct AssetResponse {
    pub id: String,
    #[serde(flatten)]
    pub record: MetadataRecord,
}

/// GET /api/v1/assets
///
/// List all asset records, newest first.
pub async fn list(State(state): State<AppState>) -> AppResult<Json<DataResponse<Vec<AssetResponse>>>> {
    let mut assets: Vec<AssetResponse> = state
        .store
        .get_all()
        .await
        .into_iter()
        .map(|(id, record)| AssetResponse { id, record })
        .collect();
    assets.sort_by(|a, b| b.record.created.cmp(&a.record.created));
    Ok(Json(DataResponse { data: assets }))
}

/// GET /api/v1/assets/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<DataResponse<AssetResponse>>> {
    let record = state.store.get(&id).await.ok_or_else(|| not_found(&id))?;
    Ok(Json(DataResponse {
        data: AssetResponse { id, record },
    }))
}

/// DELETE /api/v1/assets/{id}
///
/// Removes the record and, best effort, its model, video and icon files.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let record = state.store.get(&id).await.ok_or_else(|| not_found(&id))?;
    if !state.store.remove(&id).await? {
        return Err(not_found(&id));
    }

    let layout = state.config.asset_layout();
    let mut files = Vec::new();
    if let Some(model_path) = &record.model_path {
        files.push(FsPath::new(model_path).to_path_buf());
    } else if let Some(model_file) = &record.model_file {
        files.push(layout.model_dir.join(model_file));
    }
    if let Some(video) = &record.video {
        files.push(layout.video_dir.join(&video.file));
    }
    if let Some(icon) = &record.icon {
        files.push(layout.icon_dir.join(&icon.file));
    }

    for file in files {
        // Only names produced for this asset are touched.
        let owned = file
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(id.as_str()));
        if !owned {
            tracing::warn!(asset_id = %id, path = %file.display(), "Refusing to delete foreign file");
            continue;
        }
        match tokio::fs::remove_file(&file).await {
            Ok(()) => tracing::debug!(asset_id = %id, path = %file.display(), "Deleted asset file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(asset_id = %id, path = %file.display(), error = %e, "Failed to delete asset file");
            }
        }
    }

    tracing::info!(asset_id = %id, "Asset deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn not_found(id: &str) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Asset",
        id: id.to_string(),
    })
}
