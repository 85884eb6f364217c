//! Handler for starting a generation job.
//!
//! The uploaded image is forwarded to the upstream generation service from
//! a tracked background task that outlives the request. Once the upstream
//! answers, the handler responds with the job's relay stream, or with the
//! upstream failure if it could not be reached.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::StreamExt;
use meshforge_core::naming::new_boundary_token;
use meshforge_pipeline::relay::RelayBody;
use meshforge_pipeline::relay_channel;
use meshforge_upstream::api::{GenerationRequest, UpstreamResponse};
use tokio::sync::oneshot;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Response header carrying the new asset id.
pub const ASSET_ID_HEADER: HeaderName = HeaderName::from_static("x-asset-id");

/// Field names that always win as the uploaded image.
const IMAGE_FIELD_NAMES: &[&str] = &["file", "image"];

/// Upload parsed from the client's multipart form.
#[derive(Debug)]
struct Upload {
    file: Bytes,
    file_name: String,
    content_type: Option<String>,
    /// Whether the file came from one of [`IMAGE_FIELD_NAMES`].
    named: bool,
}

/// Handed from the job task to the handler once the upstream has answered.
struct JobStarted {
    content_type: String,
    body: RelayBody,
}

/// POST /api/v1/generate
///
/// Accepts a multipart form with the image in `file` or `image` (or, failing
/// that, the first file field); other text fields are forwarded upstream.
/// Responds with `multipart/mixed` relay sections and an `X-Asset-Id` header.
pub async fn generate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut upload: Option<Upload> = None;
    let mut fields: Vec<(String, String)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        let named = IMAGE_FIELD_NAMES.contains(&name.as_str());

        if named || field.file_name().is_some() {
            let replace = match &upload {
                None => true,
                Some(current) => named && !current.named,
            };
            let file_name = field.file_name().unwrap_or("upload.png").to_string();
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            if replace {
                upload = Some(Upload {
                    file: data,
                    file_name,
                    content_type,
                    named,
                });
            }
        } else if !name.is_empty() {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            fields.push((name, text));
        }
    }

    let upload =
        upload.ok_or_else(|| AppError::BadRequest("No image file provided".into()))?;
    if upload.file.is_empty() {
        return Err(AppError::BadRequest("Uploaded image is empty".into()));
    }

    let job = state.pipeline.open_job().await?;
    let asset_id = job.asset_id.clone();
    tracing::info!(
        asset_id = %asset_id,
        file_name = %upload.file_name,
        bytes = upload.file.len(),
        fields = fields.len(),
        "Forwarding upload to generation service",
    );

    let request = GenerationRequest {
        file: upload.file,
        file_name: upload.file_name,
        content_type: upload.content_type,
        fields,
    };

    // The upstream call belongs to the job: dropping this handler (client
    // gone, request timeout) leaves it running to completion or abort.
    let (ready_tx, ready_rx) = oneshot::channel();
    let pipeline = Arc::clone(&state.pipeline);
    let upstream = Arc::clone(&state.upstream);
    state.jobs.spawn(async move {
        match upstream.start_generation(request).await {
            Ok(UpstreamResponse {
                content_type,
                stream,
            }) => {
                let (relay, body) = relay_channel(new_boundary_token());
                let started = JobStarted {
                    content_type: relay.content_type(),
                    body,
                };
                if ready_tx.send(Ok(started)).is_err() {
                    tracing::info!(asset_id = %job.asset_id, "Client left before upstream answered");
                }
                pipeline
                    .run(job, content_type.as_deref(), stream, relay)
                    .await;
            }
            Err(e) => {
                pipeline.abort_job(job, &e.to_string()).await;
                let _ = ready_tx.send(Err(e));
            }
        }
    });

    let started = ready_rx
        .await
        .map_err(|_| AppError::InternalError("Generation job ended before starting".into()))??;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, started.content_type)
        .header(header::TRANSFER_ENCODING, "chunked")
        .header(header::CONNECTION, "keep-alive")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(ASSET_ID_HEADER, asset_id)
        .body(Body::from_stream(started.body.map(Ok::<Bytes, Infallible>)))
        .map_err(|e| AppError::InternalError(e.to_string()))
}
