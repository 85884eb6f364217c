//! Part dispatch.
//!
//! Routes each [`Part`] scanned from the upstream stream by its
//! `Content-Type`: JSON status parts update the job status and are relayed,
//! the preview video and the binary model are queued for saving and
//! announced with an `action` event. Anything else is logged and dropped.

use meshforge_core::naming::{self, DEFAULT_VIDEO_EXTENSION};
use meshforge_core::status::AssetStatus;
use meshforge_store::{FileRef, RecordPatch};
use meshforge_upstream::messages::{parse_message, UpstreamMessage};
use meshforge_upstream::multipart::{Part, PartHeaders};

use crate::config::AssetLayout;
use crate::job::GenerationJob;
use crate::persist::{ArtifactKind, PersistQueue};
use crate::relay::{RelayEncoder, RelayEvent};
use crate::status::Transition;

/// Raw bodies in logs are cut to this many characters.
const LOG_PREVIEW_CHARS: usize = 200;

/// Media-type fragments that mark a part as a 3D model.
const MODEL_MEDIA_MARKERS: &[&str] = &["model/", "gltf", "glb"];

/// Handler a part is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartRoute {
    Status,
    Video,
    Model,
    Ignored,
}

/// Decide where a part goes from its media type.
pub fn route_part(headers: &PartHeaders) -> PartRoute {
    let Some(content_type) = headers.content_type() else {
        return PartRoute::Ignored;
    };
    match content_type {
        "application/json" => PartRoute::Status,
        "video/mp4" => PartRoute::Video,
        "application/octet-stream" => PartRoute::Model,
        other if MODEL_MEDIA_MARKERS.iter().any(|m| other.contains(m)) => PartRoute::Model,
        _ => PartRoute::Ignored,
    }
}

/// Everything a part handler touches, borrowed for one scan pass.
pub struct Dispatcher<'a> {
    pub job: &'a mut GenerationJob,
    pub relay: &'a mut RelayEncoder,
    pub persist: &'a PersistQueue,
    pub layout: &'a AssetLayout,
}

impl Dispatcher<'_> {
    pub fn dispatch(&mut self, part: Part) {
        match route_part(&part.headers) {
            PartRoute::Status => self.handle_status(&part.body),
            PartRoute::Video => self.handle_video(part),
            PartRoute::Model => self.handle_model(part),
            PartRoute::Ignored => {
                tracing::debug!(
                    asset_id = %self.job.asset_id,
                    content_type = part.headers.content_type().unwrap_or(""),
                    bytes = part.body.len(),
                    "Ignoring part with unhandled content type",
                );
            }
        }
    }

    /// Record a failure that did not arrive as an upstream status part.
    pub fn fail(&mut self, message: &str) {
        self.apply_error(message);
        self.relay.emit(&RelayEvent::error(message));
    }

    // ---- individual part handlers ----

    fn handle_status(&mut self, body: &[u8]) {
        match parse_message(body) {
            Ok(UpstreamMessage::Progress(data)) => {
                let step = data.step_text().unwrap_or_default();
                let transition = self.job.status.on_progress(step);
                tracing::debug!(asset_id = %self.job.asset_id, step, "Upstream progress");
                self.persist_transition(transition);
                self.relay
                    .emit(&RelayEvent::progress(data.step, data.message));
            }
            Ok(UpstreamMessage::Complete(data)) => {
                tracing::info!(
                    asset_id = %self.job.asset_id,
                    upstream_file = data.glb_file.as_deref().unwrap_or(""),
                    "Upstream reported completion",
                );
                let transition = self.job.status.on_complete();
                self.persist_transition(transition);
                let event = RelayEvent::complete(data.message).with_model(
                    self.job.asset_id.clone(),
                    naming::model_filename(&self.job.asset_id),
                );
                self.relay.emit(&event);
            }
            Ok(UpstreamMessage::Error(data)) => {
                let message = data.describe();
                tracing::error!(asset_id = %self.job.asset_id, error = %message, "Upstream reported error");
                self.apply_error(&message);
                self.relay.emit(&RelayEvent::error(message));
            }
            Err(e) => {
                let raw = String::from_utf8_lossy(body);
                let preview: String = raw.chars().take(LOG_PREVIEW_CHARS).collect();
                tracing::warn!(
                    asset_id = %self.job.asset_id,
                    error = %e,
                    raw_message = %preview,
                    "Failed to parse upstream status part",
                );
            }
        }
    }

    fn handle_video(&mut self, part: Part) {
        let extension = part
            .headers
            .filename()
            .and_then(naming::extension_from_filename)
            .unwrap_or_else(|| DEFAULT_VIDEO_EXTENSION.to_string());
        let file = naming::video_filename(&self.job.asset_id, &extension);
        let path = self.layout.video_path(&file);
        let url = naming::public_path(&self.layout.video_url_prefix, &file);

        let mut patch = RecordPatch::default().with_video(FileRef {
            file: file.clone(),
            path: url,
        });
        if let Transition::Changed(status) =
            self.job.status.on_artifact_saved(AssetStatus::VideoSaved)
        {
            patch = patch.with_status(status);
        }

        self.job.output_video_path = Some(path.clone());
        self.persist
            .save_artifact(ArtifactKind::Video, path, part.body, patch);
        self.relay
            .emit(&RelayEvent::action(format!("Saved preview video {file}")));
    }

    fn handle_model(&mut self, part: Part) {
        let file = naming::model_filename(&self.job.asset_id);
        let path = self.job.model_path.clone();
        let url = naming::public_path(&self.layout.model_url_prefix, &file);

        let mut patch =
            RecordPatch::default().with_model(file.clone(), path.display().to_string(), url);
        if let Transition::Changed(status) =
            self.job.status.on_artifact_saved(AssetStatus::ModelSaved)
        {
            patch = patch.with_status(status);
        }

        self.job.output_model_path = Some(path.clone());
        self.persist
            .save_artifact(ArtifactKind::Model, path, part.body, patch);
        let event = RelayEvent::action(format!("Saved model {file}"))
            .with_model(self.job.asset_id.clone(), file);
        self.relay.emit(&event);
    }

    // ---- private helpers ----

    fn apply_error(&mut self, message: &str) {
        if let Transition::Changed(status) = self.job.status.on_error() {
            self.persist
                .merge(RecordPatch::status(status).with_error(message));
        }
    }

    fn persist_transition(&self, transition: Transition) {
        if let Transition::Changed(status) = transition {
            self.persist.merge(RecordPatch::status(status));
        }
    }
}
