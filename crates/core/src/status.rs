//! Canonical lifecycle states of a generation job.
//!
//! The upstream service reports free-text step descriptions; the pipeline
//! normalizes them into this small enum, which is what gets persisted in
//! the metadata record and shown to clients.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one generated asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// Job created, no recognized upstream step seen yet.
    Processing,
    /// Upstream is preprocessing the input image.
    Preprocessing,
    /// Upstream is rendering the preview video.
    RenderingVideo,
    /// Upstream is building the binary model.
    GeneratingModel,
    /// The model part was written to disk.
    ModelSaved,
    /// The preview video part was written to disk.
    VideoSaved,
    /// The job finished successfully.
    Complete,
    /// The job failed. Terminal.
    Error,
}

impl AssetStatus {
    /// Wire name, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Preprocessing => "preprocessing",
            Self::RenderingVideo => "rendering_video",
            Self::GeneratingModel => "generating_model",
            Self::ModelSaved => "model_saved",
            Self::VideoSaved => "video_saved",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// `complete` and `error` end the job; only `error` may follow `complete`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
