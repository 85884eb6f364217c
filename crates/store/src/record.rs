//! Metadata record shape and partial-update merging.

use chrono::{DateTime, Utc};
use meshforge_core::status::AssetStatus;
use serde::{Deserialize, Serialize};

/// A persisted file together with its public URL path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Bare file name, e.g. `model-1-preview.mp4`.
    pub file: String,
    /// Public path the file is served under, e.g. `/assets/videos/model-1-preview.mp4`.
    pub path: String,
}

/// Everything known about one generated asset.
///
/// Fields accumulate over the lifetime of a job; a field is only ever
/// replaced by a later value from the same job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AssetStatus>,
    /// Failure message, present only when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_file: Option<String>,
    /// Absolute on-disk path of the model file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    /// Public URL path of the model file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<FileRef>,
    /// Set once, when the job is finalized successfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    /// Keys written by other tools are carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A partial update. Every `Some` field overwrites the record's value.
///
/// Built with the chained constructors:
///
/// ```
/// use meshforge_core::status::AssetStatus;
/// use meshforge_store::RecordPatch;
///
/// let patch = RecordPatch::status(AssetStatus::Error).with_error("boom");
/// assert_eq!(patch.error.as_deref(), Some("boom"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub status: Option<AssetStatus>,
    pub error: Option<String>,
    pub video: Option<FileRef>,
    pub model_file: Option<String>,
    pub model_path: Option<String>,
    pub model_url: Option<String>,
    pub icon: Option<FileRef>,
    pub completed: Option<DateTime<Utc>>,
}

impl RecordPatch {
    /// A patch that only sets the lifecycle status.
    pub fn status(status: AssetStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: AssetStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn with_video(mut self, file: FileRef) -> Self {
        self.video = Some(file);
        self
    }

    pub fn with_model(
        mut self,
        file: impl Into<String>,
        path: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        self.model_file = Some(file.into());
        self.model_path = Some(path.into());
        self.model_url = Some(url.into());
        self
    }

    pub fn with_icon(mut self, file: FileRef) -> Self {
        self.icon = Some(file);
        self
    }

    pub fn with_completed(mut self, at: DateTime<Utc>) -> Self {
        self.completed = Some(at);
        self
    }

    /// `true` when applying the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl MetadataRecord {
    /// Overlay every present field of `patch` onto this record.
    pub fn merge(&mut self, patch: RecordPatch) {
        let RecordPatch {
            status,
            error,
            video,
            model_file,
            model_path,
            model_url,
            icon,
            completed,
        } = patch;

        if status.is_some() {
            self.status = status;
        }
        if error.is_some() {
            self.error = error;
        }
        if video.is_some() {
            self.video = video;
        }
        if model_file.is_some() {
            self.model_file = model_file;
        }
        if model_path.is_some() {
            self.model_path = model_path;
        }
        if model_url.is_some() {
            self.model_url = model_url;
        }
        if icon.is_some() {
            self.icon = icon;
        }
        if completed.is_some() {
            self.completed = completed;
        }
    }
}
