//! Asset naming conventions.
//!
//! Every file persisted for an asset is named after its [`AssetId`]:
//!
//! - model: `{asset_id}.glb`
//! - preview video: `{asset_id}-preview{ext}` (extension from the upstream
//!   part, `.mp4` by default)
//! - icon: `{asset_id}.{icon_format}`
//!
//! Boundary tokens for multipart framing are also generated here.

use crate::types::AssetId;

/// Extension used when the upstream does not declare one for the video.
pub const DEFAULT_VIDEO_EXTENSION: &str = ".mp4";

/// Extension of the binary model file.
pub const MODEL_EXTENSION: &str = ".glb";

/// Longest extension (without the dot) accepted from an upstream filename.
const MAX_EXTENSION_LEN: usize = 8;

/// Allocate a fresh asset identifier.
pub fn new_asset_id() -> AssetId {
    format!("model-{}", uuid::Uuid::new_v4().simple())
}

/// Generate a boundary token for an outgoing multipart stream.
///
/// Each call yields a new token, so a relay stream never shares its
/// framing with the upstream stream it is derived from.
pub fn new_boundary_token() -> String {
    format!("meshforge-{}", uuid::Uuid::new_v4().simple())
}

/// Model file name for an asset.
///
/// ```
/// use meshforge_core::naming::model_filename;
///
/// assert_eq!(model_filename("model-1"), "model-1.glb");
/// ```
pub fn model_filename(asset_id: &str) -> String {
    format!("{asset_id}{MODEL_EXTENSION}")
}

/// Preview video file name for an asset. `extension` includes the dot.
///
/// ```
/// use meshforge_core::naming::video_filename;
///
/// assert_eq!(video_filename("model-1", ".mov"), "model-1-preview.mov");
/// ```
pub fn video_filename(asset_id: &str, extension: &str) -> String {
    format!("{asset_id}-preview{extension}")
}

/// Icon file name for an asset.
pub fn icon_filename(asset_id: &str, icon_format: &str) -> String {
    format!("{asset_id}.{icon_format}")
}

/// Extract a safe, lower-cased extension (with the leading dot) from an
/// upstream-supplied file name.
///
/// Returns `None` when the name has no extension or the extension contains
/// anything other than ASCII alphanumerics, so a hostile name can never
/// steer the write outside the asset directory.
pub fn extension_from_filename(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

/// Join a public URL prefix and a file name with exactly one slash.
pub fn public_path(prefix: &str, filename: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), filename)
}
