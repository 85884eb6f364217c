use std::path::{Path, PathBuf};

use meshforge_core::naming;

use crate::thumbnail::ThumbnailOptions;

/// Where artifacts are written and the URL prefixes they are served under.
#[derive(Debug, Clone)]
pub struct AssetLayout {
    pub model_dir: PathBuf,
    pub video_dir: PathBuf,
    pub icon_dir: PathBuf,
    pub model_url_prefix: String,
    pub video_url_prefix: String,
    pub icon_url_prefix: String,
    /// Image format (and extension) of generated icons, e.g. `png`.
    pub icon_format: String,
}

impl AssetLayout {
    /// Standard layout below `root`: `models/`, `videos/` and `icons/`,
    /// served under `/assets/{models,videos,icons}`.
    pub fn under(root: &Path) -> Self {
        Self {
            model_dir: root.join("models"),
            video_dir: root.join("videos"),
            icon_dir: root.join("icons"),
            model_url_prefix: "/assets/models".into(),
            video_url_prefix: "/assets/videos".into(),
            icon_url_prefix: "/assets/icons".into(),
            icon_format: "png".into(),
        }
    }

    /// Create all artifact directories.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.model_dir, &self.video_dir, &self.icon_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    pub fn model_path(&self, asset_id: &str) -> PathBuf {
        self.model_dir.join(naming::model_filename(asset_id))
    }

    pub fn video_path(&self, filename: &str) -> PathBuf {
        self.video_dir.join(filename)
    }

    pub fn icon_path(&self, asset_id: &str) -> PathBuf {
        self.icon_dir
            .join(naming::icon_filename(asset_id, &self.icon_format))
    }
}

/// Settings shared by every job.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub layout: AssetLayout,
    /// Boundary token assumed when the upstream `Content-Type` has none.
    pub fallback_boundary: String,
    pub thumbnail: ThumbnailOptions,
}

impl PipelineConfig {
    pub fn new(layout: AssetLayout) -> Self {
        Self {
            layout,
            fallback_boundary: "frame".into(),
            thumbnail: ThumbnailOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_follow_naming_rules() {
        let layout = AssetLayout::under(Path::new("/srv/storage"));
        assert_eq!(
            layout.model_path("model-1"),
            PathBuf::from("/srv/storage/models/model-1.glb")
        );
        assert_eq!(
            layout.icon_path("model-1"),
            PathBuf::from("/srv/storage/icons/model-1.png")
        );
        assert_eq!(
            layout.video_path("model-1-preview.mp4"),
            PathBuf::from("/srv/storage/videos/model-1-preview.mp4")
        );
    }
}
