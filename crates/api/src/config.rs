use std::path::PathBuf;
use std::str::FromStr;

use meshforge_pipeline::thumbnail::ThumbnailOptions;
use meshforge_pipeline::{AssetLayout, PipelineConfig};

/// A configuration variable that is set but cannot be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{var} has invalid value '{value}'")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// Time allowed to produce response headers, in seconds (default: `60`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for running generation jobs (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Generation endpoint of the upstream service.
    pub upstream_url: String,
    /// Boundary assumed when the upstream response does not declare one.
    pub upstream_fallback_boundary: String,
    /// Root of the models/videos/icons directories.
    pub storage_root: PathBuf,
    /// JSON metadata file (default: `<storage_root>/metadata.json`).
    pub metadata_file: PathBuf,
    /// External icon renderer command line; icons are skipped when unset.
    pub thumbnail_command: Option<String>,
    pub thumbnail_size: u32,
    pub thumbnail_background: String,
    pub thumbnail_timeout_secs: u64,
    /// Icon image format and extension (default: `png`).
    pub icon_format: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                          |
    /// |-----------------------------|----------------------------------|
    /// | `HOST`                      | `0.0.0.0`                        |
    /// | `PORT`                      | `3000`                           |
    /// | `CORS_ORIGINS`              | `http://localhost:5173`          |
    /// | `REQUEST_TIMEOUT_SECS`      | `60`                             |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`                             |
    /// | `UPSTREAM_URL`              | `http://localhost:8000/generate` |
    /// | `UPSTREAM_FALLBACK_BOUNDARY`| `frame`                          |
    /// | `STORAGE_ROOT`              | `storage`                        |
    /// | `METADATA_FILE`             | `<STORAGE_ROOT>/metadata.json`   |
    /// | `THUMBNAIL_COMMAND`         | unset                            |
    /// | `THUMBNAIL_SIZE`            | `256`                            |
    /// | `THUMBNAIL_BACKGROUND`      | `#1e1e1e`                        |
    /// | `THUMBNAIL_TIMEOUT_SECS`    | `60`                             |
    /// | `ICON_FORMAT`               | `png`                            |
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_root = PathBuf::from(env_or("STORAGE_ROOT", "storage"));
        let metadata_file = std::env::var("METADATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| storage_root.join("metadata.json"));

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let thumbnail_command = std::env::var("THUMBNAIL_COMMAND")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", 3000)?,
            cors_origins,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 60)?,
            shutdown_timeout_secs: parse_env("SHUTDOWN_TIMEOUT_SECS", 30)?,
            upstream_url: env_or("UPSTREAM_URL", "http://localhost:8000/generate"),
            upstream_fallback_boundary: env_or("UPSTREAM_FALLBACK_BOUNDARY", "frame"),
            storage_root,
            metadata_file,
            thumbnail_command,
            thumbnail_size: parse_env("THUMBNAIL_SIZE", 256)?,
            thumbnail_background: env_or("THUMBNAIL_BACKGROUND", "#1e1e1e"),
            thumbnail_timeout_secs: parse_env("THUMBNAIL_TIMEOUT_SECS", 60)?,
            icon_format: env_or("ICON_FORMAT", "png"),
        })
    }

    /// Artifact directories and URL prefixes derived from `storage_root`.
    pub fn asset_layout(&self) -> AssetLayout {
        AssetLayout {
            icon_format: self.icon_format.clone(),
            ..AssetLayout::under(&self.storage_root)
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            layout: self.asset_layout(),
            fallback_boundary: self.upstream_fallback_boundary.clone(),
            thumbnail: ThumbnailOptions {
                size: self.thumbnail_size,
                background_color: self.thumbnail_background.clone(),
            },
        }
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.into())
}

fn parse_env<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError { var, value }),
        Err(_) => Ok(default),
    }
}
