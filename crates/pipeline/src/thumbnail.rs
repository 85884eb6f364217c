//! Icon rendering for saved models.
//!
//! Rendering itself happens outside this process. [`ThumbnailRenderer`] is
//! the seam; [`CommandRenderer`] drives an external program as
//! `<program> [args..] <model> <icon> --size <n> --background <color>`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Stderr captured from a failed renderer is truncated to this size.
const MAX_STDERR_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailOptions {
    /// Edge length of the square icon in pixels.
    pub size: u32,
    pub background_color: String,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            size: 256,
            background_color: "#1e1e1e".into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("Renderer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Renderer timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Renderer exited with code {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },

    #[error("Renderer produced no icon at {}", .0.display())]
    MissingOutput(PathBuf),
}

/// Produces an icon image for a model file.
#[async_trait]
pub trait ThumbnailRenderer: Send + Sync {
    /// Render `model_path` into `icon_path`, returning the written path.
    async fn generate(
        &self,
        model_path: &Path,
        icon_path: &Path,
        options: &ThumbnailOptions,
    ) -> Result<PathBuf, ThumbnailError>;
}

/// Renderer backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    /// Build from a whitespace-separated command line such as
    /// `node scripts/render-icon.js`. Returns `None` for a blank line.
    pub fn from_command_line(line: &str, timeout: Duration) -> Option<Self> {
        let mut words = line.split_whitespace();
        let program = words.next()?;
        Some(Self::new(program, timeout).with_args(words))
    }

    /// Arguments placed before the model and icon paths.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl ThumbnailRenderer for CommandRenderer {
    async fn generate(
        &self,
        model_path: &Path,
        icon_path: &Path,
        options: &ThumbnailOptions,
    ) -> Result<PathBuf, ThumbnailError> {
        if let Some(parent) = icon_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(model_path)
            .arg(icon_path)
            .arg("--size")
            .arg(options.size.to_string())
            .arg("--background")
            .arg(&options.background_color)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn()?;
        let stderr_handle = child.stderr.take();
        let stderr_task = tokio::spawn(async move { read_capped(stderr_handle).await });

        // On timeout `child` is dropped and killed.
        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_elapsed) => {
                return Err(ThumbnailError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        };

        if !status.success() {
            let stderr = stderr_task.await.unwrap_or_default();
            return Err(ThumbnailError::Failed {
                exit_code: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        if !tokio::fs::try_exists(icon_path).await? {
            return Err(ThumbnailError::MissingOutput(icon_path.to_path_buf()));
        }

        tracing::debug!(
            icon = %icon_path.display(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Icon rendered",
        );
        Ok(icon_path.to_path_buf())
    }
}

async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_STDERR_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn shell(script: &str) -> CommandRenderer {
        // `sh -c <script>` binds the appended arguments to $0, $1, ...
        CommandRenderer::new("sh", Duration::from_secs(10)).with_args(["-c", script])
    }

    #[tokio::test]
    async fn successful_command_returns_icon_path() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.glb");
        tokio::fs::write(&model, b"glTF").await.unwrap();
        let icon = dir.path().join("icons/model.png");

        let renderer = shell(r#"cp "$0" "$1""#);
        let written = renderer
            .generate(&model, &icon, &ThumbnailOptions::default())
            .await
            .unwrap();

        assert_eq!(written, icon);
        assert_eq!(tokio::fs::read(&icon).await.unwrap(), b"glTF");
    }

    #[tokio::test]
    async fn size_and_background_are_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.glb");
        tokio::fs::write(&model, b"glTF").await.unwrap();
        let icon = dir.path().join("model.png");

        let renderer = shell(r#"echo "$2 $3 $4 $5" > "$1""#);
        let options = ThumbnailOptions {
            size: 128,
            background_color: "#000000".into(),
        };
        renderer.generate(&model, &icon, &options).await.unwrap();

        let written = tokio::fs::read_to_string(&icon).await.unwrap();
        assert_eq!(written.trim(), "--size 128 --background #000000");
    }

    #[tokio::test]
    async fn non_zero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = shell("echo 'no gpu' >&2; exit 3");

        let result = renderer
            .generate(
                &dir.path().join("m.glb"),
                &dir.path().join("m.png"),
                &ThumbnailOptions::default(),
            )
            .await;

        assert_matches!(
            result,
            Err(ThumbnailError::Failed { exit_code: 3, ref stderr }) if stderr == "no gpu"
        );
    }

    #[tokio::test]
    async fn missing_icon_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = shell("exit 0");

        let result = renderer
            .generate(
                &dir.path().join("m.glb"),
                &dir.path().join("m.png"),
                &ThumbnailOptions::default(),
            )
            .await;

        assert_matches!(result, Err(ThumbnailError::MissingOutput(_)));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CommandRenderer::new("sh", Duration::from_millis(100))
            .with_args(["-c", "sleep 5"]);

        let result = renderer
            .generate(
                &dir.path().join("m.glb"),
                &dir.path().join("m.png"),
                &ThumbnailOptions::default(),
            )
            .await;

        assert_matches!(result, Err(ThumbnailError::Timeout { .. }));
    }

    #[test]
    fn command_line_is_split_on_whitespace() {
        let renderer =
            CommandRenderer::from_command_line("node  render.js", Duration::from_secs(1)).unwrap();
        assert_eq!(renderer.program(), "node");
        assert_eq!(renderer.args, vec!["render.js".to_string()]);
        assert!(CommandRenderer::from_command_line("   ", Duration::from_secs(1)).is_none());
    }
}
