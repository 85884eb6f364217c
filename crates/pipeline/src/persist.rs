//! Ordered background persistence for one job.
//!
//! The scan loop must not wait on disk. Every write and metadata merge is
//! queued to a single worker task, which applies them strictly in enqueue
//! order, so a later status can never be overwritten by an earlier one.
//! Failures are logged and counted; they never abort the job.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use meshforge_core::types::AssetId;
use meshforge_store::{MetadataStore, RecordPatch};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Model,
    Video,
}

impl ArtifactKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Video => "video",
        }
    }
}

#[derive(Debug)]
pub enum PersistOp {
    /// Write `bytes` to `path`, then merge `patch` if the write succeeded.
    SaveArtifact {
        kind: ArtifactKind,
        path: PathBuf,
        bytes: Bytes,
        patch: RecordPatch,
    },
    Merge(RecordPatch),
}

/// What the worker managed to do, returned by [`PersistQueue::flush`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub model_saved: bool,
    pub video_saved: bool,
    /// Failed writes plus failed merges.
    pub failures: usize,
}

pub struct PersistQueue {
    asset_id: AssetId,
    tx: mpsc::UnboundedSender<PersistOp>,
    worker: JoinHandle<PersistReport>,
}

impl PersistQueue {
    /// Start the worker for `asset_id`.
    pub fn spawn(store: Arc<MetadataStore>, asset_id: AssetId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(store, asset_id.clone(), rx));
        Self {
            asset_id,
            tx,
            worker,
        }
    }

    pub fn save_artifact(&self, kind: ArtifactKind, path: PathBuf, bytes: Bytes, patch: RecordPatch) {
        self.enqueue(PersistOp::SaveArtifact {
            kind,
            path,
            bytes,
            patch,
        });
    }

    pub fn merge(&self, patch: RecordPatch) {
        if patch.is_empty() {
            return;
        }
        self.enqueue(PersistOp::Merge(patch));
    }

    /// Close the queue and wait until everything enqueued has been applied.
    pub async fn flush(self) -> PersistReport {
        let Self {
            asset_id,
            tx,
            worker,
        } = self;
        drop(tx);
        match worker.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(asset_id = %asset_id, error = %e, "Persist worker panicked");
                PersistReport {
                    failures: 1,
                    ..Default::default()
                }
            }
        }
    }

    // ---- private helpers ----

    fn enqueue(&self, op: PersistOp) {
        // The receiver only closes when the worker died; flush reports that.
        if self.tx.send(op).is_err() {
            tracing::error!(asset_id = %self.asset_id, "Persist worker gone, operation dropped");
        }
    }
}

async fn run_worker(
    store: Arc<MetadataStore>,
    asset_id: AssetId,
    mut rx: mpsc::UnboundedReceiver<PersistOp>,
) -> PersistReport {
    let mut report = PersistReport::default();

    while let Some(op) = rx.recv().await {
        match op {
            PersistOp::SaveArtifact {
                kind,
                path,
                bytes,
                patch,
            } => {
                if let Err(e) = write_file(&path, &bytes).await {
                    tracing::error!(
                        asset_id = %asset_id,
                        kind = kind.as_str(),
                        path = %path.display(),
                        error = %e,
                        "Failed to save artifact",
                    );
                    report.failures += 1;
                    continue;
                }
                tracing::info!(
                    asset_id = %asset_id,
                    kind = kind.as_str(),
                    path = %path.display(),
                    bytes = bytes.len(),
                    "Artifact saved",
                );
                match kind {
                    ArtifactKind::Model => report.model_saved = true,
                    ArtifactKind::Video => report.video_saved = true,
                }
                apply_merge(&store, &asset_id, patch, &mut report).await;
            }
            PersistOp::Merge(patch) => apply_merge(&store, &asset_id, patch, &mut report).await,
        }
    }

    report
}

async fn write_file(path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

async fn apply_merge(
    store: &MetadataStore,
    asset_id: &str,
    patch: RecordPatch,
    report: &mut PersistReport,
) {
    if patch.is_empty() {
        return;
    }
    if let Err(e) = store.upsert_merge(asset_id, patch).await {
        tracing::error!(asset_id = %asset_id, error = %e, "Failed to update metadata");
        report.failures += 1;
    }
}
