//! Per-request generation job state.

use std::path::PathBuf;

use meshforge_core::status::AssetStatus;
use meshforge_core::types::AssetId;
use meshforge_upstream::multipart::boundary_from_content_type;

use crate::config::AssetLayout;
use crate::status::StatusMachine;

/// Where a job is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    /// Record created, upstream request not yet answered.
    Opened,
    /// Relaying and persisting the upstream stream.
    Streaming,
    /// Upstream ended; flushing writes and rendering the icon.
    Finalizing,
    Done,
}

impl JobPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
        }
    }
}

/// One generation request from open to finalization.
#[derive(Debug)]
pub struct GenerationJob {
    pub asset_id: AssetId,
    /// Computed up front so the model part can be written without a lookup.
    pub model_path: PathBuf,
    pub output_model_path: Option<PathBuf>,
    pub output_video_path: Option<PathBuf>,
    /// Token the upstream stream is split on.
    pub upstream_boundary: Option<String>,
    pub(crate) status: StatusMachine,
    phase: JobPhase,
}

impl GenerationJob {
    pub fn new(asset_id: AssetId, layout: &AssetLayout) -> Self {
        let model_path = layout.model_path(&asset_id);
        Self {
            asset_id,
            model_path,
            output_model_path: None,
            output_video_path: None,
            upstream_boundary: None,
            status: StatusMachine::new(),
            phase: JobPhase::Opened,
        }
    }

    pub fn status(&self) -> AssetStatus {
        self.status.current()
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: JobPhase) {
        tracing::debug!(asset_id = %self.asset_id, phase = phase.as_str(), "Job phase");
        self.phase = phase;
    }

    /// Pick the boundary from the upstream `Content-Type`, or `fallback`
    /// when the header is missing or has no `boundary` parameter.
    pub fn resolve_boundary(&mut self, content_type: Option<&str>, fallback: &str) -> &str {
        let parsed = content_type.and_then(boundary_from_content_type);
        if parsed.is_none() {
            tracing::warn!(
                asset_id = %self.asset_id,
                content_type = content_type.unwrap_or(""),
                fallback,
                "Upstream boundary missing, using fallback",
            );
        }
        self.upstream_boundary
            .insert(parsed.unwrap_or_else(|| fallback.to_string()))
    }
}
