//! Job orchestration.
//!
//! [`Pipeline`] is created once at startup and shared by request handlers.
//! For each request the handler calls [`Pipeline::open_job`], opens the
//! upstream stream, and then either hands the stream to [`Pipeline::run`]
//! or reports the failure through [`Pipeline::abort_job`].
//!
//! `run` drives the scan loop: chunks go into the [`MultipartScanner`],
//! completed parts go to the [`Dispatcher`], and once the upstream ends
//! the job is finalized (pending writes flushed, icon rendered, record
//! marked complete, relay closed). A client that disconnects mid-stream
//! does not stop any of this.

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use meshforge_core::naming::{self, new_asset_id};
use meshforge_core::status::AssetStatus;
use meshforge_core::types::AssetId;
use meshforge_store::{FileRef, MetadataStore, RecordPatch, StoreError};
use meshforge_upstream::multipart::{FramingAnomaly, MultipartScanner, ScanOutcome};

use crate::config::PipelineConfig;
use crate::dispatcher::Dispatcher;
use crate::job::{GenerationJob, JobPhase};
use crate::persist::{PersistQueue, PersistReport};
use crate::relay::RelayEncoder;
use crate::status::Transition;
use crate::thumbnail::ThumbnailRenderer;

/// Outcome of one finished job.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub asset_id: AssetId,
    pub status: AssetStatus,
    /// Parts scanned from the upstream stream.
    pub parts: usize,
    pub anomalies: usize,
    /// Whether the client was still reading when the job ended.
    pub client_connected: bool,
    pub persist: PersistReport,
}

pub struct Pipeline {
    store: Arc<MetadataStore>,
    config: Arc<PipelineConfig>,
    thumbnails: Option<Arc<dyn ThumbnailRenderer>>,
}

impl Pipeline {
    pub fn new(store: Arc<MetadataStore>, config: PipelineConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
            thumbnails: None,
        }
    }

    /// Render an icon for every job that saved a model.
    pub fn with_thumbnails(mut self, renderer: Arc<dyn ThumbnailRenderer>) -> Self {
        self.thumbnails = Some(renderer);
        self
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Allocate an asset id and create its `processing` record.
    pub async fn open_job(&self) -> Result<GenerationJob, StoreError> {
        let job = GenerationJob::new(new_asset_id(), &self.config.layout);
        self.store
            .upsert_merge(&job.asset_id, RecordPatch::status(AssetStatus::Processing))
            .await?;
        tracing::info!(asset_id = %job.asset_id, "Generation job opened");
        Ok(job)
    }

    /// Mark a job that never got an upstream stream as failed.
    pub async fn abort_job(&self, mut job: GenerationJob, reason: &str) -> JobSummary {
        tracing::error!(asset_id = %job.asset_id, error = %reason, "Generation job aborted");
        let mut persist = PersistReport::default();
        if let Transition::Changed(status) = job.status.on_error() {
            let patch = RecordPatch::status(status).with_error(reason);
            if let Err(e) = self.store.upsert_merge(&job.asset_id, patch).await {
                tracing::error!(asset_id = %job.asset_id, error = %e, "Failed to record job failure");
                persist.failures += 1;
            }
        }
        job.set_phase(JobPhase::Done);
        JobSummary {
            asset_id: job.asset_id,
            status: job.status.current(),
            parts: 0,
            anomalies: 0,
            client_connected: false,
            persist,
        }
    }

    /// Relay and persist one upstream stream until it ends.
    ///
    /// `content_type` is the upstream response `Content-Type`, used to
    /// find the multipart boundary.
    pub async fn run<S, E>(
        &self,
        mut job: GenerationJob,
        content_type: Option<&str>,
        mut upstream: S,
        mut relay: RelayEncoder,
    ) -> JobSummary
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin + Send,
        E: Display + Send,
    {
        let boundary = job
            .resolve_boundary(content_type, &self.config.fallback_boundary)
            .to_string();
        let mut scanner =
            MultipartScanner::new(&boundary).with_fallback(&self.config.fallback_boundary);
        let persist = PersistQueue::spawn(Arc::clone(&self.store), job.asset_id.clone());
        let mut counts = ScanCounts::default();
        let mut transport_failed = false;

        job.set_phase(JobPhase::Streaming);
        tracing::info!(asset_id = %job.asset_id, boundary = %boundary, "Streaming upstream response");

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    scanner.push(&bytes);
                    let outcome = scanner.scan(false);
                    self.handle_outcome(&mut job, &mut relay, &persist, outcome, &mut counts);
                    if scanner.is_finished() {
                        break;
                    }
                }
                Err(e) => {
                    let message = format!("Upstream stream failed: {e}");
                    tracing::error!(asset_id = %job.asset_id, error = %e, "Upstream transport error");
                    self.dispatcher(&mut job, &mut relay, &persist).fail(&message);
                    transport_failed = true;
                    break;
                }
            }
        }

        // A broken stream may stop mid-part; only a clean end flushes the buffer.
        if transport_failed {
            let pending = scanner.remainder().len();
            if pending > 0 {
                log_anomaly(&job.asset_id, &FramingAnomaly::UnexpectedLeftover { bytes: pending });
                counts.anomalies += 1;
            }
        } else {
            let outcome = scanner.scan(true);
            self.handle_outcome(&mut job, &mut relay, &persist, outcome, &mut counts);
        }

        self.finalize(job, relay, persist, counts).await
    }

    // ---- private helpers ----

    fn dispatcher<'a>(
        &'a self,
        job: &'a mut GenerationJob,
        relay: &'a mut RelayEncoder,
        persist: &'a PersistQueue,
    ) -> Dispatcher<'a> {
        Dispatcher {
            job,
            relay,
            persist,
            layout: &self.config.layout,
        }
    }

    fn handle_outcome(
        &self,
        job: &mut GenerationJob,
        relay: &mut RelayEncoder,
        persist: &PersistQueue,
        outcome: ScanOutcome,
        counts: &mut ScanCounts,
    ) {
        for anomaly in &outcome.anomalies {
            log_anomaly(&job.asset_id, anomaly);
        }
        counts.anomalies += outcome.anomalies.len();
        counts.parts += outcome.parts.len();

        let mut dispatcher = self.dispatcher(job, relay, persist);
        for part in outcome.parts {
            dispatcher.dispatch(part);
        }
    }

    async fn finalize(
        &self,
        mut job: GenerationJob,
        relay: RelayEncoder,
        persist: PersistQueue,
        counts: ScanCounts,
    ) -> JobSummary {
        job.set_phase(JobPhase::Finalizing);
        let mut report = persist.flush().await;

        if report.model_saved {
            if let Some(renderer) = &self.thumbnails {
                if !self.render_icon(renderer.as_ref(), &job).await {
                    report.failures += 1;
                }
            }
        }

        if job.status() != AssetStatus::Error {
            job.status.on_complete();
            let patch = RecordPatch::status(AssetStatus::Complete).with_completed(Utc::now());
            if let Err(e) = self.store.upsert_merge(&job.asset_id, patch).await {
                tracing::error!(asset_id = %job.asset_id, error = %e, "Failed to mark job complete");
                report.failures += 1;
            }
        }

        let client_connected = relay.is_connected();
        let sections = relay.sections_sent();
        relay.finish();
        job.set_phase(JobPhase::Done);

        tracing::info!(
            asset_id = %job.asset_id,
            status = %job.status(),
            parts = counts.parts,
            anomalies = counts.anomalies,
            sections,
            client_connected,
            failures = report.failures,
            "Generation job finished",
        );

        JobSummary {
            asset_id: job.asset_id,
            status: job.status.current(),
            parts: counts.parts,
            anomalies: counts.anomalies,
            client_connected,
            persist: report,
        }
    }

    /// Returns `false` when rendering or recording the icon failed.
    async fn render_icon(&self, renderer: &dyn ThumbnailRenderer, job: &GenerationJob) -> bool {
        let layout = &self.config.layout;
        let icon_path = layout.icon_path(&job.asset_id);
        if let Err(e) = renderer
            .generate(&job.model_path, &icon_path, &self.config.thumbnail)
            .await
        {
            tracing::warn!(asset_id = %job.asset_id, error = %e, "Icon generation failed");
            return false;
        }

        let file = naming::icon_filename(&job.asset_id, &layout.icon_format);
        let icon = FileRef {
            path: naming::public_path(&layout.icon_url_prefix, &file),
            file,
        };
        match self
            .store
            .upsert_merge(&job.asset_id, RecordPatch::default().with_icon(icon))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(asset_id = %job.asset_id, error = %e, "Failed to record icon");
                false
            }
        }
    }
}

#[derive(Debug, Default)]
struct ScanCounts {
    parts: usize,
    anomalies: usize,
}

fn log_anomaly(asset_id: &str, anomaly: &FramingAnomaly) {
    match anomaly {
        FramingAnomaly::UnexpectedLeftover { bytes } => {
            tracing::warn!(asset_id, bytes, "Unparsed bytes left at end of upstream stream");
        }
        FramingAnomaly::ForeignBoundary { observed } => {
            tracing::warn!(asset_id, observed = %observed, "Upstream used an unexpected boundary");
        }
        FramingAnomaly::MalformedHeader { line } => {
            tracing::warn!(asset_id, line = %line, "Skipped malformed part header");
        }
        FramingAnomaly::UnterminatedPart { bytes } => {
            tracing::warn!(asset_id, bytes, "Upstream ended inside a part");
        }
    }
}
