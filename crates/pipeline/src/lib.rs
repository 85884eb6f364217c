//! Generation job pipeline.
//!
//! Turns one upstream `multipart/mixed` stream into persisted artifacts,
//! metadata updates and a normalized relay stream for the caller:
//!
//! - [`status`] normalizes upstream step text into [`AssetStatus`](meshforge_core::status::AssetStatus).
//! - [`dispatcher`] routes each scanned part to its handler.
//! - [`persist`] applies file writes and metadata merges off the scan loop.
//! - [`relay`] frames events for the outgoing stream.
//! - [`thumbnail`] is the seam to the external icon renderer.
//! - [`orchestrator`] owns a job from open to finalization.

pub mod config;
pub mod dispatcher;
pub mod job;
pub mod orchestrator;
pub mod persist;
pub mod relay;
pub mod status;
pub mod thumbnail;

pub use config::{AssetLayout, PipelineConfig};
pub use job::{GenerationJob, JobPhase};
pub use orchestrator::{JobSummary, Pipeline};
pub use relay::{relay_channel, RelayEncoder, RelayEvent, RelayStatus};
