//! Durable metadata store for generated assets.
//!
//! A single JSON object file maps each [`AssetId`](meshforge_core::types::AssetId)
//! to its [`MetadataRecord`]. All access goes through one async mutex, so
//! concurrent jobs can merge into the same file without interleaving
//! writes.

pub mod error;
pub mod record;
pub mod store;

pub use error::StoreError;
pub use record::{FileRef, MetadataRecord, RecordPatch};
pub use store::MetadataStore;
