//! Upstream generation service client library.
//!
//! Provides the HTTP client that opens a generation stream, the
//! incremental multipart scanner that splits that stream into parts, and
//! typed parsing of the JSON status parts.

pub mod api;
pub mod buffer;
pub mod messages;
pub mod multipart;
