//! Shared domain types for the meshforge generation relay.
//!
//! Holds the asset lifecycle enum, the file and token naming rules shared
//! by the store, pipeline and API crates, and the domain error type.

pub mod error;
pub mod naming;
pub mod status;
pub mod types;
