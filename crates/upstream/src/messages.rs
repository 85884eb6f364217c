//! Upstream status message types and parser.
//!
//! JSON parts of the upstream stream carry a `status` discriminator:
//! `{"status": "progress", "step": "...", "message": "..."}`,
//! `{"status": "complete", "glbFile": "..."}` or
//! `{"status": "error", "message": "..."}`. This module deserializes them
//! into a strongly-typed [`UpstreamMessage`] enum.

use serde::Deserialize;

/// All known upstream status messages, tagged by the `"status"` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpstreamMessage {
    /// The generation advanced to a new (free-text) step.
    Progress(ProgressData),
    /// The generation finished.
    Complete(CompleteData),
    /// The generation failed.
    Error(ErrorData),
}

/// Payload of `progress` messages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressData {
    /// Free-text step description, e.g. `"Generating GLB mesh"`.
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of `complete` messages.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteData {
    #[serde(default)]
    pub message: Option<String>,
    /// Model file name as known to the upstream.
    #[serde(default)]
    pub glb_file: Option<String>,
}

/// Payload of `error` messages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProgressData {
    /// Text used for step classification: `step`, or `message` when the
    /// upstream only filled that one in.
    pub fn step_text(&self) -> Option<&str> {
        self.step.as_deref().or(self.message.as_deref())
    }
}

impl ErrorData {
    /// Human-readable failure description.
    pub fn describe(&self) -> String {
        self.message
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or("Generation failed")
            .to_string()
    }
}

/// Parse the body of an `application/json` part.
///
/// Returns `Err` for malformed JSON, non-UTF-8 input, or an unknown
/// `status` value. Callers should log and drop the part.
pub fn parse_message(body: &[u8]) -> Result<UpstreamMessage, serde_json::Error> {
    serde_json::from_slice(body)
}
