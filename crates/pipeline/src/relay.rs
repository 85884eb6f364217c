//! Outgoing `multipart/mixed` relay stream.
//!
//! Each [`RelayEvent`] becomes one section:
//!
//! ```text
//! --<boundary>\r\n
//! Content-Type: application/json\r\n
//! \r\n
//! <json>\r\n
//! ```
//!
//! and the stream closes with `--<boundary>--\r\n`. Sections are handed to
//! an unbounded channel whose receiver is the HTTP response body, so
//! emitting never waits on the client.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Body stream handed to the HTTP layer.
pub type RelayBody = UnboundedReceiverStream<Bytes>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    Progress,
    Action,
    Complete,
    Error,
}

/// One JSON event sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEvent {
    pub status: RelayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glb_file: Option<String>,
}

impl RelayEvent {
    fn new(status: RelayStatus) -> Self {
        Self {
            status,
            step: None,
            message: None,
            model_id: None,
            glb_file: None,
        }
    }

    pub fn progress(step: Option<String>, message: Option<String>) -> Self {
        Self {
            step,
            message,
            ..Self::new(RelayStatus::Progress)
        }
    }

    pub fn action(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(RelayStatus::Action)
        }
    }

    pub fn complete(message: Option<String>) -> Self {
        Self {
            message,
            ..Self::new(RelayStatus::Complete)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(RelayStatus::Error)
        }
    }

    /// Attach the asset id and model file name.
    pub fn with_model(mut self, model_id: impl Into<String>, glb_file: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self.glb_file = Some(glb_file.into());
        self
    }
}

/// Frame one event as a multipart section.
pub fn encode_section(boundary: &str, event: &RelayEvent) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(event)?;
    let mut buf = BytesMut::with_capacity(boundary.len() + json.len() + 48);
    buf.put_slice(b"--");
    buf.put_slice(boundary.as_bytes());
    buf.put_slice(b"\r\nContent-Type: application/json\r\n\r\n");
    buf.put_slice(&json);
    buf.put_slice(b"\r\n");
    Ok(buf.freeze())
}

/// The closing delimiter, `--<boundary>--\r\n`.
pub fn encode_terminal(boundary: &str) -> Bytes {
    Bytes::from(format!("--{boundary}--\r\n"))
}

/// Create an encoder and the body stream it feeds.
pub fn relay_channel(boundary: impl Into<String>) -> (RelayEncoder, RelayBody) {
    let (tx, rx) = mpsc::unbounded_channel();
    let encoder = RelayEncoder {
        boundary: boundary.into(),
        tx,
        connected: true,
        sections: 0,
    };
    (encoder, UnboundedReceiverStream::new(rx))
}

/// Writes relay sections for one job.
///
/// Once the client goes away every further emit is a no-op; the job keeps
/// running and persisting regardless.
#[derive(Debug)]
pub struct RelayEncoder {
    boundary: String,
    tx: mpsc::UnboundedSender<Bytes>,
    connected: bool,
    sections: usize,
}

impl RelayEncoder {
    /// Value for the response `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary)
    }

    pub fn is_connected(&self) -> bool {
        self.connected && !self.tx.is_closed()
    }

    /// Number of sections accepted while the client was connected.
    pub fn sections_sent(&self) -> usize {
        self.sections
    }

    pub fn emit(&mut self, event: &RelayEvent) {
        if !self.is_connected() {
            return;
        }
        match encode_section(&self.boundary, event) {
            Ok(section) => {
                if self.send(section) {
                    self.sections += 1;
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to encode relay event"),
        }
    }

    /// Write the closing delimiter and end the body stream.
    pub fn finish(mut self) {
        if self.is_connected() {
            let terminal = encode_terminal(&self.boundary);
            self.send(terminal);
        }
    }

    // ---- private helpers ----

    fn send(&mut self, bytes: Bytes) -> bool {
        if self.tx.send(bytes).is_err() {
            tracing::info!("Client disconnected, relay stopped");
            self.connected = false;
            return false;
        }
        true
    }
}
