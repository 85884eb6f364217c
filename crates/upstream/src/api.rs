//! HTTP client for the upstream generation service.
//!
//! Wraps the single generation endpoint using [`reqwest`]: one POST with
//! a `multipart/form-data` upload, answered by an indefinite
//! `multipart/mixed` stream.

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

/// HTTP client for one upstream generation endpoint.
pub struct GenerationApi {
    client: reqwest::Client,
    url: String,
}

/// Input forwarded to the upstream service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Raw bytes of the uploaded image.
    pub file: Bytes,
    pub file_name: String,
    /// MIME type of the upload, if the client declared one.
    pub content_type: Option<String>,
    /// Additional text form fields, forwarded verbatim.
    pub fields: Vec<(String, String)>,
}

/// A successfully opened upstream stream.
pub struct UpstreamResponse {
    /// Raw `Content-Type` header of the response.
    pub content_type: Option<String>,
    /// Response body as it arrives from the network.
    pub stream: BoxStream<'static, Result<Bytes, reqwest::Error>>,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Errors from the upstream HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The HTTP request itself failed (connection refused, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The upstream returned a non-2xx status code.
    #[error("Upstream API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The request could not be built from the given input.
    #[error("Invalid upstream request: {0}")]
    InvalidRequest(String),
}

impl GenerationApi {
    /// Create a client for the generation endpoint at `url`.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Endpoint URL this client posts to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start a generation job.
    ///
    /// Sends the upload as field `file` plus every extra text field, and
    /// returns as soon as the response headers arrive. The body is left
    /// unread for the caller to stream.
    pub async fn start_generation(
        &self,
        request: GenerationRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let GenerationRequest {
            file,
            file_name,
            content_type,
            fields,
        } = request;

        let length = file.len() as u64;
        let mut file_part =
            reqwest::multipart::Part::stream_with_length(file, length).file_name(file_name);
        if let Some(mime) = content_type {
            file_part = file_part
                .mime_str(&mime)
                .map_err(|e| UpstreamError::InvalidRequest(format!("bad MIME type '{mime}': {e}")))?;
        }

        let mut form = reqwest::multipart::Form::new().part("file", file_part);
        for (name, value) in fields {
            form = form.text(name, value);
        }

        let response = self.client.post(&self.url).multipart(form).send().await?;
        let response = Self::ensure_success(response).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        tracing::debug!(
            url = %self.url,
            content_type = content_type.as_deref().unwrap_or("<none>"),
            "Upstream generation stream opened",
        );

        Ok(UpstreamResponse {
            content_type,
            stream: response.bytes_stream().boxed(),
        })
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`UpstreamError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, UpstreamError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(UpstreamError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}
