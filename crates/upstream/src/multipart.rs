//! Incremental `multipart/mixed` boundary scanner.
//!
//! The upstream answers with an open-ended multipart stream whose parts
//! can be split at any byte across transport chunks. [`MultipartScanner`]
//! accumulates chunks and extracts every part whose closing boundary has
//! arrived, leaving incomplete data buffered for the next chunk.
//!
//! Framing rules:
//!
//! - a part starts at `--<boundary>`, followed by a header block that ends
//!   with an empty line (`\r\n\r\n`);
//! - its body runs to the next `--<boundary>`, minus the CRLF that precedes
//!   that boundary line; when the next boundary is the terminal one
//!   (`--<boundary>--`) nothing is stripped;
//! - nothing at or after the terminal boundary is ever turned into a part.
//!
//! Only an exact byte match of the full delimiter is significant, so body
//! bytes that merely resemble it never split a part.

use std::collections::HashMap;

use bytes::Bytes;

use crate::buffer::ByteAccumulator;

const CRLF: &[u8] = b"\r\n";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const TERMINAL_SUFFIX: &[u8] = b"--";

/// One complete section of the multipart stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub headers: PartHeaders,
    pub body: Bytes,
}

/// Header block of a [`Part`]. Names are stored lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders {
    fields: HashMap<String, String>,
}

impl PartHeaders {
    /// Header value by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.fields
            .insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Media type of the part without parameters, e.g. `application/json`
    /// for `application/json; charset=utf-8`. Case is preserved.
    pub fn content_type(&self) -> Option<&str> {
        self.get("content-type")
            .map(|value| value.split(';').next().unwrap_or("").trim())
            .filter(|value| !value.is_empty())
    }

    /// `filename` parameter of the `Content-Disposition` header.
    pub fn filename(&self) -> Option<&str> {
        let disposition = self.get("content-disposition")?;
        disposition.split(';').skip(1).find_map(|param| {
            let (name, value) = param.split_once('=')?;
            if name.trim().eq_ignore_ascii_case("filename") {
                Some(unquote(value.trim())).filter(|v| !v.is_empty())
            } else {
                None
            }
        })
    }
}

/// Irregularities met while scanning. None of them stop the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingAnomaly {
    /// Bytes remained at stream end that did not form a part.
    UnexpectedLeftover { bytes: usize },
    /// The leftover bytes start with a boundary line for a token that is
    /// neither the negotiated nor the fallback token.
    ForeignBoundary { observed: String },
    /// A header line without a `:` separator; the line was skipped.
    MalformedHeader { line: String },
    /// The stream ended inside a part body; the part was flushed as-is.
    UnterminatedPart { bytes: usize },
}

/// Result of one [`MultipartScanner::scan`] pass.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Parts completed by this pass, in stream order.
    pub parts: Vec<Part>,
    /// `true` only on the pass that found the terminal boundary.
    pub terminal: bool,
    pub anomalies: Vec<FramingAnomaly>,
}

/// Stateful scanner for one upstream stream.
#[derive(Debug)]
pub struct MultipartScanner {
    boundary: String,
    delimiter: Vec<u8>,
    fallback: Option<String>,
    buffer: ByteAccumulator,
    /// Offset before which no delimiter can start in the pending body.
    body_search_from: usize,
    finished: bool,
}

impl MultipartScanner {
    /// Scanner for parts delimited by `--{boundary}`.
    pub fn new(boundary: &str) -> Self {
        Self {
            boundary: boundary.to_string(),
            delimiter: format!("--{boundary}").into_bytes(),
            fallback: None,
            buffer: ByteAccumulator::new(),
            body_search_from: 0,
            finished: false,
        }
    }

    /// Record the fallback token so leftovers framed with it are not
    /// reported as foreign.
    pub fn with_fallback(mut self, fallback: &str) -> Self {
        self.fallback = Some(fallback.to_string());
        self
    }

    /// `true` once the terminal boundary has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes buffered but not yet turned into parts.
    pub fn remainder(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Append a transport chunk. Ignored after the terminal boundary.
    pub fn push(&mut self, chunk: &[u8]) {
        if !self.finished {
            self.buffer.append(chunk);
        }
    }

    /// Extract every part that can be completed from the buffered bytes.
    ///
    /// With `stream_ended` set, whatever cannot form a complete part is
    /// reported (or flushed, for a part cut off mid-body) and discarded.
    /// Every loop iteration either emits a part or returns.
    pub fn scan(&mut self, stream_ended: bool) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        if self.finished {
            return outcome;
        }

        let dlen = self.delimiter.len();

        loop {
            let Some(start) = self.buffer.index_of(&self.delimiter, 0) else {
                if stream_ended {
                    self.discard_leftover(&mut outcome);
                }
                return outcome;
            };
            if start > 0 {
                // Preamble or padding before the first boundary.
                self.buffer.drop_prefix(start);
                self.body_search_from = 0;
            }

            let after = dlen;
            let is_terminal = self
                .buffer
                .as_slice()
                .get(after..after + TERMINAL_SUFFIX.len())
                .map(|suffix| suffix == TERMINAL_SUFFIX);
            let Some(is_terminal) = is_terminal else {
                if stream_ended {
                    self.discard_leftover(&mut outcome);
                }
                return outcome;
            };
            if is_terminal {
                outcome.terminal = true;
                self.finished = true;
                self.buffer.clear();
                return outcome;
            }

            let Some(separator) = self.buffer.index_of(HEADER_TERMINATOR, after) else {
                if stream_ended {
                    self.discard_leftover(&mut outcome);
                }
                return outcome;
            };
            let body_start = separator + HEADER_TERMINATOR.len();

            let search_from = self.body_search_from.max(body_start);
            let Some(next) = self.buffer.index_of(&self.delimiter, search_from) else {
                if stream_ended {
                    self.flush_unterminated(after, separator, body_start, &mut outcome);
                } else {
                    self.body_search_from =
                        self.buffer.len().saturating_sub(dlen - 1).max(body_start);
                }
                return outcome;
            };

            let next_is_terminal = self
                .buffer
                .as_slice()
                .get(next + dlen..next + dlen + TERMINAL_SUFFIX.len())
                .map(|suffix| suffix == TERMINAL_SUFFIX);
            if next_is_terminal.is_none() && !stream_ended {
                // Cannot tell yet whether the next boundary is the terminal one.
                self.body_search_from = next;
                return outcome;
            }
            let next_is_terminal = next_is_terminal.unwrap_or(false);

            let data = self.buffer.as_slice();
            let body_end = if !next_is_terminal
                && next >= body_start + CRLF.len()
                && &data[next - CRLF.len()..next] == CRLF
            {
                next - CRLF.len()
            } else {
                next
            };

            let headers = parse_headers(&data[after..separator], &mut outcome.anomalies);
            let region = self.buffer.split_prefix(next);
            outcome.parts.push(Part {
                headers,
                body: region.slice(body_start..body_end),
            });
            self.body_search_from = 0;
        }
    }

    // ---- private helpers ----

    /// Emit the part whose closing boundary never arrived.
    fn flush_unterminated(
        &mut self,
        after: usize,
        separator: usize,
        body_start: usize,
        outcome: &mut ScanOutcome,
    ) {
        let data = self.buffer.as_slice();
        let total = data.len();
        let mut body_end = total;
        if data[body_start..].ends_with(CRLF) {
            body_end -= CRLF.len();
        }
        let headers = parse_headers(&data[after..separator], &mut outcome.anomalies);
        let bytes = body_end - body_start;

        let region = self.buffer.split_prefix(total);
        outcome.parts.push(Part {
            headers,
            body: region.slice(body_start..body_end),
        });
        outcome
            .anomalies
            .push(FramingAnomaly::UnterminatedPart { bytes });
        self.body_search_from = 0;
    }

    /// Report and drop bytes that can no longer become a part.
    fn discard_leftover(&mut self, outcome: &mut ScanOutcome) {
        let data = self.buffer.as_slice();
        if data.iter().all(u8::is_ascii_whitespace) {
            self.buffer.clear();
            return;
        }

        match self.foreign_boundary(data) {
            Some(observed) => outcome
                .anomalies
                .push(FramingAnomaly::ForeignBoundary { observed }),
            None => outcome
                .anomalies
                .push(FramingAnomaly::UnexpectedLeftover { bytes: data.len() }),
        }
        self.buffer.clear();
        self.body_search_from = 0;
    }

    /// Token of a leading `--token` line, if it matches neither the
    /// negotiated nor the fallback boundary.
    fn foreign_boundary(&self, data: &[u8]) -> Option<String> {
        let start = data.iter().position(|b| !b.is_ascii_whitespace())?;
        if data[start..].starts_with(&self.delimiter) {
            return None;
        }
        let rest = data[start..].strip_prefix(b"--")?;
        let line_end = crate::buffer::find(rest, CRLF, 0).unwrap_or(rest.len());
        let line = String::from_utf8_lossy(&rest[..line_end]);
        let token = line.trim().trim_end_matches("--");

        let known = token == self.boundary || self.fallback.as_deref() == Some(token);
        (!token.is_empty() && !known).then(|| token.to_string())
    }
}

/// Parse `Name: Value` lines of a header block.
fn parse_headers(block: &[u8], anomalies: &mut Vec<FramingAnomaly>) -> PartHeaders {
    let mut headers = PartHeaders::default();
    let text = String::from_utf8_lossy(block);

    for line in text.split("\r\n").map(str::trim).filter(|l| !l.is_empty()) {
        match line.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => headers.insert(name, value),
            _ => anomalies.push(FramingAnomaly::MalformedHeader {
                line: line.to_string(),
            }),
        }
    }

    headers
}

/// Extract the `boundary` parameter from a `Content-Type` header value.
///
/// ```
/// use meshforge_upstream::multipart::boundary_from_content_type;
///
/// assert_eq!(
///     boundary_from_content_type("multipart/mixed; boundary=\"frame\"").as_deref(),
///     Some("frame"),
/// );
/// assert_eq!(boundary_from_content_type("multipart/mixed"), None);
/// ```
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = unquote(value.trim());
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
