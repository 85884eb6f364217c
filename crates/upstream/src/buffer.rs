//! Growable byte buffer that backs the multipart scanner.

use bytes::{Bytes, BytesMut};
use memchr::memmem;

/// Accumulates raw upstream bytes between scans.
///
/// Consumed prefixes are split off without copying the remainder, and
/// extracted regions are handed out as reference-counted [`Bytes`].
#[derive(Debug, Default)]
pub struct ByteAccumulator {
    inner: BytesMut,
}

impl ByteAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transport chunk.
    pub fn append(&mut self, chunk: &[u8]) {
        self.inner.extend_from_slice(chunk);
    }

    /// Discard the first `n` bytes (clamped to the buffer length).
    pub fn drop_prefix(&mut self, n: usize) {
        let n = n.min(self.inner.len());
        let _ = self.inner.split_to(n);
    }

    /// Detach the first `n` bytes as an immutable view.
    pub fn split_prefix(&mut self, n: usize) -> Bytes {
        let n = n.min(self.inner.len());
        self.inner.split_to(n).freeze()
    }

    /// Position of the first occurrence of `needle` at or after `from`.
    pub fn index_of(&self, needle: &[u8], from: usize) -> Option<usize> {
        find(&self.inner, needle, from)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

/// Binary-safe substring search.
pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    memmem::find(&haystack[from..], needle).map(|pos| pos + from)
}
