//! Captured request body.
//!
//! # Design
//! Writes are decoded into raw bytes at the boundary (`Chunk`), so the
//! accumulator only ever stores `Bytes`. Rendering a body for display is a
//! separate step: chunks are merged, a `BinaryDetector` decides whether the
//! bytes are text, and binary bodies are rendered as lowercase hex.

use std::fmt;

use base64::Engine;
use bytes::{Bytes, BytesMut};

use crate::error::InterceptError;

/// Text encodings accepted by `ClientRequest::write_encoded`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Utf8,
    Hex,
    Base64,
    /// One byte per character, code points above U+00FF are rejected.
    Latin1,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf8",
            Encoding::Hex => "hex",
            Encoding::Base64 => "base64",
            Encoding::Latin1 => "latin1",
        }
    }

    /// Decode `text` into the bytes it represents in this encoding.
    pub fn decode(&self, text: &str) -> Result<Bytes, InterceptError> {
        let bytes = match self {
            Encoding::Utf8 => text.as_bytes().to_vec(),
            Encoding::Hex => hex::decode(text).map_err(|e| self.error(e))?,
            Encoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map_err(|e| self.error(e))?,
            Encoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).map_err(|_| self.error(format!("{c:?} is outside latin1"))))
                .collect::<Result<Vec<u8>, _>>()?,
        };
        Ok(Bytes::from(bytes))
    }

    fn error(&self, reason: impl fmt::Display) -> InterceptError {
        InterceptError::Encoding {
            encoding: self.as_str(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One write's worth of raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk(Bytes);

impl Chunk {
    /// Decode `text` with `encoding`.
    pub fn decode(text: &str, encoding: Encoding) -> Result<Self, InterceptError> {
        encoding.decode(text).map(Chunk)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Chunk(bytes)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(bytes: Vec<u8>) -> Self {
        Chunk(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Chunk {
    fn from(bytes: &[u8]) -> Self {
        Chunk(Bytes::copy_from_slice(bytes))
    }
}

impl<const N: usize> From<&[u8; N]> for Chunk {
    fn from(bytes: &[u8; N]) -> Self {
        Chunk(Bytes::copy_from_slice(bytes))
    }
}

impl From<String> for Chunk {
    fn from(text: String) -> Self {
        Chunk(Bytes::from(text))
    }
}

impl From<&str> for Chunk {
    fn from(text: &str) -> Self {
        Chunk(Bytes::copy_from_slice(text.as_bytes()))
    }
}

/// Decides whether captured bytes should be rendered as binary.
pub trait BinaryDetector {
    fn is_binary(&self, bytes: &[u8]) -> bool;
}

/// Treats any byte sequence that is not valid UTF-8 as binary, i.e. bytes
/// that would not survive a decode/encode round trip through UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Detector;

impl BinaryDetector for Utf8Detector {
    fn is_binary(&self, bytes: &[u8]) -> bool {
        std::str::from_utf8(bytes).is_err()
    }
}

/// Ordered chunks written to one request.
#[derive(Debug, Clone, Default)]
pub struct BodyBuffer {
    chunks: Vec<Bytes>,
}

impl BodyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Chunk) {
        self.chunks.push(chunk.into_bytes());
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn len(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate all chunks into one buffer without consuming them.
    pub fn merge(&self) -> Bytes {
        if let [only] = self.chunks.as_slice() {
            return only.clone();
        }
        let mut merged = BytesMut::with_capacity(self.len());
        for chunk in &self.chunks {
            merged.extend_from_slice(chunk);
        }
        merged.freeze()
    }

    /// Merged body as UTF-8 text, or lowercase hex when `detector` says the
    /// bytes are binary.
    pub fn render(&self, detector: &dyn BinaryDetector) -> String {
        let merged = self.merge();
        if detector.is_binary(&merged) {
            return hex::encode(&merged);
        }
        String::from_utf8_lossy(&merged).into_owned()
    }
}
