//! Streaming multipart body extraction
//!
//! Pulls the single file part out of a `multipart/form-data` request body
//! without buffering the whole body: the scanner only ever holds a fixed
//! window of bytes.

pub mod extract;
pub mod scan;

use std::fmt;
use thiserror::Error;

pub use extract::{extract_payload, ExtractLimits};
pub use scan::{index_of, Scanner};

/// Which boundary occurrence could not be located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundarySide {
    Opening,
    Closing,
}

impl fmt::Display for BoundarySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundarySide::Opening => f.write_str("opening"),
            BoundarySide::Closing => f.write_str("closing"),
        }
    }
}

/// Multipart extraction errors
#[derive(Debug, Error)]
pub enum MultipartError {
    #[error("{which} boundary not found")]
    BoundaryNotFound { which: BoundarySide },

    #[error("content type carries no boundary parameter")]
    MissingBoundary,

    #[error("boundary of {len} bytes does not fit a {window} byte scan window")]
    BoundaryTooLong { len: usize, window: usize },

    #[error("malformed part: {0}")]
    MalformedPart(String),

    #[error("payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for multipart operations
pub type MultipartResult<T> = Result<T, MultipartError>;

/// Delimiter searched for in the body: `--` followed by the client's token.
#[derive(Clone, PartialEq, Eq)]
pub struct Boundary(Vec<u8>);

impl Boundary {
    /// Build the delimiter for a boundary token
    pub fn new(token: &str) -> MultipartResult<Self> {
        if token.is_empty() {
            return Err(MultipartError::MissingBoundary);
        }
        let mut bytes = Vec::with_capacity(token.len() + 2);
        bytes.extend_from_slice(b"--");
        bytes.extend_from_slice(token.as_bytes());
        Ok(Boundary(bytes))
    }

    /// Parse the `boundary=<token>` parameter of a Content-Type header value.
    pub fn from_content_type(content_type: &str) -> MultipartResult<Self> {
        let token = content_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
            .map(|(_, value)| value.trim().trim_matches('"'))
            .ok_or(MultipartError::MissingBoundary)?;
        Self::new(token)
    }

    /// Delimiter bytes, including the leading `--`
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The delimiter plus the CRLF retained ahead of it must leave room in
    /// the window for at least one freshly read byte.
    pub fn check_window(&self, window: usize) -> MultipartResult<()> {
        if self.0.len() + extract::PART_TRAILER >= window {
            return Err(MultipartError::BoundaryTooLong {
                len: self.0.len(),
                window,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Boundary({})", String::from_utf8_lossy(&self.0))
    }
}

/// The file part isolated from a request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPayload {
    /// Raw part bytes, trailing CRLF excluded
    pub bytes: Vec<u8>,
    /// Declared media type, lowercased, parameters stripped
    pub content_type: String,
    /// `filename` from Content-Disposition, if the client sent one
    pub filename: Option<String>,
}
