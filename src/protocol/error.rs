//! Error types for request parsing.
//!
//! Errors never cross the [`consume`](crate::codec::HttpParser::consume)
//! boundary as values; the driver logs them and reports through the error
//! callback. They exist as a type so the decoders can propagate a precise
//! reason up to that point.

use thiserror::Error;

/// Conditions that terminate parsing of a connection.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Number of headers exceeds the per-request capacity
    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    /// Invalid header or request line framing
    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    /// Invalid Content-Length header
    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    /// Invalid chunked transfer-encoding framing
    #[error("invalid chunked encoding: {reason}")]
    InvalidChunk { reason: String },
}

impl ParseError {
    /// Creates a new TooManyHeaders error
    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    /// Creates a new InvalidHeader error
    pub fn invalid_header<S: ToString>(reason: S) -> Self {
        Self::InvalidHeader { reason: reason.to_string() }
    }

    /// Creates a new InvalidContentLength error
    pub fn invalid_content_length<S: ToString>(reason: S) -> Self {
        Self::InvalidContentLength { reason: reason.to_string() }
    }

    /// Creates a new InvalidChunk error
    pub fn invalid_chunk<S: ToString>(reason: S) -> Self {
        Self::InvalidChunk { reason: reason.to_string() }
    }
}
