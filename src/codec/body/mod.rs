//! Body framing dispatch.
//!
//! [`BodyDecoder`] is the connection-level framing state: nothing in
//! progress, a Content-Length countdown, or the chunked transfer-encoding
//! state machine. `None` carries the invariant that the next bytes on the
//! wire start a new request head.

mod chunked_decoder;
mod length_decoder;

pub(crate) use chunked_decoder::ChunkedDecoder;
pub(crate) use length_decoder::LengthDecoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BodyDecoder {
    /// No body in progress
    None,

    /// Streaming a body sized by Content-Length
    Length(LengthDecoder),

    /// Streaming a chunked transfer-encoded body
    Chunked(ChunkedDecoder),
}

impl BodyDecoder {
    pub(crate) fn is_active(&self) -> bool {
        !matches!(self, BodyDecoder::None)
    }
}
