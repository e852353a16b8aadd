//! Decoding of HTTP chunked transfer encoding as specified in
//! [RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1).
//!
//! The decoder is resumable over arbitrary fragment boundaries: the state
//! lives with the connection while the bytes live in the caller's window.
//! Decoded chunks come back as ranges into that window so the driver can
//! emit them without copying.

use std::cmp;
use std::ops::Range;

use crate::protocol::ParseError;
use tracing::trace;
use ChunkedState::*;

/// A decoder for handling HTTP chunked transfer encoding.
///
/// Each chunk starts with its size in hexadecimal, followed by optional
/// extensions and CRLF, then the chunk data and CRLF. A zero-sized chunk
/// ends the body; trailer fields after it are consumed but not surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size in hex
    Size,
    /// Handle whitespace after size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// Read LF after chunk size
    SizeLf,
    /// Read chunk data
    Body,
    /// Read CR after chunk data
    BodyCr,
    /// Read LF after chunk data
    BodyLf,
    /// Read optional trailer fields
    Trailer,
    /// Read LF after trailer
    TrailerLf,
    /// Read final CR
    EndCr,
    /// Read final LF
    EndLf,
    /// Final state after reading last chunk
    End,
}

macro_rules! try_next_byte {
    ($buf:ident, $at:ident, $len:ident) => {{
        if *$at < $len {
            let byte = $buf[*$at];
            *$at += 1;
            byte
        } else {
            // window drained mid-frame; resume here on the next call
            return Ok(None);
        }
    }};
}

macro_rules! or_overflow {
    ($e:expr) => {
        match $e {
            Some(value) => value,
            None => return Err(ParseError::invalid_chunk("chunk length overflow")),
        }
    };
}

impl ChunkedDecoder {
    /// Starts a decoder in the Size state, ready for the first chunk.
    pub(crate) fn new() -> Self {
        Self { state: Size, remaining_size: 0 }
    }

    /// Decodes the next chunk out of `buf[*at..len]`, advancing `*at` past
    /// all consumed framing.
    ///
    /// Returns the chunk's range into `buf`; the empty range is the
    /// terminator and is produced exactly once, after the final CRLF (and
    /// any trailers) went by. `Ok(None)` means the window is drained
    /// mid-frame.
    pub(crate) fn decode(
        &mut self,
        buf: &[u8],
        at: &mut usize,
        len: usize,
    ) -> Result<Option<Range<usize>>, ParseError> {
        loop {
            match self.state {
                Size => match try_next_byte!(buf, at, len) {
                    byte @ b'0'..=b'9' => {
                        self.remaining_size = or_overflow!(self.remaining_size.checked_mul(16));
                        self.remaining_size =
                            or_overflow!(self.remaining_size.checked_add(u64::from(byte - b'0')));
                    }
                    byte @ b'a'..=b'f' => {
                        self.remaining_size = or_overflow!(self.remaining_size.checked_mul(16));
                        self.remaining_size = or_overflow!(self
                            .remaining_size
                            .checked_add(u64::from(byte + 10 - b'a')));
                    }
                    byte @ b'A'..=b'F' => {
                        self.remaining_size = or_overflow!(self.remaining_size.checked_mul(16));
                        self.remaining_size = or_overflow!(self
                            .remaining_size
                            .checked_add(u64::from(byte + 10 - b'A')));
                    }
                    b'\t' | b' ' => self.state = SizeLws,
                    b';' => self.state = Extension,
                    b'\r' => self.state = SizeLf,
                    _ => return Err(ParseError::invalid_chunk("invalid chunk size")),
                },

                // LWS can follow the chunk size, but no more digits can come
                SizeLws => match try_next_byte!(buf, at, len) {
                    b'\t' | b' ' => {}
                    b';' => self.state = Extension,
                    b'\r' => self.state = SizeLf,
                    _ => {
                        return Err(ParseError::invalid_chunk(
                            "invalid chunk size linear white space",
                        ))
                    }
                },

                // extensions are ignored; they end at CRLF, and a bare LF
                // inside one is rejected
                Extension => match try_next_byte!(buf, at, len) {
                    b'\r' => self.state = SizeLf,
                    b'\n' => {
                        return Err(ParseError::invalid_chunk("chunk extension contains newline"))
                    }
                    _ => {}
                },

                SizeLf => match try_next_byte!(buf, at, len) {
                    b'\n' => {
                        self.state = if self.remaining_size == 0 { EndCr } else { Body };
                    }
                    _ => return Err(ParseError::invalid_chunk("invalid chunk size LF")),
                },

                Body => {
                    if *at == len {
                        return Ok(None);
                    }
                    let take = cmp::min(self.remaining_size, (len - *at) as u64) as usize;
                    let range = *at..*at + take;
                    *at += take;
                    self.remaining_size -= take as u64;
                    if self.remaining_size == 0 {
                        self.state = BodyCr;
                    }
                    trace!(len = take, "read chunked bytes");
                    return Ok(Some(range));
                }

                BodyCr => match try_next_byte!(buf, at, len) {
                    b'\r' => self.state = BodyLf,
                    _ => return Err(ParseError::invalid_chunk("invalid chunk body CR")),
                },

                BodyLf => match try_next_byte!(buf, at, len) {
                    b'\n' => self.state = Size,
                    _ => return Err(ParseError::invalid_chunk("invalid chunk body LF")),
                },

                Trailer => match try_next_byte!(buf, at, len) {
                    b'\r' => self.state = TrailerLf,
                    _ => {}
                },

                TrailerLf => match try_next_byte!(buf, at, len) {
                    b'\n' => self.state = EndCr,
                    _ => return Err(ParseError::invalid_chunk("invalid trailer end LF")),
                },

                // anything that is not the final CR opens a trailer field
                EndCr => match try_next_byte!(buf, at, len) {
                    b'\r' => self.state = EndLf,
                    _ => self.state = Trailer,
                },

                EndLf => match try_next_byte!(buf, at, len) {
                    b'\n' => {
                        self.state = End;
                        trace!("finished reading chunked data");
                        return Ok(Some(*at..*at));
                    }
                    _ => return Err(ParseError::invalid_chunk("invalid chunk end LF")),
                },

                End => return Ok(Some(*at..*at)),
            }
        }
    }
}
