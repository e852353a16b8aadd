//! The per-connection parse driver.
//!
//! One [`HttpParser`] is bound to one connection and fed every receive
//! buffer through [`HttpParser::consume`]. Heads are parsed in place
//! against the caller's post-padded buffer, each completed request is
//! surfaced through the request callback, and entity bytes stream through
//! the data callback with a fin flag on the final piece. A short partial
//! head is carried to the next call in a bounded fallback buffer.
//!
//! The application signals a protocol hand-off (for example a WebSocket
//! upgrade) by returning a user token different from the one it was
//! handed; the driver stops immediately and propagates the new token.

use std::cmp;
use std::mem;

use bytes::BytesMut;
use tracing::debug;

use crate::codec::body::{BodyDecoder, ChunkedDecoder, LengthDecoder};
use crate::codec::head_decoder::HeadDecoder;
#[cfg(feature = "proxy")]
use crate::codec::proxy_decoder::{ProxyDecoder, ProxyStatus};
use crate::codec::scan::{fence, FENCE_LEN};
use crate::ensure;
use crate::protocol::{HttpRequest, ParseError, EMPTY_HEADER_INDEX_ARRAY};

/// Upper bound on bytes carried between calls while a head is incomplete.
pub const MAX_FALLBACK_SIZE: usize = 4096;

/// Post-padding the caller must keep writable past the logical end of a
/// receive buffer that may carry body bytes.
pub const MINIMUM_POST_PADDING: usize = 32;

/// Streaming push parser for one HTTP/1.x connection.
///
/// The parser owns no buffer of its own beyond the capped fallback; all
/// head and body bytes are borrowed from the buffer each `consume` call
/// provides. It is single-threaded and re-entered only by its owning
/// connection, synchronously per receive event.
pub struct HttpParser {
    fallback: BytesMut,
    body: BodyDecoder,
    #[cfg(feature = "proxy")]
    proxy: Option<ProxyDecoder>,
}

impl Default for HttpParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpParser {
    pub fn new() -> Self {
        Self {
            fallback: BytesMut::new(),
            body: BodyDecoder::None,
            #[cfg(feature = "proxy")]
            proxy: None,
        }
    }

    /// Creates a parser that expects an optional PROXY protocol v2
    /// preamble before the first request.
    #[cfg(feature = "proxy")]
    pub fn with_proxy() -> Self {
        Self { proxy: Some(ProxyDecoder::new()), ..Self::new() }
    }

    /// Addresses learned from the PROXY preamble, once one was consumed.
    #[cfg(feature = "proxy")]
    pub fn proxy(&self) -> Option<&ProxyDecoder> {
        self.proxy.as_ref()
    }

    /// Feeds one receive buffer through the parser.
    ///
    /// `data[..len]` holds the received bytes; `data[len..len + 2]` must be
    /// writable post-padding (the scan fence is written there), and a
    /// buffer that may carry body bytes should keep
    /// [`MINIMUM_POST_PADDING`] writable bytes past `len`. The buffer is
    /// mutated: header keys are lower-cased in place, so it must not be
    /// shared with concurrent readers.
    ///
    /// For every completed head, `request_handler` fires once with a
    /// borrowed [`HttpRequest`] view; `data_handler` then fires zero or
    /// more times with body slices, with `fin` true exactly once per
    /// request on its final piece (bodiless requests get a single empty
    /// `fin` emission). `error_handler` fires on an unrecoverable head or
    /// framing defect, or on fallback overflow, and its return value is
    /// propagated.
    ///
    /// Any callback may take over the connection by returning a token
    /// different from `user`; parsing halts at once and that token comes
    /// back. Callers should treat a changed token as "stop driving this
    /// parser".
    pub fn consume<U, R, D, E>(
        &mut self,
        data: &mut [u8],
        len: usize,
        user: U,
        mut request_handler: R,
        mut data_handler: D,
        error_handler: E,
    ) -> U
    where
        U: Copy + PartialEq,
        R: FnMut(U, &mut HttpRequest<'_>) -> U,
        D: FnMut(U, &[u8], bool) -> U,
        E: FnOnce(U) -> U,
    {
        assert!(
            data.len() >= len + FENCE_LEN,
            "receive buffers must keep at least {FENCE_LEN} writable post-padding bytes"
        );
        debug_assert!(
            !(self.body.is_active() && !self.fallback.is_empty()),
            "a streaming body and a buffered partial head cannot coexist"
        );

        fence(data, len);
        let mut at = 0;

        if self.body.is_active() {
            // continue the body left streaming by the previous call
            match self.stream_body(data, &mut at, len, user, &mut data_handler) {
                Ok(returned) if returned != user => return returned,
                Ok(_) => {}
                Err(error) => {
                    debug!(%error, "body framing failed");
                    return error_handler(user);
                }
            }
        } else if !self.fallback.is_empty() {
            // finish the head carried over from the previous call
            let had = self.fallback.len();
            let copy = cmp::min(MAX_FALLBACK_SIZE - had, len);

            let mut fallback = mem::take(&mut self.fallback);
            fallback.extend_from_slice(&data[..copy]);
            let fallback_len = fallback.len();
            fallback.reserve(MINIMUM_POST_PADDING);
            fallback.extend_from_slice(b"\ra"); // materialize the fence
            let result = self.consume_heads(
                &mut fallback,
                0,
                fallback_len,
                user,
                true,
                &mut request_handler,
                &mut data_handler,
            );
            fallback.truncate(fallback_len);
            self.fallback = fallback;

            match result {
                Err(error) => {
                    debug!(%error, "malformed head in fallback");
                    return error_handler(user);
                }
                Ok((_, returned)) if returned != user => {
                    // handed off; whatever sits in fallback is no longer ours
                    return returned;
                }
                Ok((0, _)) => {
                    if self.fallback.len() == MAX_FALLBACK_SIZE {
                        debug!("fallback buffer exhausted without a complete head");
                        return error_handler(user);
                    }
                    // everything is buffered, wait for the next receive
                    return user;
                }
                Ok((consumed, _)) => {
                    debug_assert!(consumed >= had);
                    self.fallback.clear();
                    at = consumed - had;

                    // a body that began in this head streams from the live window
                    if self.body.is_active() {
                        match self.stream_body(data, &mut at, len, user, &mut data_handler) {
                            Ok(returned) if returned != user => return returned,
                            Ok(_) => {}
                            Err(error) => {
                                debug!(%error, "body framing failed");
                                return error_handler(user);
                            }
                        }
                    }
                }
            }
        }

        // parse fresh heads, streaming each body as it comes
        match self.consume_heads(data, at, len, user, false, &mut request_handler, &mut data_handler)
        {
            Err(error) => {
                debug!(%error, "malformed head");
                return error_handler(user);
            }
            Ok((consumed, returned)) => {
                at += consumed;
                if returned != user {
                    return returned;
                }
            }
        }

        // carry a short partial head over to the next call
        if at < len {
            let rest = len - at;
            if rest < MAX_FALLBACK_SIZE {
                self.fallback.extend_from_slice(&data[at..len]);
            } else {
                debug!(rest, "partial head exceeds the fallback capacity");
                return error_handler(user);
            }
        }
        user
    }

    /// Parses heads out of the fenced window `buf[start..len]`, firing the
    /// request callback per head and, unless `consume_minimally`, the data
    /// callback for each head's body bytes.
    ///
    /// `consume_minimally` is the fallback policy: parse at most one head
    /// and leave its body for the live window. Returns bytes consumed from
    /// `start` and the token of the last callback.
    #[allow(clippy::too_many_arguments)]
    fn consume_heads<U, R, D>(
        &mut self,
        buf: &mut [u8],
        start: usize,
        len: usize,
        user: U,
        consume_minimally: bool,
        request_handler: &mut R,
        data_handler: &mut D,
    ) -> Result<(usize, U), ParseError>
    where
        U: Copy + PartialEq,
        R: FnMut(U, &mut HttpRequest<'_>) -> U,
        D: FnMut(U, &[u8], bool) -> U,
    {
        let mut at = start;
        let mut headers = EMPTY_HEADER_INDEX_ARRAY;

        while at < len {
            let head_start = at;

            #[cfg(feature = "proxy")]
            if let Some(proxy) = &mut self.proxy {
                match proxy.decode(&buf[at..len]) {
                    ProxyStatus::NeedMore => break,
                    ProxyStatus::Done { offset } => at += offset,
                }
            }

            let consumed = match HeadDecoder::decode(buf, at, len, &mut headers)? {
                Some(consumed) => consumed,
                None => {
                    // rewind over any proxy offset so the whole prefix is
                    // re-presented once more bytes arrive
                    at = head_start;
                    break;
                }
            };
            at += consumed;

            // request line fixups: flag HTTP/1.0, then strip the
            // " HTTP/1.x" tail so the value reads as the bare target
            let (target_start, target_end) = headers[0].value;
            let ancient_http = target_end > target_start && buf[target_end - 1] == b'0';
            headers[0].value =
                (target_start, target_start + (target_end - target_start).saturating_sub(9));

            let mut request = HttpRequest::new(&*buf, &headers, ancient_http);
            let returned = request_handler(user, &mut request);
            if returned != user {
                return Ok((at - start, returned));
            }

            if request.method() == b"get" {
                // still emit an empty terminator so every request sees fin
                let returned = data_handler(user, &[], true);
                if returned != user {
                    return Ok((at - start, returned));
                }
            } else if let Some(value) = request.header(b"content-length") {
                let length = parse_content_length(value)?;
                self.body = BodyDecoder::Length(LengthDecoder::new(length));
            } else {
                // no length on a non-GET request: assume chunked transfer-encoding
                self.body = BodyDecoder::Chunked(ChunkedDecoder::new());
            }

            if self.body.is_active() && !consume_minimally {
                let returned = self.stream_body(buf, &mut at, len, user, data_handler)?;
                if returned != user {
                    return Ok((at - start, returned));
                }
            }

            if consume_minimally {
                break;
            }
        }
        Ok((at - start, user))
    }

    /// Streams body bytes from `buf[*at..len]` through the data callback
    /// until the body completes, the window drains, or a callback takes
    /// over the connection.
    fn stream_body<U, D>(
        &mut self,
        buf: &[u8],
        at: &mut usize,
        len: usize,
        user: U,
        data_handler: &mut D,
    ) -> Result<U, ParseError>
    where
        U: Copy + PartialEq,
        D: FnMut(U, &[u8], bool) -> U,
    {
        loop {
            let (range, fin) = match &mut self.body {
                BodyDecoder::None => return Ok(user),
                BodyDecoder::Length(decoder) => match decoder.decode(at, len) {
                    Some((range, fin)) => (range, fin),
                    None => return Ok(user),
                },
                BodyDecoder::Chunked(decoder) => match decoder.decode(buf, at, len)? {
                    Some(range) => {
                        let fin = range.is_empty();
                        (range, fin)
                    }
                    None => return Ok(user),
                },
            };

            if fin {
                self.body = BodyDecoder::None;
            }
            let returned = data_handler(user, &buf[range], fin);
            if returned != user || fin {
                return Ok(returned);
            }
        }
    }
}

fn parse_content_length(value: &[u8]) -> Result<u64, ParseError> {
    let digits = value.trim_ascii();
    ensure!(!digits.is_empty(), ParseError::invalid_content_length("empty value"));

    let mut length: u64 = 0;
    for &byte in digits {
        ensure!(
            byte.is_ascii_digit(),
            ParseError::invalid_content_length("value is not a decimal number")
        );
        length = length
            .checked_mul(10)
            .and_then(|n| n.checked_add(u64::from(byte - b'0')))
            .ok_or_else(|| ParseError::invalid_content_length("value overflows u64"))?;
    }
    Ok(length)
}
