//! Request head decoding.
//!
//! The request line plus header block are parsed in place: header keys are
//! lower-cased directly in the receive buffer and every key and value is
//! recorded as an offset span, so the request view borrows straight from
//! the caller's bytes. The scan relies on the fence written by the driver
//! (see [`scan`](crate::codec::scan)) and never reads past
//! `buf[len + 1]`.

use crate::codec::scan::find_cr;
use crate::protocol::{HeaderIndex, ParseError, MAX_HEADERS};
use tracing::trace;

pub(crate) struct HeadDecoder;

impl HeadDecoder {
    /// Decodes one complete head from the fenced window `buf[start..len]`.
    ///
    /// On success returns the byte count consumed through the terminating
    /// CRLFCRLF; spans are recorded as absolute offsets into `buf` with
    /// slot 0 carrying the request line and an empty-key sentinel closing
    /// the list. `Ok(None)` means the head is still incomplete; an error
    /// means the bytes already present cannot form a valid head.
    pub(crate) fn decode(
        buf: &mut [u8],
        start: usize,
        len: usize,
        headers: &mut [HeaderIndex; MAX_HEADERS],
    ) -> Result<Option<usize>, ParseError> {
        let mut at = start;
        for slot in 0..MAX_HEADERS - 1 {
            // lower-case and scan the key until ':' or any control byte;
            // the first iteration reads the method this way, stopping at
            // the space
            let key_start = at;
            while buf[at] != b':' && buf[at] > 32 {
                buf[at] |= 0x20;
                at += 1;
            }
            headers[slot].name = (key_start, at);

            if buf[at] == b':' && buf[at + 1] == b' ' {
                at += 2;
            } else {
                // tolerate a bare colon or stray whitespace before the value
                while (buf[at] == b':' || buf[at] < 33) && buf[at] != b'\r' {
                    at += 1;
                }
            }

            let value_start = at;
            at = find_cr(buf, at);
            if buf[at + 1] != b'\n' {
                // a real byte after the CR proves malformation; the fence
                // only means the window ended mid-line
                return if at + 1 < len {
                    Err(ParseError::invalid_header("CR not followed by LF"))
                } else {
                    Ok(None)
                };
            }
            headers[slot].value = (value_start, at);
            at += 2;

            // at least the request line is in, so a CR here ends the head
            if buf[at] == b'\r' {
                return if buf[at + 1] == b'\n' {
                    headers[slot + 1].name = (0, 0);
                    trace!(consumed = at + 2 - start, headers = slot, "decoded request head");
                    Ok(Some(at + 2 - start))
                } else if at + 1 < len {
                    Err(ParseError::invalid_header("head terminator is not CRLF"))
                } else {
                    Ok(None)
                };
            }
        }
        Err(ParseError::too_many_headers(MAX_HEADERS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::scan::{self, FENCE_LEN};
    use crate::protocol::EMPTY_HEADER_INDEX_ARRAY;

    fn fenced(head: &[u8]) -> (Vec<u8>, usize) {
        let mut buf = head.to_vec();
        let len = buf.len();
        buf.resize(len + FENCE_LEN, 0);
        scan::fence(&mut buf, len);
        (buf, len)
    }

    fn span<'b>(buf: &'b [u8], (start, end): (usize, usize)) -> &'b [u8] {
        &buf[start..end]
    }

    #[test]
    fn decodes_request_line_and_headers() {
        let (mut buf, len) = fenced(b"GET /index.html HTTP/1.1\r\nHost: 127.0.0.1:8080\r\nAccept: */*\r\n\r\n");
        let mut headers = EMPTY_HEADER_INDEX_ARRAY;

        let consumed = HeadDecoder::decode(&mut buf, 0, len, &mut headers).unwrap().unwrap();
        assert_eq!(consumed, len);

        assert_eq!(span(&buf, headers[0].name), b"get");
        assert_eq!(span(&buf, headers[0].value), b"/index.html HTTP/1.1");
        assert_eq!(span(&buf, headers[1].name), b"host");
        assert_eq!(span(&buf, headers[1].value), b"127.0.0.1:8080");
        assert_eq!(span(&buf, headers[2].name), b"accept");
        assert_eq!(span(&buf, headers[2].value), b"*/*");
        assert_eq!(headers[3].name, (0, 0));
    }

    #[test]
    fn keys_are_lower_cased_in_place() {
        let (mut buf, len) = fenced(b"POST / HTTP/1.1\r\nCONTENT-LENGTH: 5\r\n\r\n");
        let mut headers = EMPTY_HEADER_INDEX_ARRAY;

        HeadDecoder::decode(&mut buf, 0, len, &mut headers).unwrap().unwrap();
        assert_eq!(span(&buf, headers[1].name), b"content-length");
        assert_eq!(span(&buf, headers[1].value), b"5");
    }

    #[test]
    fn value_whitespace_is_left_trimmed_only() {
        let (mut buf, len) = fenced(b"GET / HTTP/1.1\r\nHost:   spaced.example\r\nX-Colon:value\r\n\r\n");
        let mut headers = EMPTY_HEADER_INDEX_ARRAY;

        HeadDecoder::decode(&mut buf, 0, len, &mut headers).unwrap().unwrap();
        assert_eq!(span(&buf, headers[1].value), b"spaced.example");
        assert_eq!(span(&buf, headers[2].value), b"value");
    }

    #[test]
    fn empty_value_is_permitted() {
        let (mut buf, len) = fenced(b"GET / HTTP/1.1\r\nX-Empty:\r\nHost: x\r\n\r\n");
        let mut headers = EMPTY_HEADER_INDEX_ARRAY;

        HeadDecoder::decode(&mut buf, 0, len, &mut headers).unwrap().unwrap();
        assert_eq!(span(&buf, headers[1].name), b"x-empty");
        assert_eq!(span(&buf, headers[1].value), b"");
        assert_eq!(span(&buf, headers[2].name), b"host");
    }

    #[test]
    fn incomplete_head_needs_more_data() {
        for prefix_len in 1.."GET / HTTP/1.1\r\nHost: x\r\n\r\n".len() {
            let (mut buf, len) = fenced(&b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"[..prefix_len]);
            let mut headers = EMPTY_HEADER_INDEX_ARRAY;
            let decoded = HeadDecoder::decode(&mut buf, 0, len, &mut headers).unwrap();
            assert!(decoded.is_none(), "prefix of {prefix_len} bytes is not a complete head");
        }
    }

    #[test]
    fn bare_cr_inside_header_is_malformed() {
        let (mut buf, len) = fenced(b"GET / HTTP/1.1\r\nBad\rLine\r\n\r\n");
        let mut headers = EMPTY_HEADER_INDEX_ARRAY;

        let result = HeadDecoder::decode(&mut buf, 0, len, &mut headers);
        assert!(matches!(result, Err(ParseError::InvalidHeader { .. })));
    }

    #[test]
    fn broken_terminator_is_malformed() {
        let (mut buf, len) = fenced(b"GET / HTTP/1.1\r\nHost: x\r\n\rx");
        let mut headers = EMPTY_HEADER_INDEX_ARRAY;

        let result = HeadDecoder::decode(&mut buf, 0, len, &mut headers);
        assert!(matches!(result, Err(ParseError::InvalidHeader { .. })));
    }

    #[test]
    fn header_capacity_is_bounded() {
        let mut within = b"GET / HTTP/1.1\r\n".to_vec();
        for n in 0..MAX_HEADERS - 2 {
            within.extend_from_slice(format!("X-H{n}: v\r\n").as_bytes());
        }
        within.extend_from_slice(b"\r\n");
        let (mut buf, len) = fenced(&within);
        let mut headers = EMPTY_HEADER_INDEX_ARRAY;
        assert!(HeadDecoder::decode(&mut buf, 0, len, &mut headers).unwrap().is_some());

        let mut beyond = b"GET / HTTP/1.1\r\n".to_vec();
        for n in 0..MAX_HEADERS - 1 {
            beyond.extend_from_slice(format!("X-H{n}: v\r\n").as_bytes());
        }
        beyond.extend_from_slice(b"\r\n");
        let (mut buf, len) = fenced(&beyond);
        let mut headers = EMPTY_HEADER_INDEX_ARRAY;
        let result = HeadDecoder::decode(&mut buf, 0, len, &mut headers);
        assert!(matches!(result, Err(ParseError::TooManyHeaders { .. })));
    }

    #[test]
    fn pipelined_heads_decode_back_to_back() {
        let first = b"GET /a HTTP/1.1\r\nHost: x\r\n\r\n";
        let second = b"GET /b HTTP/1.1\r\nHost: y\r\n\r\n";
        let mut combined = first.to_vec();
        combined.extend_from_slice(second);
        let (mut buf, len) = fenced(&combined);
        let mut headers = EMPTY_HEADER_INDEX_ARRAY;

        let consumed = HeadDecoder::decode(&mut buf, 0, len, &mut headers).unwrap().unwrap();
        assert_eq!(consumed, first.len());

        let consumed = HeadDecoder::decode(&mut buf, first.len(), len, &mut headers).unwrap().unwrap();
        assert_eq!(consumed, second.len());
        assert_eq!(span(&buf, headers[0].value), b"/b HTTP/1.1");
    }

    // the decoder should accept exactly what a reference parser accepts on
    // well-formed input, and agree on where the head ends
    #[test]
    fn agrees_with_httparse_on_valid_heads() {
        let cases: [&[u8]; 4] = [
            b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n",
            b"POST /submit HTTP/1.0\r\nContent-Length: 11\r\nContent-Type: text/plain\r\n\r\n",
            b"DELETE /items/9?force=1 HTTP/1.1\r\nAuthorization: Bearer abc.def\r\n\r\n",
            b"OPTIONS * HTTP/1.1\r\nMax-Forwards: 3\r\nUser-Agent: curl/8.4.0\r\n\r\n",
        ];

        for case in cases {
            let (mut buf, len) = fenced(case);
            let mut headers = EMPTY_HEADER_INDEX_ARRAY;
            let consumed = HeadDecoder::decode(&mut buf, 0, len, &mut headers)
                .unwrap()
                .expect("case is a complete head");

            let mut reference_headers = [httparse::EMPTY_HEADER; 16];
            let mut reference = httparse::Request::new(&mut reference_headers);
            let status = reference.parse(case).unwrap();
            assert_eq!(status, httparse::Status::Complete(consumed));

            let method = reference.method.unwrap().to_ascii_lowercase();
            assert_eq!(span(&buf, headers[0].name), method.as_bytes());

            let target = span(&buf, headers[0].value);
            assert_eq!(&target[..target.len() - 9], reference.path.unwrap().as_bytes());

            for (mine, theirs) in (1..).zip(reference.headers.iter()) {
                let name = theirs.name.to_ascii_lowercase();
                assert_eq!(span(&buf, headers[mine].name), name.as_bytes());
                assert_eq!(span(&buf, headers[mine].value), theirs.value);
            }
        }
    }
}
