//! The request view handed to the application callback.
//!
//! Every accessor returns slices of the receive buffer the parser was fed.
//! The view lives for one request callback; nothing taken from it survives
//! past that callback unless copied.

use std::borrow::Cow;

use crate::protocol::bloom::BloomFilter;
use crate::protocol::query;

/// Maximum number of header slots per request, request line included.
pub const MAX_HEADERS: usize = 50;

/// Maximum number of route parameters a router may bind on one request.
pub const MAX_PARAMETERS: usize = 16;

/// Start/end byte offsets of one header's key and value in the receive
/// buffer. Slot 0 always carries the request line: the lower-cased method
/// as its key, the request target as its value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct HeaderIndex {
    pub(crate) name: (usize, usize),
    pub(crate) value: (usize, usize),
}

pub(crate) const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

pub(crate) const EMPTY_HEADER_INDEX_ARRAY: [HeaderIndex; MAX_HEADERS] =
    [EMPTY_HEADER_INDEX; MAX_HEADERS];

/// Borrowed view of one parsed request head.
///
/// Header keys have been lower-cased in place, so lookups take the
/// lower-cased spelling. The underlying buffer is writable and owned by
/// the caller of `consume`; do not retain slices past the request
/// callback.
pub struct HttpRequest<'a> {
    buf: &'a [u8],
    headers: &'a [HeaderIndex; MAX_HEADERS],
    ancient_http: bool,
    query_separator: usize,
    did_yield: bool,
    bf: BloomFilter,
    parameters: [&'a [u8]; MAX_PARAMETERS],
    parameter_count: usize,
}

impl<'a> HttpRequest<'a> {
    pub(crate) fn new(
        buf: &'a [u8],
        headers: &'a [HeaderIndex; MAX_HEADERS],
        ancient_http: bool,
    ) -> Self {
        let mut bf = BloomFilter::default();
        for header in &headers[1..] {
            if header.name.0 == header.name.1 {
                break;
            }
            bf.add(&buf[header.name.0..header.name.1]);
        }

        let (target_start, target_end) = headers[0].value;
        let target = &buf[target_start..target_end];
        let query_separator = memchr::memchr(b'?', target).unwrap_or(target.len());

        Self {
            buf,
            headers,
            ancient_http,
            query_separator,
            did_yield: false,
            bf,
            parameters: [&[]; MAX_PARAMETERS],
            parameter_count: 0,
        }
    }

    /// Lower-cased request method, e.g. `b"get"`.
    pub fn method(&self) -> &'a [u8] {
        let (start, end) = self.headers[0].name;
        &self.buf[start..end]
    }

    /// Request target up to but excluding `?`.
    pub fn url(&self) -> &'a [u8] {
        let (start, _) = self.headers[0].value;
        &self.buf[start..start + self.query_separator]
    }

    /// Raw query string with the leading `?` stripped; empty if none.
    pub fn query(&self) -> &'a [u8] {
        let (start, end) = self.headers[0].value;
        if start + self.query_separator < end {
            &self.buf[start + self.query_separator + 1..end]
        } else {
            &[]
        }
    }

    /// Percent-decoded value of one query parameter.
    pub fn query_value(&self, key: &[u8]) -> Option<Cow<'a, [u8]>> {
        query::decoded_value(self.query(), key)
    }

    /// Looks up a header by its lower-cased key.
    ///
    /// The first matching header wins when duplicates are present.
    pub fn header(&self, lower_cased_key: &[u8]) -> Option<&'a [u8]> {
        if !self.bf.might_have(lower_cased_key) {
            return None;
        }
        self.headers().find(|(key, _)| *key == lower_cased_key).map(|(_, value)| value)
    }

    /// Iterates `(key, value)` pairs in wire order, request line excluded.
    pub fn headers(&self) -> HeaderIterator<'a> {
        HeaderIterator { buf: self.buf, headers: &self.headers[1..] }
    }

    /// Route parameter bound by the router, if any.
    pub fn parameter(&self, index: usize) -> Option<&'a [u8]> {
        (index < self.parameter_count).then(|| self.parameters[index])
    }

    /// Binds route parameters for this request.
    ///
    /// The slice handles are copied, the bytes are not; at most
    /// [`MAX_PARAMETERS`] are kept. Opaque to the parser itself.
    pub fn set_parameters(&mut self, parameters: &[&'a [u8]]) {
        let count = parameters.len().min(MAX_PARAMETERS);
        self.parameters[..count].copy_from_slice(&parameters[..count]);
        self.parameter_count = count;
    }

    /// True for HTTP/1.0 requests, for which the caller applies
    /// connection-close and no-keepalive defaults.
    pub fn is_ancient(&self) -> bool {
        self.ancient_http
    }

    /// Whether a route handler declined this request.
    pub fn did_yield(&self) -> bool {
        self.did_yield
    }

    /// Marks this request as yielded. The parser never reads this flag.
    pub fn set_yield(&mut self, did_yield: bool) {
        self.did_yield = did_yield;
    }
}

/// Iterator over the header pairs of one request.
pub struct HeaderIterator<'a> {
    buf: &'a [u8],
    headers: &'a [HeaderIndex],
}

impl<'a> Iterator for HeaderIterator<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (first, rest) = self.headers.split_first()?;
        // the empty key is the end-of-headers sentinel
        if first.name.0 == first.name.1 {
            return None;
        }
        self.headers = rest;
        Some((
            &self.buf[first.name.0..first.name.1],
            &self.buf[first.value.0..first.value.1],
        ))
    }
}
