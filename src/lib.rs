//! Streaming HTTP/1.x request parsing for connection-oriented servers.
//!
//! The heart of the crate is [`codec::HttpParser`]: a per-connection push
//! parser fed raw receive buffers as they arrive from a transport. It
//! recognizes complete request heads in place, surfaces each one through a
//! request callback as a borrowed [`protocol::HttpRequest`] view, then
//! streams any entity body (Content-Length or chunked framed) through a
//! data callback. Socket I/O, TLS, routing and response writing all live
//! with the caller; the parser talks to them through three narrow
//! callbacks and an opaque user token.
//!
//! ```
//! use h1parse::codec::HttpParser;
//!
//! let mut parser = HttpParser::new();
//! let mut buffer = b"GET /hello?who=world HTTP/1.1\r\nHost: example\r\n\r\n__".to_vec();
//! let len = buffer.len() - 2; // two writable post-padding bytes
//!
//! let token = parser.consume(
//!     &mut buffer,
//!     len,
//!     0u32,
//!     |user, request| {
//!         assert_eq!(request.method(), b"get");
//!         assert_eq!(request.url(), b"/hello");
//!         assert_eq!(request.query(), b"who=world");
//!         user
//!     },
//!     |user, chunk, fin| {
//!         assert!(chunk.is_empty() && fin);
//!         user
//!     },
//!     |user| user,
//! );
//! assert_eq!(token, 0);
//! ```

pub mod codec;
pub mod protocol;

pub(crate) use utils::ensure;

mod utils;
