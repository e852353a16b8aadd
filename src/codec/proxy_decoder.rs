//! PROXY protocol v2 preamble decoding.
//!
//! Connections arriving through a load balancer that speaks the PROXY
//! protocol carry a binary preamble before any HTTP bytes. When a parser
//! is built with [`HttpParser::with_proxy`], the driver lets this decoder
//! consume that preamble first. Evaluation is a pure function of the
//! window prefix, so being re-run over a longer prefix after fallback
//! buffering yields the same answer.
//!
//! [`HttpParser::with_proxy`]: crate::codec::HttpParser::with_proxy

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

const SIGNATURE: [u8; 12] =
    [0x0d, 0x0a, 0x0d, 0x0a, 0x00, 0x0d, 0x0a, 0x51, 0x55, 0x49, 0x54, 0x0a];

const HEADER_LEN: usize = 16;

/// Outcome of one delegation from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProxyStatus {
    /// The window is a strict prefix of a possible frame; buffer and retry.
    NeedMore,
    /// `offset` bytes belong to the preamble. Zero when the window is not
    /// a PROXY frame at all, which is not an error: the bytes go to the
    /// HTTP parser untouched.
    Done { offset: usize },
}

/// Per-connection PROXY v2 state.
///
/// A later frame on the same connection overwrites the stored addresses.
#[derive(Debug, Default)]
pub struct ProxyDecoder {
    source: Option<SocketAddr>,
    destination: Option<SocketAddr>,
}

impl ProxyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source address carried by the most recent PROXY frame.
    pub fn source_address(&self) -> Option<SocketAddr> {
        self.source
    }

    /// Destination address carried by the most recent PROXY frame.
    pub fn destination_address(&self) -> Option<SocketAddr> {
        self.destination
    }

    pub(crate) fn decode(&mut self, window: &[u8]) -> ProxyStatus {
        let probe = window.len().min(SIGNATURE.len());
        if window[..probe] != SIGNATURE[..probe] {
            return ProxyStatus::Done { offset: 0 };
        }
        if window.len() < HEADER_LEN {
            return ProxyStatus::NeedMore;
        }

        let version_command = window[12];
        if version_command & 0xf0 != 0x20 {
            // signature without a v2 version byte; let HTTP parsing reject it
            return ProxyStatus::Done { offset: 0 };
        }

        let address_len = usize::from(u16::from_be_bytes([window[14], window[15]]));
        let total = HEADER_LEN + address_len;
        if window.len() < total {
            return ProxyStatus::NeedMore;
        }

        let addresses = &window[HEADER_LEN..total];
        match window[13] {
            // TCP or UDP over IPv4
            0x11 | 0x12 if address_len >= 12 => {
                let source_ip =
                    Ipv4Addr::new(addresses[0], addresses[1], addresses[2], addresses[3]);
                let destination_ip =
                    Ipv4Addr::new(addresses[4], addresses[5], addresses[6], addresses[7]);
                let source_port = u16::from_be_bytes([addresses[8], addresses[9]]);
                let destination_port = u16::from_be_bytes([addresses[10], addresses[11]]);
                self.source = Some(SocketAddr::new(IpAddr::V4(source_ip), source_port));
                self.destination =
                    Some(SocketAddr::new(IpAddr::V4(destination_ip), destination_port));
            }
            // TCP or UDP over IPv6
            0x21 | 0x22 if address_len >= 36 => {
                let mut source_ip = [0u8; 16];
                source_ip.copy_from_slice(&addresses[..16]);
                let mut destination_ip = [0u8; 16];
                destination_ip.copy_from_slice(&addresses[16..32]);
                let source_port = u16::from_be_bytes([addresses[32], addresses[33]]);
                let destination_port = u16::from_be_bytes([addresses[34], addresses[35]]);
                self.source =
                    Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(source_ip)), source_port));
                self.destination = Some(SocketAddr::new(
                    IpAddr::V6(Ipv6Addr::from(destination_ip)),
                    destination_port,
                ));
            }
            // LOCAL command or unspecified family: no addresses to expose
            _ => {
                self.source = None;
                self.destination = None;
            }
        }

        ProxyStatus::Done { offset: total }
    }
}
