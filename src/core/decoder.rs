//! Zero-copy frame decoder
//!
//! Walks Ethernet -> IPv4 -> TCP/UDP with explicit big-endian field reads
//! at fixed offsets. No allocation beyond the output struct; the payload
//! is a slice into the input buffer.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::packet::{
    EthernetHeader, Ipv4Header, ParsedPacket, TcpFlags, TcpHeader, UdpHeader, ETHERTYPE_IPV4,
};

/// Ethernet header size
const ETHER_HDR_LEN: usize = 14;
/// Minimum decodable frame: Ethernet + fixed IPv4 header
const MIN_FRAME_LEN: usize = ETHER_HDR_LEN + 20;

const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;

/// Decode failure for a single frame
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("frame truncated: need {needed} bytes, have {have}")]
    TooShort { needed: usize, have: usize },

    #[error("unsupported ethertype {0:#06x}")]
    UnsupportedEthertype(u16),

    #[error("bad IP version {0}")]
    BadIpVersion(u8),

    #[error("bad IPv4 header length {0}")]
    BadIhl(u8),
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Stateless layered decoder with atomic counters.
///
/// Counters are observable from other threads (statistics reporter); the
/// decode path itself takes `&self` and never blocks.
#[derive(Debug, Default)]
pub struct PacketDecoder {
    packets_parsed: AtomicU64,
    parse_errors: AtomicU64,
    next_packet_id: AtomicU64,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {
            packets_parsed: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            next_packet_id: AtomicU64::new(0),
        }
    }

    /// Decode one frame.
    ///
    /// Non-TCP/UDP IP protocols yield a valid packet with no transport
    /// header and an empty payload. A fully present IP header with a
    /// truncated transport header also yields a packet with no transport
    /// header rather than an error.
    pub fn decode<'a>(
        &self,
        data: &'a [u8],
        timestamp: DateTime<Utc>,
    ) -> Result<ParsedPacket<'a>, ParseError> {
        match self.decode_inner(data, timestamp) {
            Ok(pkt) => {
                self.packets_parsed.fetch_add(1, Ordering::Relaxed);
                Ok(pkt)
            }
            Err(e) => {
                self.parse_errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn decode_inner<'a>(
        &self,
        data: &'a [u8],
        timestamp: DateTime<Utc>,
    ) -> Result<ParsedPacket<'a>, ParseError> {
        if data.len() < ETHER_HDR_LEN {
            return Err(ParseError::TooShort {
                needed: ETHER_HDR_LEN,
                have: data.len(),
            });
        }

        let eth = EthernetHeader {
            dst_mac: data[0..6].try_into().unwrap(),
            src_mac: data[6..12].try_into().unwrap(),
            ethertype: read_u16(data, 12),
        };
        if eth.ethertype != ETHERTYPE_IPV4 {
            return Err(ParseError::UnsupportedEthertype(eth.ethertype));
        }

        if data.len() < MIN_FRAME_LEN {
            return Err(ParseError::TooShort {
                needed: MIN_FRAME_LEN,
                have: data.len(),
            });
        }

        let ip = &data[ETHER_HDR_LEN..];
        let version = (ip[0] >> 4) & 0x0f;
        if version != 4 {
            return Err(ParseError::BadIpVersion(version));
        }
        let ihl = ip[0] & 0x0f;
        let ip_hdr_len = (ihl as usize) * 4;
        if ip_hdr_len < 20 {
            return Err(ParseError::BadIhl(ihl));
        }

        let ipv4 = Ipv4Header {
            version_ihl: ip[0],
            tos: ip[1],
            total_length: read_u16(ip, 2),
            identification: read_u16(ip, 4),
            flags_fragment: read_u16(ip, 6),
            ttl: ip[8],
            protocol: ip[9],
            checksum: read_u16(ip, 10),
            src_ip: read_u32(ip, 12),
            dst_ip: read_u32(ip, 16),
        };

        let transport_offset = ETHER_HDR_LEN + ip_hdr_len;
        if data.len() < transport_offset {
            return Err(ParseError::TooShort {
                needed: transport_offset,
                have: data.len(),
            });
        }
        let transport = &data[transport_offset..];

        let mut tcp = None;
        let mut udp = None;
        let mut payload: &[u8] = &[];

        match ipv4.protocol {
            IPPROTO_TCP if transport.len() >= 20 => {
                let header = TcpHeader {
                    src_port: read_u16(transport, 0),
                    dst_port: read_u16(transport, 2),
                    seq: read_u32(transport, 4),
                    ack: read_u32(transport, 8),
                    data_offset: (transport[12] >> 4) & 0x0f,
                    flags: TcpFlags::from_u8(transport[13] & 0x3f),
                    window: read_u16(transport, 14),
                    checksum: read_u16(transport, 16),
                    urgent_pointer: read_u16(transport, 18),
                };
                let tcp_hdr_len = header.header_len();
                if tcp_hdr_len >= 20 && transport.len() > tcp_hdr_len {
                    payload = &transport[tcp_hdr_len..];
                }
                tcp = Some(header);
            }
            IPPROTO_UDP if transport.len() >= 8 => {
                udp = Some(UdpHeader {
                    src_port: read_u16(transport, 0),
                    dst_port: read_u16(transport, 2),
                    length: read_u16(transport, 4),
                    checksum: read_u16(transport, 6),
                });
                if transport.len() > 8 {
                    payload = &transport[8..];
                }
            }
            _ => {}
        }

        let packet_id = self.next_packet_id.fetch_add(1, Ordering::Relaxed) + 1;

        Ok(ParsedPacket {
            timestamp,
            packet_id,
            raw_length: data.len() as u32,
            eth,
            ipv4,
            tcp,
            udp,
            payload,
        })
    }

    pub fn packets_parsed(&self) -> u64 {
        self.packets_parsed.load(Ordering::Relaxed)
    }

    pub fn parse_errors(&self) -> u64 {
        self.parse_errors.load(Ordering::Relaxed)
    }
}
