//! Decoded packet representation
//!
//! A `ParsedPacket` is a view over a single captured frame: owned header
//! structs plus a payload slice borrowing the capture buffer. It is valid
//! only for one pass through the pipeline and cannot outlive the buffer it
//! was decoded from.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// EtherType for IPv4
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// IP protocol numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpProtocol {
    Icmp,
    Tcp,
    Udp,
    Other(u8),
}

impl From<u8> for IpProtocol {
    fn from(val: u8) -> Self {
        match val {
            1 => IpProtocol::Icmp,
            6 => IpProtocol::Tcp,
            17 => IpProtocol::Udp,
            other => IpProtocol::Other(other),
        }
    }
}

impl From<IpProtocol> for u8 {
    fn from(val: IpProtocol) -> Self {
        match val {
            IpProtocol::Icmp => 1,
            IpProtocol::Tcp => 6,
            IpProtocol::Udp => 17,
            IpProtocol::Other(v) => v,
        }
    }
}

impl std::fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IpProtocol::Icmp => write!(f, "ICMP"),
            IpProtocol::Tcp => write!(f, "TCP"),
            IpProtocol::Udp => write!(f, "UDP"),
            IpProtocol::Other(n) => write!(f, "Proto({})", n),
        }
    }
}

/// TCP flags (low 6 bits of the flag byte; CWR/ECE are not decoded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
}

/// Flag bit masks
pub const TCP_FIN: u8 = 0x01;
pub const TCP_SYN: u8 = 0x02;
pub const TCP_RST: u8 = 0x04;
pub const TCP_PSH: u8 = 0x08;
pub const TCP_ACK: u8 = 0x10;
pub const TCP_URG: u8 = 0x20;

impl TcpFlags {
    pub fn from_u8(flags: u8) -> Self {
        Self {
            fin: flags & TCP_FIN != 0,
            syn: flags & TCP_SYN != 0,
            rst: flags & TCP_RST != 0,
            psh: flags & TCP_PSH != 0,
            ack: flags & TCP_ACK != 0,
            urg: flags & TCP_URG != 0,
        }
    }

    pub fn to_u8(&self) -> u8 {
        let mut flags = 0u8;
        if self.fin { flags |= TCP_FIN; }
        if self.syn { flags |= TCP_SYN; }
        if self.rst { flags |= TCP_RST; }
        if self.psh { flags |= TCP_PSH; }
        if self.ack { flags |= TCP_ACK; }
        if self.urg { flags |= TCP_URG; }
        flags
    }

    /// Bare SYN (connection attempt)
    pub fn is_syn(&self) -> bool {
        self.syn && !self.ack
    }

    pub fn is_syn_ack(&self) -> bool {
        self.syn && self.ack
    }
}

impl std::fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::new();
        if self.syn { s.push('S'); }
        if self.ack { s.push('A'); }
        if self.fin { s.push('F'); }
        if self.rst { s.push('R'); }
        if self.psh { s.push('P'); }
        if self.urg { s.push('U'); }
        if s.is_empty() { s.push('.'); }
        write!(f, "{}", s)
    }
}

/// Ethernet frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetHeader {
    pub dst_mac: [u8; 6],
    pub src_mac: [u8; 6],
    pub ethertype: u16,
}

/// IPv4 header (fixed part)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Header {
    pub version_ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub identification: u16,
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    /// Source address, big-endian byte reading of the wire bytes
    pub src_ip: u32,
    /// Destination address, big-endian byte reading of the wire bytes
    pub dst_ip: u32,
}

impl Ipv4Header {
    pub fn version(&self) -> u8 {
        (self.version_ihl >> 4) & 0x0f
    }

    /// Header length in bytes (IHL * 4)
    pub fn header_len(&self) -> usize {
        ((self.version_ihl & 0x0f) as usize) * 4
    }
}

/// TCP header (fixed part)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Header length in 32-bit words
    pub data_offset: u8,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent_pointer: u16,
}

impl TcpHeader {
    /// Header length in bytes (data offset * 4)
    pub fn header_len(&self) -> usize {
        (self.data_offset as usize) * 4
    }
}

/// UDP header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
    pub checksum: u16,
}

/// A decoded frame: headers plus a payload slice into the capture buffer.
#[derive(Debug, Clone)]
pub struct ParsedPacket<'a> {
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    /// Monotonic packet id assigned by the decoder
    pub packet_id: u64,
    /// Captured frame length in bytes
    pub raw_length: u32,

    pub eth: EthernetHeader,
    pub ipv4: Ipv4Header,
    pub tcp: Option<TcpHeader>,
    pub udp: Option<UdpHeader>,

    /// Transport payload, borrowed from the capture buffer
    pub payload: &'a [u8],
}

impl<'a> ParsedPacket<'a> {
    pub fn is_tcp(&self) -> bool {
        self.tcp.is_some()
    }

    pub fn is_udp(&self) -> bool {
        self.udp.is_some()
    }

    pub fn protocol(&self) -> IpProtocol {
        IpProtocol::from(self.ipv4.protocol)
    }

    /// Protocol tag used in alert records
    pub fn protocol_name(&self) -> &'static str {
        if self.is_tcp() {
            "TCP"
        } else if self.is_udp() {
            "UDP"
        } else {
            "OTHER"
        }
    }

    /// Source port in host order (0 when no transport header)
    pub fn src_port(&self) -> u16 {
        if let Some(tcp) = &self.tcp {
            tcp.src_port
        } else if let Some(udp) = &self.udp {
            udp.src_port
        } else {
            0
        }
    }

    /// Destination port in host order (0 when no transport header)
    pub fn dst_port(&self) -> u16 {
        if let Some(tcp) = &self.tcp {
            tcp.dst_port
        } else if let Some(udp) = &self.udp {
            udp.dst_port
        } else {
            0
        }
    }

    /// TCP flag byte (low 6 bits), 0 for non-TCP packets
    pub fn tcp_flag_bits(&self) -> u8 {
        self.tcp.as_ref().map(|t| t.flags.to_u8()).unwrap_or(0)
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ipv4.src_ip)
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ipv4.dst_ip)
    }

    /// Dotted-quad source address
    pub fn src_ip_string(&self) -> String {
        self.src_addr().to_string()
    }

    /// Dotted-quad destination address
    pub fn dst_ip_string(&self) -> String {
        self.dst_addr().to_string()
    }
}
