//! Core packet types and the frame decoder

pub mod decoder;
pub mod packet;

pub use decoder::{PacketDecoder, ParseError};
pub use packet::{
    EthernetHeader, IpProtocol, Ipv4Header, ParsedPacket, TcpFlags, TcpHeader, UdpHeader,
};
