//! Per-flow state and statistics
//!
//! `FlowStats` is the aggregate entity owned by the flow table: running
//! counters, per-direction samples, TCP state, and lazily computed
//! derived rates. Flows are keyed on the canonical 5-tuple; a packet is
//! "forward" when its source endpoint is the flow initiator.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::packet::{ParsedPacket, TcpFlags};

/// Directional 5-tuple identifying a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub src_ip: u32,
    pub dst_ip: u32,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
}

impl ConnectionKey {
    pub fn from_packet(pkt: &ParsedPacket<'_>) -> Self {
        Self {
            src_ip: pkt.ipv4.src_ip,
            dst_ip: pkt.ipv4.dst_ip,
            src_port: pkt.src_port(),
            dst_port: pkt.dst_port(),
            protocol: pkt.ipv4.protocol,
        }
    }

    /// Endpoint-ordered folding: the numerically smaller (ip, port) pair
    /// comes first, so both directions of a conversation share one key.
    pub fn canonical(&self) -> Self {
        if (self.src_ip, self.src_port) <= (self.dst_ip, self.dst_port) {
            *self
        } else {
            Self {
                src_ip: self.dst_ip,
                dst_ip: self.src_ip,
                src_port: self.dst_port,
                dst_port: self.src_port,
                protocol: self.protocol,
            }
        }
    }
}

/// TCP connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Unknown,
    SynSent,
    SynReceived,
    Established,
    FinWait,
    Closed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Unknown
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Unknown => write!(f, "UNKNOWN"),
            ConnectionState::SynSent => write!(f, "SYN_SENT"),
            ConnectionState::SynReceived => write!(f, "SYN_RECEIVED"),
            ConnectionState::Established => write!(f, "ESTABLISHED"),
            ConnectionState::FinWait => write!(f, "FIN_WAIT"),
            ConnectionState::Closed => write!(f, "CLOSED"),
        }
    }
}

fn secs_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    let delta = later.signed_duration_since(earlier);
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// Running statistics for one flow
#[derive(Debug, Clone, Serialize)]
pub struct FlowStats {
    // Endpoints; the initiator is the source of the first observed packet
    pub initiator_ip: u32,
    pub initiator_port: u16,
    pub responder_ip: u32,
    pub responder_port: u16,
    pub protocol: u8,

    pub state: ConnectionState,

    // Timing
    pub start_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Seconds from start_time to last_seen
    pub duration: f64,

    // Forward direction (initiator -> responder)
    pub fwd_packets: u64,
    pub fwd_bytes: u64,
    pub fwd_iat: Vec<f64>,
    pub fwd_pkt_lengths: Vec<u32>,
    fwd_last_time: Option<DateTime<Utc>>,

    // Backward direction (responder -> initiator)
    pub bwd_packets: u64,
    pub bwd_bytes: u64,
    pub bwd_iat: Vec<f64>,
    pub bwd_pkt_lengths: Vec<u32>,
    bwd_last_time: Option<DateTime<Utc>>,

    /// Gap to the previous packet in either direction
    pub flow_iat: Vec<f64>,

    // TCP flag tallies
    pub syn_count: u32,
    pub ack_count: u32,
    pub fin_count: u32,
    pub rst_count: u32,
    pub psh_count: u32,
    pub urg_count: u32,
    pub fwd_psh_count: u32,
    pub bwd_psh_count: u32,
    pub fwd_urg_count: u32,
    pub bwd_urg_count: u32,

    // Header byte totals (Ethernet + IP + transport headers)
    pub fwd_header_bytes: u64,
    pub bwd_header_bytes: u64,

    // First TCP window seen in each direction
    pub init_fwd_win: Option<u16>,
    pub init_bwd_win: Option<u16>,

    /// Forward packets carrying transport payload
    pub fwd_data_packets: u64,

    // Active/idle burst samples
    pub active_times: Vec<f64>,
    pub idle_times: Vec<f64>,
    active_start: DateTime<Utc>,

    // Derived, recomputed on read
    pub fwd_packet_rate: f64,
    pub bwd_packet_rate: f64,
    pub fwd_iat_mean: f64,
    pub fwd_iat_std: f64,
    pub bwd_iat_mean: f64,
    pub bwd_iat_std: f64,
    pub fwd_pkt_len_mean: f64,
    pub fwd_pkt_len_std: f64,
    pub bwd_pkt_len_mean: f64,
    pub bwd_pkt_len_std: f64,
}

impl FlowStats {
    /// Create an empty flow from its first packet. The packet's own
    /// contribution is added by `apply`, not here.
    pub fn new(pkt: &ParsedPacket<'_>) -> Self {
        Self {
            initiator_ip: pkt.ipv4.src_ip,
            initiator_port: pkt.src_port(),
            responder_ip: pkt.ipv4.dst_ip,
            responder_port: pkt.dst_port(),
            protocol: pkt.ipv4.protocol,
            state: ConnectionState::Unknown,
            start_time: pkt.timestamp,
            last_seen: pkt.timestamp,
            duration: 0.0,
            fwd_packets: 0,
            fwd_bytes: 0,
            fwd_iat: Vec::new(),
            fwd_pkt_lengths: Vec::new(),
            fwd_last_time: None,
            bwd_packets: 0,
            bwd_bytes: 0,
            bwd_iat: Vec::new(),
            bwd_pkt_lengths: Vec::new(),
            bwd_last_time: None,
            flow_iat: Vec::new(),
            syn_count: 0,
            ack_count: 0,
            fin_count: 0,
            rst_count: 0,
            psh_count: 0,
            urg_count: 0,
            fwd_psh_count: 0,
            bwd_psh_count: 0,
            fwd_urg_count: 0,
            bwd_urg_count: 0,
            fwd_header_bytes: 0,
            bwd_header_bytes: 0,
            init_fwd_win: None,
            init_bwd_win: None,
            fwd_data_packets: 0,
            active_times: Vec::new(),
            idle_times: Vec::new(),
            active_start: pkt.timestamp,
            fwd_packet_rate: 0.0,
            bwd_packet_rate: 0.0,
            fwd_iat_mean: 0.0,
            fwd_iat_std: 0.0,
            bwd_iat_mean: 0.0,
            bwd_iat_std: 0.0,
            fwd_pkt_len_mean: 0.0,
            fwd_pkt_len_std: 0.0,
            bwd_pkt_len_mean: 0.0,
            bwd_pkt_len_std: 0.0,
        }
    }

    /// True when the packet travels initiator -> responder
    pub fn is_forward(&self, pkt: &ParsedPacket<'_>) -> bool {
        pkt.ipv4.src_ip == self.initiator_ip && pkt.src_port() == self.initiator_port
    }

    pub fn total_packets(&self) -> u64 {
        self.fwd_packets + self.bwd_packets
    }

    pub fn total_bytes(&self) -> u64 {
        self.fwd_bytes + self.bwd_bytes
    }

    /// Incorporate one packet into the running aggregates.
    ///
    /// `active_timeout` is the gap in seconds that closes an active burst.
    pub fn apply(&mut self, pkt: &ParsedPacket<'_>, active_timeout: f64) {
        let now = pkt.timestamp;
        let is_forward = self.is_forward(pkt);

        // Flow-level IAT and active/idle bookkeeping, first packet excluded
        if self.total_packets() > 0 {
            let gap = secs_between(now, self.last_seen);
            self.flow_iat.push(gap);

            if gap > active_timeout {
                let burst = secs_between(self.last_seen, self.active_start);
                if burst > 0.0 {
                    self.active_times.push(burst);
                }
                self.idle_times.push(gap);
                self.active_start = now;
            }
        }

        let header_bytes = self.header_bytes_of(pkt);

        if is_forward {
            if let Some(last) = self.fwd_last_time {
                self.fwd_iat.push(secs_between(now, last));
            }
            self.fwd_last_time = Some(now);
            self.fwd_packets += 1;
            self.fwd_bytes += pkt.raw_length as u64;
            self.fwd_pkt_lengths.push(pkt.raw_length);
            self.fwd_header_bytes += header_bytes;
            if !pkt.payload.is_empty() {
                self.fwd_data_packets += 1;
            }
        } else {
            if let Some(last) = self.bwd_last_time {
                self.bwd_iat.push(secs_between(now, last));
            }
            self.bwd_last_time = Some(now);
            self.bwd_packets += 1;
            self.bwd_bytes += pkt.raw_length as u64;
            self.bwd_pkt_lengths.push(pkt.raw_length);
            self.bwd_header_bytes += header_bytes;
        }

        if let Some(tcp) = &pkt.tcp {
            let flags = tcp.flags;
            if flags.syn { self.syn_count += 1; }
            if flags.ack { self.ack_count += 1; }
            if flags.fin { self.fin_count += 1; }
            if flags.rst { self.rst_count += 1; }
            if flags.psh {
                self.psh_count += 1;
                if is_forward { self.fwd_psh_count += 1; } else { self.bwd_psh_count += 1; }
            }
            if flags.urg {
                self.urg_count += 1;
                if is_forward { self.fwd_urg_count += 1; } else { self.bwd_urg_count += 1; }
            }

            if is_forward {
                if self.init_fwd_win.is_none() {
                    self.init_fwd_win = Some(tcp.window);
                }
            } else if self.init_bwd_win.is_none() {
                self.init_bwd_win = Some(tcp.window);
            }

            self.update_tcp_state(flags);
        }

        self.last_seen = now;
        self.duration = secs_between(self.last_seen, self.start_time);
    }

    fn header_bytes_of(&self, pkt: &ParsedPacket<'_>) -> u64 {
        let transport = if let Some(tcp) = &pkt.tcp {
            tcp.header_len()
        } else if pkt.udp.is_some() {
            8
        } else {
            0
        };
        (14 + pkt.ipv4.header_len() + transport) as u64
    }

    fn update_tcp_state(&mut self, flags: TcpFlags) {
        self.state = match self.state {
            ConnectionState::Unknown if flags.syn && !flags.ack => ConnectionState::SynSent,
            ConnectionState::SynSent if flags.syn && flags.ack => ConnectionState::SynReceived,
            ConnectionState::SynReceived if flags.ack => ConnectionState::Established,
            ConnectionState::Established if flags.fin => ConnectionState::FinWait,
            ConnectionState::Established if flags.rst => ConnectionState::Closed,
            ConnectionState::FinWait if flags.fin || flags.rst => ConnectionState::Closed,
            other => other,
        };
    }

    /// Recompute the lazily derived rate and distribution fields.
    pub fn update_derived(&mut self) {
        if self.duration > 0.0 {
            self.fwd_packet_rate = self.fwd_packets as f64 / self.duration;
            self.bwd_packet_rate = self.bwd_packets as f64 / self.duration;
        } else {
            self.fwd_packet_rate = 0.0;
            self.bwd_packet_rate = 0.0;
        }

        (self.fwd_iat_mean, self.fwd_iat_std) = mean_sample_std(&self.fwd_iat);
        (self.bwd_iat_mean, self.bwd_iat_std) = mean_sample_std(&self.bwd_iat);

        let fwd_lens: Vec<f64> = self.fwd_pkt_lengths.iter().map(|&v| v as f64).collect();
        let bwd_lens: Vec<f64> = self.bwd_pkt_lengths.iter().map(|&v| v as f64).collect();
        (self.fwd_pkt_len_mean, self.fwd_pkt_len_std) = mean_sample_std(&fwd_lens);
        (self.bwd_pkt_len_mean, self.bwd_pkt_len_std) = mean_sample_std(&bwd_lens);
    }

    /// Seconds since the last packet
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        secs_between(now, self.last_seen)
    }

    /// Expired when idle past the timeout or the connection closed
    pub fn is_expired(&self, now: DateTime<Utc>, timeout_secs: u64) -> bool {
        self.age_secs(now) > timeout_secs as f64 || self.state == ConnectionState::Closed
    }
}

/// Mean and sample standard deviation (divisor N-1; 0 when N < 2)
fn mean_sample_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (mean, (sum_sq / (values.len() - 1) as f64).sqrt())
}
