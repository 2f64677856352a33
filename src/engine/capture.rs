//! Packet capture sources
//!
//! The pipeline consumes raw frames through the `CaptureSource` trait and
//! is agnostic to their origin. Implementations: pcap file replay, live
//! interface capture, and an in-memory source for tests.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One captured frame
#[derive(Debug)]
pub struct Frame<'a> {
    /// Raw frame bytes starting at the Ethernet header
    pub data: &'a [u8],
    /// Captured length
    pub caplen: u32,
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Interface name for live capture
    pub interface: Option<String>,
    /// PCAP file for offline replay (takes precedence over interface)
    pub pcap_file: Option<PathBuf>,
    /// Snapshot length
    #[serde(default = "default_snaplen")]
    pub snaplen: i32,
    /// Enable promiscuous mode
    #[serde(default = "default_promiscuous")]
    pub promiscuous: bool,
    /// Live read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            pcap_file: None,
            snaplen: default_snaplen(),
            promiscuous: default_promiscuous(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_snaplen() -> i32 {
    65535
}

fn default_promiscuous() -> bool {
    true
}

fn default_timeout_ms() -> i32 {
    100
}

/// A stream of raw frames.
///
/// `next_frame` returns `Ok(None)` when nothing is available right now
/// (live read timeout); `is_exhausted` reports a finished offline source.
pub trait CaptureSource {
    fn next_frame(&mut self) -> Result<Option<Frame<'_>>>;

    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Build a capture source from configuration. A configured pcap file
/// wins over a live interface.
pub fn create_source(config: &CaptureConfig) -> Result<Box<dyn CaptureSource>> {
    if let Some(path) = &config.pcap_file {
        return Ok(Box::new(PcapFileSource::open(path)?));
    }
    if let Some(interface) = &config.interface {
        return Ok(Box::new(PcapLiveSource::open(interface, config)?));
    }
    anyhow::bail!("capture requires either a pcap file or an interface")
}

fn timestamp_of(header: &pcap::PacketHeader) -> DateTime<Utc> {
    DateTime::from_timestamp(header.ts.tv_sec as i64, (header.ts.tv_usec as u32) * 1000)
        .unwrap_or_else(Utc::now)
}

/// Offline pcap file replay
pub struct PcapFileSource {
    capture: pcap::Capture<pcap::Offline>,
    exhausted: bool,
}

impl PcapFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let capture = pcap::Capture::from_file(&path)
            .with_context(|| format!("failed to open pcap file {}", path.as_ref().display()))?;
        info!(file = %path.as_ref().display(), "replaying pcap file");
        Ok(Self { capture, exhausted: false })
    }
}

impl CaptureSource for PcapFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame<'_>>> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Some(Frame {
                data: packet.data,
                caplen: packet.header.caplen,
                timestamp: timestamp_of(packet.header),
            })),
            Err(pcap::Error::NoMorePackets) => {
                self.exhausted = true;
                Ok(None)
            }
            Err(e) => Err(e).context("pcap file read failed"),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

/// Live interface capture
pub struct PcapLiveSource {
    capture: pcap::Capture<pcap::Active>,
}

impl PcapLiveSource {
    pub fn open(interface: &str, config: &CaptureConfig) -> Result<Self> {
        let capture = pcap::Capture::from_device(interface)
            .with_context(|| format!("unknown capture device {}", interface))?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .timeout(config.timeout_ms)
            .open()
            .with_context(|| format!("failed to open capture on {}", interface))?;
        info!(interface, "live capture started");
        Ok(Self { capture })
    }
}

impl CaptureSource for PcapLiveSource {
    fn next_frame(&mut self) -> Result<Option<Frame<'_>>> {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Some(Frame {
                data: packet.data,
                caplen: packet.header.caplen,
                timestamp: timestamp_of(packet.header),
            })),
            // Read timeout: nothing right now, caller polls again
            Err(pcap::Error::TimeoutExpired) => Ok(None),
            Err(e) => Err(e).context("live capture read failed"),
        }
    }
}

/// In-memory frame source for tests and replays
pub struct StaticSource {
    frames: Vec<(Vec<u8>, DateTime<Utc>)>,
    position: usize,
}

impl StaticSource {
    pub fn new(frames: Vec<(Vec<u8>, DateTime<Utc>)>) -> Self {
        Self { frames, position: 0 }
    }
}

impl CaptureSource for StaticSource {
    fn next_frame(&mut self) -> Result<Option<Frame<'_>>> {
        match self.frames.get(self.position) {
            Some((data, timestamp)) => {
                self.position += 1;
                Ok(Some(Frame {
                    data,
                    caplen: data.len() as u32,
                    timestamp: *timestamp,
                }))
            }
            None => Ok(None),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.position >= self.frames.len()
    }
}
