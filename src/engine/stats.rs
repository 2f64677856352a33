//! Runtime statistics
//!
//! Atomic counters updated on the hot path and read from the reporter
//! thread. The summary line is the periodic one-line digest; `render`
//! is the end-of-run block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::rules::Severity;

/// Shared counter block
#[derive(Debug)]
pub struct Statistics {
    start: Instant,

    pub total_packets: AtomicU64,
    pub total_bytes: AtomicU64,
    pub tcp_packets: AtomicU64,
    pub udp_packets: AtomicU64,
    pub icmp_packets: AtomicU64,
    pub other_packets: AtomicU64,

    pub parse_errors: AtomicU64,
    pub flows_rejected: AtomicU64,
    pub rule_errors: AtomicU64,
    pub sink_errors: AtomicU64,
    pub publish_errors: AtomicU64,
    pub capture_errors: AtomicU64,

    pub alerts_generated: AtomicU64,
    alerts_by_severity: [AtomicU64; 4],
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            total_packets: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            tcp_packets: AtomicU64::new(0),
            udp_packets: AtomicU64::new(0),
            icmp_packets: AtomicU64::new(0),
            other_packets: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            flows_rejected: AtomicU64::new(0),
            rule_errors: AtomicU64::new(0),
            sink_errors: AtomicU64::new(0),
            publish_errors: AtomicU64::new(0),
            capture_errors: AtomicU64::new(0),
            alerts_generated: AtomicU64::new(0),
            alerts_by_severity: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
        }
    }

    pub fn record_packet(&self, ip_protocol: u8, bytes: u64) {
        self.total_packets.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        let counter = match ip_protocol {
            6 => &self.tcp_packets,
            17 => &self.udp_packets,
            1 => &self.icmp_packets,
            _ => &self.other_packets,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self, severity: Severity) {
        self.alerts_generated.fetch_add(1, Ordering::Relaxed);
        self.alerts_by_severity[severity as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_error(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capture_error(&self) {
        self.capture_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flow_rejected(&self) {
        self.flows_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rule_errors(&self, count: u64) {
        self.rule_errors.fetch_add(count, Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Consistent point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.elapsed().as_secs_f64();
        let total_packets = self.total_packets.load(Ordering::Relaxed);
        let total_bytes = self.total_bytes.load(Ordering::Relaxed);

        let (packets_per_second, mbits_per_second) = if elapsed > 0.0 {
            (
                total_packets as f64 / elapsed,
                (total_bytes as f64 * 8.0) / (elapsed * 1_000_000.0),
            )
        } else {
            (0.0, 0.0)
        };

        StatsSnapshot {
            total_packets,
            total_bytes,
            tcp_packets: self.tcp_packets.load(Ordering::Relaxed),
            udp_packets: self.udp_packets.load(Ordering::Relaxed),
            icmp_packets: self.icmp_packets.load(Ordering::Relaxed),
            other_packets: self.other_packets.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            flows_rejected: self.flows_rejected.load(Ordering::Relaxed),
            rule_errors: self.rule_errors.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            capture_errors: self.capture_errors.load(Ordering::Relaxed),
            alerts_generated: self.alerts_generated.load(Ordering::Relaxed),
            alerts_low: self.alerts_by_severity[0].load(Ordering::Relaxed),
            alerts_medium: self.alerts_by_severity[1].load(Ordering::Relaxed),
            alerts_high: self.alerts_by_severity[2].load(Ordering::Relaxed),
            alerts_critical: self.alerts_by_severity[3].load(Ordering::Relaxed),
            packets_per_second,
            mbits_per_second,
        }
    }

    /// Periodic one-line digest
    pub fn summary_line(&self) -> String {
        self.snapshot().summary_line()
    }
}

/// Point-in-time counter values
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub tcp_packets: u64,
    pub udp_packets: u64,
    pub icmp_packets: u64,
    pub other_packets: u64,
    pub parse_errors: u64,
    pub flows_rejected: u64,
    pub rule_errors: u64,
    pub sink_errors: u64,
    pub publish_errors: u64,
    pub capture_errors: u64,
    pub alerts_generated: u64,
    pub alerts_low: u64,
    pub alerts_medium: u64,
    pub alerts_high: u64,
    pub alerts_critical: u64,
    pub packets_per_second: f64,
    pub mbits_per_second: f64,
}

impl StatsSnapshot {
    pub fn summary_line(&self) -> String {
        format!(
            "packets={} tcp={} udp={} icmp={} other={} pps={:.2} mbps={:.2} \
             alerts low={} medium={} high={} critical={}",
            self.total_packets,
            self.tcp_packets,
            self.udp_packets,
            self.icmp_packets,
            self.other_packets,
            self.packets_per_second,
            self.mbits_per_second,
            self.alerts_low,
            self.alerts_medium,
            self.alerts_high,
            self.alerts_critical,
        )
    }

    /// End-of-run summary block
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("\n========================================\n");
        out.push_str("  flowsentry statistics\n");
        out.push_str("========================================\n");
        out.push_str(&format!("Total packets:    {}\n", self.total_packets));
        out.push_str(&format!(
            "Total bytes:      {} ({:.2} MB)\n",
            self.total_bytes,
            self.total_bytes as f64 / 1024.0 / 1024.0
        ));
        out.push_str("\nBy protocol:\n");
        out.push_str(&format!("  TCP:            {}\n", self.tcp_packets));
        out.push_str(&format!("  UDP:            {}\n", self.udp_packets));
        out.push_str(&format!("  ICMP:           {}\n", self.icmp_packets));
        out.push_str(&format!("  Other:          {}\n", self.other_packets));
        out.push_str("\nPerformance:\n");
        out.push_str(&format!("  Packets/sec:    {:.2}\n", self.packets_per_second));
        out.push_str(&format!("  Throughput:     {:.2} Mbps\n", self.mbits_per_second));
        out.push_str("\nErrors:\n");
        out.push_str(&format!("  Parse errors:   {}\n", self.parse_errors));
        out.push_str(&format!("  Flows rejected: {}\n", self.flows_rejected));
        out.push_str(&format!("  Rule errors:    {}\n", self.rule_errors));
        out.push_str("\nAlerts:\n");
        out.push_str(&format!("  Total:          {}\n", self.alerts_generated));
        out.push_str(&format!("  Low:            {}\n", self.alerts_low));
        out.push_str(&format!("  Medium:         {}\n", self.alerts_medium));
        out.push_str(&format!("  High:           {}\n", self.alerts_high));
        out.push_str(&format!("  Critical:       {}\n", self.alerts_critical));
        out.push_str("========================================\n");
        out
    }
}

/// Spawn the background reporter emitting the summary line every
/// `interval` until `stop` is raised.
pub fn spawn_reporter(
    stats: Arc<Statistics>,
    interval: Duration,
    stop: Arc<std::sync::atomic::AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut last = Instant::now();
        while !stop.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(50));
            if last.elapsed() >= interval {
                info!("{}", stats.summary_line());
                last = Instant::now();
            }
        }
    })
}
