//! Alert records
//!
//! Immutable once emitted. The JSONL rendering is the external log
//! contract; the text rendering is for console output.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use super::Severity;

/// One rule match against one packet
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    /// Ascending, unique per engine run
    pub alert_id: u64,
    /// Timestamp of the triggering packet
    pub timestamp: DateTime<Utc>,

    pub rule_id: u32,
    pub rule_name: String,
    pub severity: Severity,

    pub packet_id: u64,
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    /// "TCP", "UDP" or "OTHER"
    pub protocol: String,

    pub description: String,
    /// First content pattern that matched, when content was the discriminator
    pub matched_content: String,
}

impl Alert {
    /// One-line JSON record for the alert log (JSONL)
    pub fn to_json_line(&self) -> String {
        json!({
            "alert_id": self.alert_id,
            "timestamp": self.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "rule_id": self.rule_id,
            "rule_name": self.rule_name,
            "severity": self.severity.as_json_str(),
            "src_ip": self.src_ip,
            "src_port": self.src_port,
            "dst_ip": self.dst_ip,
            "dst_port": self.dst_port,
            "protocol": self.protocol,
            "description": self.description,
        })
        .to_string()
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "[{}] [{}] {} (Rule ID: {})",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.severity,
            self.rule_name,
            self.rule_id
        )?;
        writeln!(
            f,
            "  {}:{} -> {}:{} [{}]",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.protocol
        )?;
        write!(f, "  {}", self.description)?;
        if !self.matched_content.is_empty() {
            write!(f, "\n  Matched: {}", self.matched_content)?;
        }
        Ok(())
    }
}
