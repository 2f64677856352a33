//! Signature rule engine
//!
//! Declarative per-packet rules: protocol/IP/port filters, TCP flag
//! predicates, and payload content/regex patterns. Rules are supplied
//! programmatically and evaluated against every decoded packet.

pub mod alert;
pub mod engine;

pub use alert::Alert;
pub use engine::{RuleEngine, RuleEngineStats};

use serde::{Deserialize, Serialize};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low = 0,
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl Severity {
    /// Lowercase name used in JSON records
    pub fn as_json_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Action taken when a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Alert,
    Log,
    Drop,
}

impl Default for RuleAction {
    fn default() -> Self {
        RuleAction::Alert
    }
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::Alert => write!(f, "alert"),
            RuleAction::Log => write!(f, "log"),
            RuleAction::Drop => write!(f, "drop"),
        }
    }
}

/// Transport protocol a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleProtocol {
    Tcp,
    Udp,
    Any,
}

impl Default for RuleProtocol {
    fn default() -> Self {
        RuleProtocol::Any
    }
}

/// Declarative predicate bundle. Structurally immutable after load;
/// only `enabled` is toggled in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRule {
    pub rule_id: u32,
    pub name: String,
    pub description: String,

    #[serde(default)]
    pub protocol: RuleProtocol,

    /// Exact source IP as dotted quad, or "any"
    #[serde(default = "any_filter")]
    pub src_ip_filter: String,
    /// Exact destination IP as dotted quad, or "any"
    #[serde(default = "any_filter")]
    pub dst_ip_filter: String,

    /// Empty means any source port
    #[serde(default)]
    pub src_ports: Vec<u16>,
    /// Empty means any destination port
    #[serde(default)]
    pub dst_ports: Vec<u16>,

    /// Flag bits to examine; zero disables the flag predicate
    #[serde(default)]
    pub tcp_flags_mask: u8,
    /// Expected values under the mask
    #[serde(default)]
    pub tcp_flags_value: u8,

    /// Case-insensitive literal substrings; at least one must appear
    #[serde(default)]
    pub content_patterns: Vec<String>,
    /// Case-insensitive regexes; at least one must match
    #[serde(default)]
    pub regex_patterns: Vec<String>,

    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub action: RuleAction,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn any_filter() -> String {
    "any".to_string()
}

fn enabled_default() -> bool {
    true
}

impl SignatureRule {
    /// A permissive rule skeleton; callers fill in the predicates.
    pub fn new(rule_id: u32, name: &str, description: &str) -> Self {
        Self {
            rule_id,
            name: name.to_string(),
            description: description.to_string(),
            protocol: RuleProtocol::Any,
            src_ip_filter: any_filter(),
            dst_ip_filter: any_filter(),
            src_ports: Vec::new(),
            dst_ports: Vec::new(),
            tcp_flags_mask: 0,
            tcp_flags_value: 0,
            content_patterns: Vec::new(),
            regex_patterns: Vec::new(),
            severity: Severity::Medium,
            action: RuleAction::Alert,
            enabled: true,
        }
    }
}
