//! Flow tracking engine
//!
//! Tracks bidirectional TCP/UDP flows keyed on the canonical 5-tuple,
//! runs the TCP state machine, and accumulates the per-flow statistics
//! the feature extractor projects into ML feature vectors.

pub mod stats;
pub mod table;

pub use stats::{ConnectionKey, ConnectionState, FlowStats};
pub use table::{FlowTable, TableStats};

use serde::{Deserialize, Serialize};

/// Configuration for flow tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Maximum concurrent flows
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Idle timeout in seconds, measured from last_seen
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Gap in seconds that terminates an active burst
    #[serde(default = "default_active_timeout")]
    pub active_timeout_secs: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            timeout_secs: default_timeout_secs(),
            active_timeout_secs: default_active_timeout(),
        }
    }
}

fn default_max_connections() -> usize {
    100_000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_active_timeout() -> f64 {
    1.0
}
