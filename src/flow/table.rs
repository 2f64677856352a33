//! Bounded flow table
//!
//! Maps canonical 5-tuple keys to `FlowStats` and incorporates each
//! arriving packet. Admission control keeps the table at or below
//! `max_connections`: when full it first expires aged entries, then
//! silently rejects the new flow (the packet still reaches the rule
//! engine, flow tracking is best-effort).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::packet::ParsedPacket;

use super::stats::{ConnectionKey, FlowStats};
use super::FlowConfig;

/// Table statistics
#[derive(Debug, Clone, Default)]
pub struct TableStats {
    pub flows_created: u64,
    pub flows_expired: u64,
    pub flows_rejected: u64,
    pub lookups: u64,
    pub hits: u64,
}

/// 5-tuple keyed connection tracker
pub struct FlowTable {
    flows: HashMap<ConnectionKey, FlowStats>,
    config: FlowConfig,
    pub stats: TableStats,
}

impl FlowTable {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            flows: HashMap::with_capacity(config.max_connections.min(100_000)),
            config,
            stats: TableStats::default(),
        }
    }

    /// Locate or create the packet's flow and fold the packet into its
    /// aggregates. Rejected admissions are silent.
    pub fn update(&mut self, pkt: &ParsedPacket<'_>) {
        let key = ConnectionKey::from_packet(pkt).canonical();

        if !self.flows.contains_key(&key) {
            if self.flows.len() >= self.config.max_connections {
                self.expire_old(pkt.timestamp);
            }
            if self.flows.len() >= self.config.max_connections {
                self.stats.flows_rejected += 1;
                return;
            }
            self.flows.insert(key, FlowStats::new(pkt));
            self.stats.flows_created += 1;
        }

        let flow = self.flows.get_mut(&key).unwrap();
        flow.apply(pkt, self.config.active_timeout_secs);
    }

    /// Read view of the packet's flow with derived fields refreshed
    pub fn get(&mut self, pkt: &ParsedPacket<'_>) -> Option<&FlowStats> {
        self.stats.lookups += 1;
        let key = ConnectionKey::from_packet(pkt).canonical();
        match self.flows.get_mut(&key) {
            Some(flow) => {
                self.stats.hits += 1;
                flow.update_derived();
                Some(flow)
            }
            None => None,
        }
    }

    /// Remove flows idle past the timeout or in CLOSED state.
    /// Returns the number of entries removed.
    pub fn expire_old(&mut self, now: DateTime<Utc>) -> usize {
        let timeout = self.config.timeout_secs;
        let before = self.flows.len();
        self.flows.retain(|_, flow| !flow.is_expired(now, timeout));
        let removed = before - self.flows.len();
        if removed > 0 {
            self.stats.flows_expired += removed as u64;
            debug!(removed, remaining = self.flows.len(), "expired flows");
        }
        removed
    }

    /// Stable copy of all flows with derived fields refreshed
    pub fn snapshot(&mut self) -> Vec<FlowStats> {
        let mut flows = Vec::with_capacity(self.flows.len());
        for flow in self.flows.values_mut() {
            flow.update_derived();
            flows.push(flow.clone());
        }
        flows
    }

    pub fn clear(&mut self) {
        self.flows.clear();
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowStats> {
        self.flows.values()
    }
}
