//! flowsentry - flow-tracking network intrusion detection sensor
//!
//! Consumes Ethernet frames from a pcap file or live interface,
//! reconstructs bidirectional transport flows, computes CIC-IDS-2017
//! style per-flow feature vectors for downstream ML classifiers, and
//! evaluates every packet against a set of declarative signature rules.
//!
//! Pipeline stages, leaves first:
//!
//! 1. [`core::PacketDecoder`] - zero-copy Ethernet/IPv4/TCP/UDP decoding
//! 2. [`flow::FlowTable`] - bounded 5-tuple connection tracking
//! 3. [`features::FeatureExtractor`] - flow statistics to feature vectors
//! 4. [`rules::RuleEngine`] - indexed signature matching and alerting
//! 5. [`engine::Pipeline`] - orchestration, sinks and statistics

pub mod config;
pub mod core;
pub mod engine;
pub mod features;
pub mod flow;
pub mod output;
pub mod rules;

pub use config::Config;
pub use core::{PacketDecoder, ParseError, ParsedPacket};
pub use engine::{Pipeline, Statistics};
pub use features::{FeatureExtractor, FeatureVector};
pub use flow::{ConnectionKey, ConnectionState, FlowConfig, FlowStats, FlowTable};
pub use rules::{Alert, RuleEngine, Severity, SignatureRule};
