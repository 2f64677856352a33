//! ML feature vector
//!
//! Fixed-order numeric projection of a flow, CIC-IDS-2017 style. The CSV
//! header below is the contract with downstream consumers: field order in
//! this struct, `FEATURE_NAMES`, and `to_vector` must stay in lockstep.

use serde::{Deserialize, Serialize};

/// Number of features in the vector
pub const FEATURE_COUNT: usize = 76;

/// Column names, in emission order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "duration",
    "total_fwd_packets",
    "total_bwd_packets",
    "total_fwd_bytes",
    "total_bwd_bytes",
    "fwd_pkt_len_max",
    "fwd_pkt_len_min",
    "fwd_pkt_len_mean",
    "fwd_pkt_len_std",
    "bwd_pkt_len_max",
    "bwd_pkt_len_min",
    "bwd_pkt_len_mean",
    "bwd_pkt_len_std",
    "flow_bytes_per_sec",
    "flow_packets_per_sec",
    "flow_iat_mean",
    "flow_iat_std",
    "flow_iat_max",
    "flow_iat_min",
    "fwd_iat_total",
    "fwd_iat_mean",
    "fwd_iat_std",
    "fwd_iat_max",
    "fwd_iat_min",
    "bwd_iat_total",
    "bwd_iat_mean",
    "bwd_iat_std",
    "bwd_iat_max",
    "bwd_iat_min",
    "fwd_psh_flags",
    "bwd_psh_flags",
    "fwd_urg_flags",
    "bwd_urg_flags",
    "fwd_header_len",
    "bwd_header_len",
    "fwd_packets_per_sec",
    "bwd_packets_per_sec",
    "pkt_len_min",
    "pkt_len_max",
    "pkt_len_mean",
    "pkt_len_std",
    "pkt_len_variance",
    "fin_flag_count",
    "syn_flag_count",
    "rst_flag_count",
    "psh_flag_count",
    "ack_flag_count",
    "urg_flag_count",
    "cwe_flag_count",
    "ece_flag_count",
    "down_up_ratio",
    "avg_packet_size",
    "avg_fwd_segment_size",
    "avg_bwd_segment_size",
    "fwd_bulk_rate_avg",
    "fwd_bulk_size_avg",
    "fwd_bulk_packets_avg",
    "bwd_bulk_rate_avg",
    "bwd_bulk_size_avg",
    "bwd_bulk_packets_avg",
    "subflow_fwd_packets",
    "subflow_fwd_bytes",
    "subflow_bwd_packets",
    "subflow_bwd_bytes",
    "init_fwd_win_bytes",
    "init_bwd_win_bytes",
    "act_data_pkt_fwd",
    "min_seg_size_fwd",
    "active_mean",
    "active_std",
    "active_max",
    "active_min",
    "idle_mean",
    "idle_std",
    "idle_max",
    "idle_min",
];

/// One flow projected into the fixed feature order.
///
/// Field declaration order matches `FEATURE_NAMES`, so the JSON rendering
/// (serde) and the CSV row agree column for column.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub duration: f64,
    pub total_fwd_packets: f64,
    pub total_bwd_packets: f64,
    pub total_fwd_bytes: f64,
    pub total_bwd_bytes: f64,
    pub fwd_pkt_len_max: f64,
    pub fwd_pkt_len_min: f64,
    pub fwd_pkt_len_mean: f64,
    pub fwd_pkt_len_std: f64,
    pub bwd_pkt_len_max: f64,
    pub bwd_pkt_len_min: f64,
    pub bwd_pkt_len_mean: f64,
    pub bwd_pkt_len_std: f64,
    pub flow_bytes_per_sec: f64,
    pub flow_packets_per_sec: f64,
    pub flow_iat_mean: f64,
    pub flow_iat_std: f64,
    pub flow_iat_max: f64,
    pub flow_iat_min: f64,
    pub fwd_iat_total: f64,
    pub fwd_iat_mean: f64,
    pub fwd_iat_std: f64,
    pub fwd_iat_max: f64,
    pub fwd_iat_min: f64,
    pub bwd_iat_total: f64,
    pub bwd_iat_mean: f64,
    pub bwd_iat_std: f64,
    pub bwd_iat_max: f64,
    pub bwd_iat_min: f64,
    pub fwd_psh_flags: f64,
    pub bwd_psh_flags: f64,
    pub fwd_urg_flags: f64,
    pub bwd_urg_flags: f64,
    pub fwd_header_len: f64,
    pub bwd_header_len: f64,
    pub fwd_packets_per_sec: f64,
    pub bwd_packets_per_sec: f64,
    pub pkt_len_min: f64,
    pub pkt_len_max: f64,
    pub pkt_len_mean: f64,
    pub pkt_len_std: f64,
    pub pkt_len_variance: f64,
    pub fin_flag_count: f64,
    pub syn_flag_count: f64,
    pub rst_flag_count: f64,
    pub psh_flag_count: f64,
    pub ack_flag_count: f64,
    pub urg_flag_count: f64,
    pub cwe_flag_count: f64,
    pub ece_flag_count: f64,
    pub down_up_ratio: f64,
    pub avg_packet_size: f64,
    pub avg_fwd_segment_size: f64,
    pub avg_bwd_segment_size: f64,
    pub fwd_bulk_rate_avg: f64,
    pub fwd_bulk_size_avg: f64,
    pub fwd_bulk_packets_avg: f64,
    pub bwd_bulk_rate_avg: f64,
    pub bwd_bulk_size_avg: f64,
    pub bwd_bulk_packets_avg: f64,
    pub subflow_fwd_packets: f64,
    pub subflow_fwd_bytes: f64,
    pub subflow_bwd_packets: f64,
    pub subflow_bwd_bytes: f64,
    pub init_fwd_win_bytes: f64,
    pub init_bwd_win_bytes: f64,
    pub act_data_pkt_fwd: f64,
    pub min_seg_size_fwd: f64,
    pub active_mean: f64,
    pub active_std: f64,
    pub active_max: f64,
    pub active_min: f64,
    pub idle_mean: f64,
    pub idle_std: f64,
    pub idle_max: f64,
    pub idle_min: f64,
}

/// CSV header row (the downstream contract)
pub fn csv_header() -> String {
    FEATURE_NAMES.join(",")
}

impl FeatureVector {
    /// Native vector rendering, in column order
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.duration,
            self.total_fwd_packets,
            self.total_bwd_packets,
            self.total_fwd_bytes,
            self.total_bwd_bytes,
            self.fwd_pkt_len_max,
            self.fwd_pkt_len_min,
            self.fwd_pkt_len_mean,
            self.fwd_pkt_len_std,
            self.bwd_pkt_len_max,
            self.bwd_pkt_len_min,
            self.bwd_pkt_len_mean,
            self.bwd_pkt_len_std,
            self.flow_bytes_per_sec,
            self.flow_packets_per_sec,
            self.flow_iat_mean,
            self.flow_iat_std,
            self.flow_iat_max,
            self.flow_iat_min,
            self.fwd_iat_total,
            self.fwd_iat_mean,
            self.fwd_iat_std,
            self.fwd_iat_max,
            self.fwd_iat_min,
            self.bwd_iat_total,
            self.bwd_iat_mean,
            self.bwd_iat_std,
            self.bwd_iat_max,
            self.bwd_iat_min,
            self.fwd_psh_flags,
            self.bwd_psh_flags,
            self.fwd_urg_flags,
            self.bwd_urg_flags,
            self.fwd_header_len,
            self.bwd_header_len,
            self.fwd_packets_per_sec,
            self.bwd_packets_per_sec,
            self.pkt_len_min,
            self.pkt_len_max,
            self.pkt_len_mean,
            self.pkt_len_std,
            self.pkt_len_variance,
            self.fin_flag_count,
            self.syn_flag_count,
            self.rst_flag_count,
            self.psh_flag_count,
            self.ack_flag_count,
            self.urg_flag_count,
            self.cwe_flag_count,
            self.ece_flag_count,
            self.down_up_ratio,
            self.avg_packet_size,
            self.avg_fwd_segment_size,
            self.avg_bwd_segment_size,
            self.fwd_bulk_rate_avg,
            self.fwd_bulk_size_avg,
            self.fwd_bulk_packets_avg,
            self.bwd_bulk_rate_avg,
            self.bwd_bulk_size_avg,
            self.bwd_bulk_packets_avg,
            self.subflow_fwd_packets,
            self.subflow_fwd_bytes,
            self.subflow_bwd_packets,
            self.subflow_bwd_bytes,
            self.init_fwd_win_bytes,
            self.init_bwd_win_bytes,
            self.act_data_pkt_fwd,
            self.min_seg_size_fwd,
            self.active_mean,
            self.active_std,
            self.active_max,
            self.active_min,
            self.idle_mean,
            self.idle_std,
            self.idle_max,
            self.idle_min,
        ]
    }

    /// CSV row, fixed-point with 6 fractional digits
    pub fn to_csv_row(&self) -> String {
        let values = self.to_vector();
        let mut row = String::with_capacity(values.len() * 10);
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                row.push(',');
            }
            row.push_str(&format!("{:.6}", v));
        }
        row
    }

    /// JSON object keyed by the CSV column names, numeric values only
    pub fn to_json(&self) -> String {
        // Field order matches FEATURE_NAMES, serde preserves it
        serde_json::to_string(self).expect("serialize feature vector")
    }
}
