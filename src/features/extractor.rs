//! Flow feature extraction
//!
//! Projects a `FlowStats` snapshot into the fixed feature order. Pure:
//! equal inputs yield identical vectors, CSV rows, and JSON objects.

use crate::flow::FlowStats;

use super::vector::FeatureVector;

/// Minimum forward/backward packets for the bulk-transfer approximation
const BULK_THRESHOLD: f64 = 4.0;

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divisor N; 0 when N < 2).
/// The downstream CSV format uses this convention, not Bessel's correction.
fn pop_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sum_sq / values.len() as f64).sqrt()
}

fn min_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().copied().fold(f64::INFINITY, f64::min)
    }
}

fn max_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Stateless projection of flows into feature vectors
#[derive(Debug, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the feature vector from a flow at this instant.
    pub fn extract(&self, flow: &FlowStats) -> FeatureVector {
        let fwd_lens: Vec<f64> = flow.fwd_pkt_lengths.iter().map(|&v| v as f64).collect();
        let bwd_lens: Vec<f64> = flow.bwd_pkt_lengths.iter().map(|&v| v as f64).collect();

        // Packet-length stats over forward then backward samples
        let mut all_lens = Vec::with_capacity(fwd_lens.len() + bwd_lens.len());
        all_lens.extend_from_slice(&fwd_lens);
        all_lens.extend_from_slice(&bwd_lens);

        let duration = flow.duration;
        let fwd_packets = flow.fwd_packets as f64;
        let bwd_packets = flow.bwd_packets as f64;
        let fwd_bytes = flow.fwd_bytes as f64;
        let bwd_bytes = flow.bwd_bytes as f64;
        let total_packets = fwd_packets + bwd_packets;
        let total_bytes = fwd_bytes + bwd_bytes;

        let avg_fwd_segment_size = safe_div(fwd_bytes, fwd_packets);
        let avg_bwd_segment_size = safe_div(bwd_bytes, bwd_packets);

        let pkt_len_std = pop_std(&all_lens);

        let mut fv = FeatureVector {
            duration,
            total_fwd_packets: fwd_packets,
            total_bwd_packets: bwd_packets,
            total_fwd_bytes: fwd_bytes,
            total_bwd_bytes: bwd_bytes,

            fwd_pkt_len_max: max_of(&fwd_lens),
            fwd_pkt_len_min: min_of(&fwd_lens),
            fwd_pkt_len_mean: mean(&fwd_lens),
            fwd_pkt_len_std: pop_std(&fwd_lens),
            bwd_pkt_len_max: max_of(&bwd_lens),
            bwd_pkt_len_min: min_of(&bwd_lens),
            bwd_pkt_len_mean: mean(&bwd_lens),
            bwd_pkt_len_std: pop_std(&bwd_lens),

            flow_bytes_per_sec: safe_div(total_bytes, duration),
            flow_packets_per_sec: safe_div(total_packets, duration),
            flow_iat_mean: mean(&flow.flow_iat),
            flow_iat_std: pop_std(&flow.flow_iat),
            flow_iat_max: max_of(&flow.flow_iat),
            flow_iat_min: min_of(&flow.flow_iat),

            fwd_iat_total: flow.fwd_iat.iter().sum(),
            fwd_iat_mean: mean(&flow.fwd_iat),
            fwd_iat_std: pop_std(&flow.fwd_iat),
            fwd_iat_max: max_of(&flow.fwd_iat),
            fwd_iat_min: min_of(&flow.fwd_iat),
            bwd_iat_total: flow.bwd_iat.iter().sum(),
            bwd_iat_mean: mean(&flow.bwd_iat),
            bwd_iat_std: pop_std(&flow.bwd_iat),
            bwd_iat_max: max_of(&flow.bwd_iat),
            bwd_iat_min: min_of(&flow.bwd_iat),

            fwd_psh_flags: flow.fwd_psh_count as f64,
            bwd_psh_flags: flow.bwd_psh_count as f64,
            fwd_urg_flags: flow.fwd_urg_count as f64,
            bwd_urg_flags: flow.bwd_urg_count as f64,
            fwd_header_len: flow.fwd_header_bytes as f64,
            bwd_header_len: flow.bwd_header_bytes as f64,
            fwd_packets_per_sec: safe_div(fwd_packets, duration),
            bwd_packets_per_sec: safe_div(bwd_packets, duration),

            pkt_len_min: min_of(&all_lens),
            pkt_len_max: max_of(&all_lens),
            pkt_len_mean: mean(&all_lens),
            pkt_len_std,
            pkt_len_variance: pkt_len_std * pkt_len_std,

            fin_flag_count: flow.fin_count as f64,
            syn_flag_count: flow.syn_count as f64,
            rst_flag_count: flow.rst_count as f64,
            psh_flag_count: flow.psh_count as f64,
            ack_flag_count: flow.ack_count as f64,
            urg_flag_count: flow.urg_count as f64,
            // Not extracted by the decoder
            cwe_flag_count: 0.0,
            ece_flag_count: 0.0,

            down_up_ratio: safe_div(bwd_bytes, fwd_bytes),
            avg_packet_size: safe_div(total_bytes, total_packets),
            avg_fwd_segment_size,
            avg_bwd_segment_size,

            subflow_fwd_packets: fwd_packets,
            subflow_fwd_bytes: fwd_bytes,
            subflow_bwd_packets: bwd_packets,
            subflow_bwd_bytes: bwd_bytes,

            init_fwd_win_bytes: flow.init_fwd_win.map(f64::from).unwrap_or(0.0),
            init_bwd_win_bytes: flow.init_bwd_win.map(f64::from).unwrap_or(0.0),
            act_data_pkt_fwd: flow.fwd_data_packets as f64,
            min_seg_size_fwd: min_of(&fwd_lens),

            active_mean: mean(&flow.active_times),
            active_std: pop_std(&flow.active_times),
            active_max: max_of(&flow.active_times),
            active_min: min_of(&flow.active_times),
            idle_mean: mean(&flow.idle_times),
            idle_std: pop_std(&flow.idle_times),
            idle_max: max_of(&flow.idle_times),
            idle_min: min_of(&flow.idle_times),

            ..Default::default()
        };

        // Bulk transfer approximation, not a true bulk detector
        if fwd_packets >= BULK_THRESHOLD && duration > 0.0 {
            fv.fwd_bulk_rate_avg = fwd_bytes / duration;
            fv.fwd_bulk_size_avg = avg_fwd_segment_size;
            fv.fwd_bulk_packets_avg = fwd_packets / BULK_THRESHOLD;
        }
        if bwd_packets >= BULK_THRESHOLD && duration > 0.0 {
            fv.bwd_bulk_rate_avg = bwd_bytes / duration;
            fv.bwd_bulk_size_avg = avg_bwd_segment_size;
            fv.bwd_bulk_packets_avg = bwd_packets / BULK_THRESHOLD;
        }

        fv
    }

    /// Extract vectors for a snapshot of flows
    pub fn extract_batch(&self, flows: &[FlowStats]) -> Vec<FeatureVector> {
        flows.iter().map(|f| self.extract(f)).collect()
    }
}
