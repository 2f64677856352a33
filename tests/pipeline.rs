//! End-to-end pipeline tests
//!
//! Drives synthesized Ethernet frames through the full decode -> flow ->
//! features -> rules path and checks the externally observable behavior.

use chrono::{DateTime, TimeZone, Utc};

use flowsentry::config::Config;
use flowsentry::engine::Pipeline;
use flowsentry::features::{FeatureExtractor, FEATURE_COUNT};
use flowsentry::rules::engine::default_rules;
use flowsentry::rules::Severity;

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.output.print_alerts = false;
    config
}

const TCP_SYN: u8 = 0x02;
const TCP_ACK: u8 = 0x10;

/// Hand-rolled Ethernet/IPv4/TCP frame
fn tcp_frame(
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    src_port: u16,
    dst_port: u16,
    flags: u8,
    payload: &[u8],
) -> Vec<u8> {
    let total_len = 40 + payload.len() as u16;
    let mut frame = vec![
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // dst mac
        0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, // src mac
        0x08, 0x00, // ethertype IPv4
    ];
    frame.extend_from_slice(&[0x45, 0x00]);
    frame.extend_from_slice(&total_len.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x01, 0x40, 0x00, 0x40, 0x06, 0x00, 0x00]);
    frame.extend_from_slice(&src_ip);
    frame.extend_from_slice(&dst_ip);
    frame.extend_from_slice(&src_port.to_be_bytes());
    frame.extend_from_slice(&dst_port.to_be_bytes());
    frame.extend_from_slice(&[0, 0, 0, 1]); // seq
    frame.extend_from_slice(&[0, 0, 0, 0]); // ack
    frame.push(0x50); // data offset 5
    frame.push(flags);
    frame.extend_from_slice(&[0x20, 0x00]); // window 8192
    frame.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // checksum, urgent
    frame.extend_from_slice(payload);
    frame
}

/// Hand-rolled Ethernet/IPv4/UDP frame
fn udp_frame(
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let udp_len = 8 + payload.len() as u16;
    let total_len = 20 + udp_len;
    let mut frame = vec![
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
        0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb,
        0x08, 0x00,
    ];
    frame.extend_from_slice(&[0x45, 0x00]);
    frame.extend_from_slice(&total_len.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x01, 0x00, 0x00, 0x40, 0x11, 0x00, 0x00]);
    frame.extend_from_slice(&src_ip);
    frame.extend_from_slice(&dst_ip);
    frame.extend_from_slice(&src_port.to_be_bytes());
    frame.extend_from_slice(&dst_port.to_be_bytes());
    frame.extend_from_slice(&udp_len.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x00]);
    frame.extend_from_slice(payload);
    frame
}

#[test]
fn decoder_round_trip_against_etherparse_frames() {
    use etherparse::PacketBuilder;

    let payload = b"GET / HTTP/1.1\r\n\r\n";
    let builder = PacketBuilder::ethernet2([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb],
                                           [0x00, 0x11, 0x22, 0x33, 0x44, 0x55])
        .ipv4([192, 168, 1, 100], [10, 0, 0, 1], 64)
        .tcp(12345, 80, 0x1000, 4096)
        .psh()
        .ack(7);
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, payload).unwrap();

    let decoder = flowsentry::PacketDecoder::new();
    let pkt = decoder.decode(&frame, t(0)).unwrap();

    assert_eq!(pkt.src_ip_string(), "192.168.1.100");
    assert_eq!(pkt.dst_ip_string(), "10.0.0.1");
    assert_eq!(pkt.ipv4.ttl, 64);
    let tcp = pkt.tcp.unwrap();
    assert_eq!(tcp.src_port, 12345);
    assert_eq!(tcp.dst_port, 80);
    assert_eq!(tcp.seq, 0x1000);
    assert_eq!(tcp.ack, 7);
    assert_eq!(tcp.window, 4096);
    assert!(tcp.flags.psh);
    assert!(tcp.flags.ack);
    assert!(!tcp.flags.syn);
    assert_eq!(pkt.payload, payload);
}

#[test]
fn decoder_round_trip_udp() {
    use etherparse::PacketBuilder;

    let payload = b"\x12\x34\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00";
    let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
        .ipv4([10, 0, 0, 5], [10, 0, 0, 53], 61)
        .udp(53123, 53);
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, payload).unwrap();

    let decoder = flowsentry::PacketDecoder::new();
    let pkt = decoder.decode(&frame, t(0)).unwrap();

    let udp = pkt.udp.unwrap();
    assert_eq!(udp.src_port, 53123);
    assert_eq!(udp.dst_port, 53);
    assert_eq!(udp.length as usize, 8 + payload.len());
    assert_eq!(pkt.payload, payload);
}

// S1: SSH SYN scan against a rule set holding only the SSH rule
#[test]
fn s1_ssh_syn_scan() {
    let mut config = quiet_config();
    config.rules.use_defaults = false;
    let mut pipeline = Pipeline::from_config(&config).unwrap();
    pipeline.rule_engine().add_rule(default_rules().remove(0));

    let frame = tcp_frame([10, 0, 0, 5], [10, 0, 0, 10], 40000, 22, TCP_SYN, b"");
    let alerts = pipeline.process_frame(&frame, t(0));

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id, 1001);
    assert_eq!(alerts[0].severity, Severity::Medium);
    assert_eq!(alerts[0].src_ip, "10.0.0.5");
    assert_eq!(alerts[0].src_port, 40000);
    assert_eq!(alerts[0].dst_ip, "10.0.0.10");
    assert_eq!(alerts[0].dst_port, 22);
    assert_eq!(alerts[0].protocol, "TCP");
}

// S2: SQL injection pattern in an HTTP GET
#[test]
fn s2_sql_injection_in_http_get() {
    let mut pipeline = Pipeline::from_config(&quiet_config()).unwrap();

    let payload = b"GET /?id=1 UNION SELECT * FROM users";
    let frame = tcp_frame([10, 0, 0, 5], [10, 0, 0, 10], 40000, 80, TCP_ACK, payload);
    let alerts = pipeline.process_frame(&frame, t(0));

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id, 1002);
    assert_eq!(alerts[0].severity, Severity::High);
    assert_eq!(alerts[0].matched_content, "union select");
}

// S3: SYN to 3389 trips the port scan rule
#[test]
fn s3_port_scan_to_3389() {
    let mut pipeline = Pipeline::from_config(&quiet_config()).unwrap();

    let frame = tcp_frame([10, 0, 0, 5], [10, 0, 0, 10], 40000, 3389, TCP_SYN, b"");
    let alerts = pipeline.process_frame(&frame, t(0));

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id, 1003);
    assert_eq!(alerts[0].severity, Severity::Medium);
}

// S4: DNS query with the DNS rule disabled
#[test]
fn s4_dns_query_rule_disabled() {
    let mut pipeline = Pipeline::from_config(&quiet_config()).unwrap();

    let dns_header = b"\x12\x34\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00";
    let frame = udp_frame([10, 0, 0, 5], [10, 0, 0, 53], 53123, 53, dns_header);
    let alerts = pipeline.process_frame(&frame, t(0));

    assert!(alerts.is_empty());
    assert_eq!(pipeline.stats().snapshot().udp_packets, 1);
}

// S5: three-packet flow feature vector
#[test]
fn s5_three_packet_flow_features() {
    let mut pipeline = Pipeline::from_config(&quiet_config()).unwrap();

    for (len, secs) in [(100usize, 0i64), (200, 1), (300, 3)] {
        let payload = vec![0x61u8; len - 54];
        let frame = tcp_frame([10, 0, 0, 5], [10, 0, 0, 10], 40000, 9999, TCP_ACK, &payload);
        assert_eq!(frame.len(), len);
        pipeline.process_frame(&frame, t(secs));
    }

    let flows = pipeline.flow_table().snapshot();
    assert_eq!(flows.len(), 1);
    let fv = FeatureExtractor::new().extract(&flows[0]);

    assert_eq!(fv.total_fwd_packets, 3.0);
    assert_eq!(fv.total_fwd_bytes, 600.0);
    assert!((fv.fwd_pkt_len_mean - 200.0).abs() < 1e-9);
    assert!((fv.fwd_iat_mean - 1.5).abs() < 1e-9);
    assert!((fv.duration - 3.0).abs() < 1e-9);
    assert!((fv.fwd_packets_per_sec - 1.0).abs() < 1e-9);
}

// S6: truncated frame is dropped before any stage runs
#[test]
fn s6_truncated_frame() {
    let mut pipeline = Pipeline::from_config(&quiet_config()).unwrap();

    let alerts = pipeline.process_frame(&[0u8; 20], t(0));

    assert!(alerts.is_empty());
    assert_eq!(pipeline.decoder().parse_errors(), 1);
    assert_eq!(pipeline.flow_table().len(), 0);
    assert_eq!(pipeline.rule_engine().stats().packets_evaluated, 0);
}

#[test]
fn flow_invariants_hold_over_a_handshake() {
    let mut pipeline = Pipeline::from_config(&quiet_config()).unwrap();
    let client = [10, 0, 0, 5];
    let server = [10, 0, 0, 10];

    pipeline.process_frame(&tcp_frame(client, server, 40000, 80, TCP_SYN, b""), t(0));
    pipeline.process_frame(&tcp_frame(server, client, 80, 40000, TCP_SYN | TCP_ACK, b""), t(1));
    pipeline.process_frame(&tcp_frame(client, server, 40000, 80, TCP_ACK, b""), t(2));
    pipeline.process_frame(&tcp_frame(client, server, 40000, 80, TCP_ACK, b"data"), t(3));

    let flows = pipeline.flow_table().snapshot();
    assert_eq!(flows.len(), 1, "both directions fold into one flow");
    let flow = &flows[0];

    assert_eq!(flow.fwd_packets as usize, flow.fwd_pkt_lengths.len());
    assert_eq!(flow.bwd_packets as usize, flow.bwd_pkt_lengths.len());
    assert_eq!(flow.fwd_iat.len(), flow.fwd_packets as usize - 1);
    assert_eq!(flow.bwd_iat.len(), 0);
    assert!(flow.last_seen >= flow.start_time);
    assert!((flow.duration - 3.0).abs() < 1e-9);
    assert_eq!(flow.state, flowsentry::ConnectionState::Established);
    assert_eq!(flow.fwd_packets, 3);
    assert_eq!(flow.bwd_packets, 1);
}

#[test]
fn admission_bound_is_exact() {
    let mut config = quiet_config();
    config.flow.max_connections = 10;
    let mut pipeline = Pipeline::from_config(&config).unwrap();

    // max + K distinct 5-tuples with non-expiring timestamps
    for i in 0..15u16 {
        let frame = tcp_frame([10, 0, 1, i as u8], [10, 0, 0, 10], 40000 + i, 9999, TCP_ACK, b"");
        pipeline.process_frame(&frame, t(i as i64));
    }

    assert_eq!(pipeline.flow_table().len(), 10);
    assert_eq!(pipeline.stats().snapshot().flows_rejected, 5);
    // Rejected packets were still evaluated by the rule engine
    assert_eq!(pipeline.rule_engine().stats().packets_evaluated, 15);
}

#[test]
fn expiry_reclaims_aged_and_closed_flows() {
    let mut pipeline = Pipeline::from_config(&quiet_config()).unwrap();
    let client = [10, 0, 0, 5];
    let server = [10, 0, 0, 10];

    // Flow A goes idle; flow B closes with RST after establishing
    pipeline.process_frame(&tcp_frame(client, server, 40000, 9999, TCP_ACK, b""), t(0));
    pipeline.process_frame(&tcp_frame(client, server, 40001, 9999, TCP_SYN, b""), t(100));
    pipeline.process_frame(&tcp_frame(server, client, 9999, 40001, TCP_SYN | TCP_ACK, b""), t(101));
    pipeline.process_frame(&tcp_frame(client, server, 40001, 9999, TCP_ACK, b""), t(102));
    pipeline.process_frame(&tcp_frame(client, server, 40001, 9999, 0x04, b""), t(103));
    assert_eq!(pipeline.flow_table().len(), 2);

    // 121s after flow A's last packet: A aged out, B closed
    let removed = pipeline.flow_table().expire_old(t(121));
    assert_eq!(removed, 2);
    assert_eq!(pipeline.flow_table().len(), 0);
}

#[test]
fn feature_extraction_is_deterministic() {
    let mut pipeline = Pipeline::from_config(&quiet_config()).unwrap();
    for secs in 0..4 {
        let frame = tcp_frame([10, 0, 0, 5], [10, 0, 0, 10], 40000, 9999, TCP_ACK, b"xy");
        pipeline.process_frame(&frame, t(secs));
    }

    let flows = pipeline.flow_table().snapshot();
    let extractor = FeatureExtractor::new();
    let a = extractor.extract(&flows[0]);
    let b = extractor.extract(&flows[0]);

    assert_eq!(a.to_csv_row(), b.to_csv_row());
    assert_eq!(a.to_json(), b.to_json());
    assert_eq!(a.to_vector(), b.to_vector());
}

#[test]
fn disabling_a_rule_suppresses_its_alerts() {
    let mut pipeline = Pipeline::from_config(&quiet_config()).unwrap();
    let frame = tcp_frame([10, 0, 0, 5], [10, 0, 0, 10], 40000, 23, TCP_ACK, b"");

    let alerts = pipeline.process_frame(&frame, t(0));
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id, 1006);
    let first_id = alerts[0].alert_id;

    pipeline.rule_engine().enable_rule(1006, false);
    assert!(pipeline.process_frame(&frame, t(1)).is_empty());

    pipeline.rule_engine().enable_rule(1006, true);
    let alerts = pipeline.process_frame(&frame, t(2));
    assert_eq!(alerts.len(), 1);
    // Ids stay strictly increasing across the run
    assert!(alerts[0].alert_id > first_id);
}

#[test]
fn csv_and_alert_sinks_write_through_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("features.csv");
    let alerts_path = dir.path().join("alerts.jsonl");

    let mut config = quiet_config();
    config.output.features_csv = Some(csv_path.clone());
    config.output.alerts_file = Some(alerts_path.clone());

    let mut pipeline = Pipeline::from_config(&config).unwrap();
    pipeline.process_frame(
        &tcp_frame([10, 0, 0, 5], [10, 0, 0, 10], 40000, 22, TCP_SYN, b""),
        t(0),
    );
    pipeline.flush().unwrap();

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2, "header plus one row");
    assert_eq!(lines[0].split(',').count(), FEATURE_COUNT);
    assert_eq!(lines[1].split(',').count(), FEATURE_COUNT);

    let alerts: Vec<String> = std::fs::read_to_string(&alerts_path)
        .unwrap()
        .lines()
        .map(String::from)
        .collect();
    // SYN to 22 trips both the SSH scan and port scan defaults
    assert_eq!(alerts.len(), 2);
    let first: serde_json::Value = serde_json::from_str(&alerts[0]).unwrap();
    assert_eq!(first["rule_id"], 1001);
    assert_eq!(first["severity"], "medium");
    assert_eq!(first["protocol"], "TCP");
    assert_eq!(first["timestamp"].as_str().unwrap().len(), 20);
}

#[test]
fn statistics_track_the_run() {
    let mut pipeline = Pipeline::from_config(&quiet_config()).unwrap();

    pipeline.process_frame(&tcp_frame([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, TCP_ACK, b""), t(0));
    pipeline.process_frame(&udp_frame([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, b"x"), t(1));
    pipeline.process_frame(&[0u8; 10], t(2));

    let snap = pipeline.stats().snapshot();
    assert_eq!(snap.total_packets, 2);
    assert_eq!(snap.tcp_packets, 1);
    assert_eq!(snap.udp_packets, 1);
    assert_eq!(snap.parse_errors, 1);

    let line = snap.summary_line();
    assert!(line.contains("packets=2"));
    assert!(line.contains("tcp=1"));
}
