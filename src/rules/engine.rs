//! Per-packet rule evaluation
//!
//! Rules are indexed by (protocol, dst_port) with fallback buckets for
//! "any", so the hot path never scans the whole rule list. Candidate
//! rules are verified with the short-circuit predicate chain: protocol,
//! IP filters, port lists, TCP flags, content substrings, regexes.
//! Payload scanning is capped at the first 1 KiB.

use std::collections::{HashMap, HashSet};

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, warn};

use crate::core::packet::{ParsedPacket, TCP_ACK, TCP_SYN};

use super::{Alert, RuleProtocol, Severity, SignatureRule};

/// Payload bytes examined by content and regex predicates
const PAYLOAD_SCAN_CAP: usize = 1024;

/// Engine counters
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngineStats {
    pub packets_evaluated: u64,
    pub rule_matches: u64,
    pub alerts_generated: u64,
    pub regex_errors: u64,
}

/// Two-level rule index keyed on (protocol, dst_port).
///
/// Rules with several destination ports appear in one bucket per port;
/// buckets hold insertion indices, so merging and sorting candidate
/// lists preserves rule-list order.
#[derive(Debug, Default)]
struct RuleIndex {
    by_proto_port: HashMap<(RuleProtocol, u16), Vec<usize>>,
    by_proto: HashMap<RuleProtocol, Vec<usize>>,
    by_port: HashMap<u16, Vec<usize>>,
    wildcard: Vec<usize>,
}

impl RuleIndex {
    fn insert(&mut self, idx: usize, rule: &SignatureRule) {
        match (rule.protocol, rule.dst_ports.is_empty()) {
            (RuleProtocol::Any, true) => self.wildcard.push(idx),
            (RuleProtocol::Any, false) => {
                for &port in &rule.dst_ports {
                    self.by_port.entry(port).or_default().push(idx);
                }
            }
            (proto, true) => self.by_proto.entry(proto).or_default().push(idx),
            (proto, false) => {
                for &port in &rule.dst_ports {
                    self.by_proto_port.entry((proto, port)).or_default().push(idx);
                }
            }
        }
    }

    fn candidates(&self, proto: Option<RuleProtocol>, dst_port: u16) -> Vec<usize> {
        let mut out = Vec::new();
        if let Some(p) = proto {
            if let Some(v) = self.by_proto_port.get(&(p, dst_port)) {
                out.extend_from_slice(v);
            }
            if let Some(v) = self.by_proto.get(&p) {
                out.extend_from_slice(v);
            }
        }
        if let Some(v) = self.by_port.get(&dst_port) {
            out.extend_from_slice(v);
        }
        out.extend_from_slice(&self.wildcard);
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Multi-pattern content pre-filter.
///
/// One case-insensitive automaton over every content pattern in the rule
/// set; a single scan of the capped payload yields the rules with at
/// least one hit. Rules without content patterns bypass it.
struct ContentPrefilter {
    automaton: AhoCorasick,
    pattern_rules: Vec<Vec<usize>>,
}

impl ContentPrefilter {
    fn build(rules: &[SignatureRule]) -> Option<Self> {
        let mut patterns: Vec<String> = Vec::new();
        let mut pattern_rules: Vec<Vec<usize>> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (idx, rule) in rules.iter().enumerate() {
            for pattern in &rule.content_patterns {
                let lowered = pattern.to_ascii_lowercase();
                if let Some(&slot) = seen.get(&lowered) {
                    pattern_rules[slot].push(idx);
                } else {
                    seen.insert(lowered.clone(), patterns.len());
                    patterns.push(lowered);
                    pattern_rules.push(vec![idx]);
                }
            }
        }

        if patterns.is_empty() {
            return None;
        }

        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::Standard)
            .ascii_case_insensitive(true)
            .build(&patterns)
            .ok()?;

        Some(Self { automaton, pattern_rules })
    }

    fn hits(&self, payload: &[u8]) -> HashSet<usize> {
        let mut rules = HashSet::new();
        for mat in self.automaton.find_overlapping_iter(payload) {
            if let Some(ids) = self.pattern_rules.get(mat.pattern().as_usize()) {
                rules.extend(ids.iter().copied());
            }
        }
        rules
    }
}

/// Signature matching engine
pub struct RuleEngine {
    rules: Vec<SignatureRule>,
    index: RuleIndex,
    prefilter: Option<ContentPrefilter>,
    prefilter_dirty: bool,
    /// Compiled regexes keyed by source string; None marks a failed
    /// compile so it is skipped without retrying
    regex_cache: RwLock<HashMap<String, Option<Regex>>>,
    next_alert_id: u64,
    stats: RuleEngineStats,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            index: RuleIndex::default(),
            prefilter: None,
            prefilter_dirty: false,
            regex_cache: RwLock::new(HashMap::new()),
            next_alert_id: 1,
            stats: RuleEngineStats::default(),
        }
    }

    /// Engine preloaded with the stock detection rules.
    pub fn with_default_rules() -> Self {
        let mut engine = Self::new();
        for rule in default_rules() {
            engine.add_rule(rule);
        }
        engine
    }

    pub fn add_rule(&mut self, rule: SignatureRule) {
        let idx = self.rules.len();
        self.index.insert(idx, &rule);
        if !rule.content_patterns.is_empty() {
            self.prefilter_dirty = true;
        }
        debug!(rule_id = rule.rule_id, name = %rule.name, "loaded rule");
        self.rules.push(rule);
    }

    /// Toggle a rule in place. Unknown ids are ignored.
    pub fn enable_rule(&mut self, rule_id: u32, enabled: bool) {
        if let Some(rule) = self.rules.iter_mut().find(|r| r.rule_id == rule_id) {
            rule.enabled = enabled;
        }
    }

    pub fn rules(&self) -> &[SignatureRule] {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn stats(&self) -> RuleEngineStats {
        self.stats
    }

    /// Evaluate one packet against the rule set. Alerts come back in
    /// rule-list order with strictly ascending ids.
    pub fn evaluate(&mut self, pkt: &ParsedPacket<'_>) -> Vec<Alert> {
        self.stats.packets_evaluated += 1;
        if self.rules.is_empty() {
            return Vec::new();
        }
        if self.prefilter_dirty {
            self.prefilter = ContentPrefilter::build(&self.rules);
            self.prefilter_dirty = false;
        }

        let payload = &pkt.payload[..pkt.payload.len().min(PAYLOAD_SCAN_CAP)];
        let content_hits = match (&self.prefilter, payload.is_empty()) {
            (Some(pf), false) => Some(pf.hits(payload)),
            _ => None,
        };

        let proto = if pkt.is_tcp() {
            Some(RuleProtocol::Tcp)
        } else if pkt.is_udp() {
            Some(RuleProtocol::Udp)
        } else {
            None
        };
        let src_ip = pkt.src_ip_string();
        let dst_ip = pkt.dst_ip_string();

        let mut payload_lower: Option<String> = None;
        let mut regex_failures = 0u64;
        let mut matched: Vec<(usize, String)> = Vec::new();

        for idx in self.index.candidates(proto, pkt.dst_port()) {
            let rule = &self.rules[idx];
            if !rule.enabled {
                continue;
            }

            match rule.protocol {
                RuleProtocol::Tcp if !pkt.is_tcp() => continue,
                RuleProtocol::Udp if !pkt.is_udp() => continue,
                _ => {}
            }

            if rule.src_ip_filter != "any" && rule.src_ip_filter != src_ip {
                continue;
            }
            if rule.dst_ip_filter != "any" && rule.dst_ip_filter != dst_ip {
                continue;
            }

            if !rule.src_ports.is_empty() && !rule.src_ports.contains(&pkt.src_port()) {
                continue;
            }
            if !rule.dst_ports.is_empty() && !rule.dst_ports.contains(&pkt.dst_port()) {
                continue;
            }

            if pkt.is_tcp() && rule.tcp_flags_mask != 0 {
                if pkt.tcp_flag_bits() & rule.tcp_flags_mask != rule.tcp_flags_value {
                    continue;
                }
            }

            let mut matched_content = String::new();
            if !rule.content_patterns.is_empty() {
                if payload.is_empty() {
                    continue;
                }
                if let Some(hits) = &content_hits {
                    if !hits.contains(&idx) {
                        continue;
                    }
                }
                let lower = payload_lower.get_or_insert_with(|| {
                    String::from_utf8_lossy(payload).to_ascii_lowercase()
                });
                match rule
                    .content_patterns
                    .iter()
                    .find(|p| lower.contains(&p.to_ascii_lowercase()))
                {
                    Some(pattern) => matched_content = pattern.clone(),
                    None => continue,
                }
            }

            if !rule.regex_patterns.is_empty() {
                if payload.is_empty() {
                    continue;
                }
                let text = String::from_utf8_lossy(payload);
                let (any, failures) = self.regex_match_any(&rule.regex_patterns, &text);
                regex_failures += failures;
                if !any {
                    continue;
                }
            }

            matched.push((idx, matched_content));
        }

        self.stats.regex_errors += regex_failures;
        self.stats.rule_matches += matched.len() as u64;

        let mut alerts = Vec::with_capacity(matched.len());
        for (idx, matched_content) in matched {
            let rule = &self.rules[idx];
            let alert_id = self.next_alert_id;
            self.next_alert_id += 1;
            alerts.push(Alert {
                alert_id,
                timestamp: pkt.timestamp,
                rule_id: rule.rule_id,
                rule_name: rule.name.clone(),
                severity: rule.severity,
                packet_id: pkt.packet_id,
                src_ip: src_ip.clone(),
                dst_ip: dst_ip.clone(),
                src_port: pkt.src_port(),
                dst_port: pkt.dst_port(),
                protocol: pkt.protocol_name().to_string(),
                description: rule.description.clone(),
                matched_content,
            });
        }

        self.stats.alerts_generated += alerts.len() as u64;
        alerts
    }

    /// True when at least one regex matches. Compile failures are soft:
    /// the pattern counts as unmatched and is remembered so it is never
    /// recompiled. Returns (matched, new compile failures).
    fn regex_match_any(&self, patterns: &[String], text: &str) -> (bool, u64) {
        let mut failures = 0u64;
        for pattern in patterns {
            {
                let cache = self.regex_cache.read();
                if let Some(entry) = cache.get(pattern) {
                    match entry {
                        Some(re) if re.is_match(text) => return (true, failures),
                        _ => continue,
                    }
                }
            }

            let compiled = match Regex::new(&format!("(?i){}", pattern)) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "invalid rule regex, skipping");
                    failures += 1;
                    None
                }
            };
            let is_match = compiled.as_ref().map(|re| re.is_match(text)).unwrap_or(false);
            self.regex_cache.write().insert(pattern.clone(), compiled);
            if is_match {
                return (true, failures);
            }
        }
        (false, failures)
    }
}

/// The stock rule set installed by `RuleEngine::with_default_rules`.
pub fn default_rules() -> Vec<SignatureRule> {
    let mut rules = Vec::new();

    let mut ssh_scan = SignatureRule::new(
        1001,
        "SSH Scan Detection",
        "Multiple SSH connection attempts detected",
    );
    ssh_scan.protocol = RuleProtocol::Tcp;
    ssh_scan.dst_ports = vec![22];
    ssh_scan.tcp_flags_mask = TCP_SYN;
    ssh_scan.tcp_flags_value = TCP_SYN;
    ssh_scan.severity = Severity::Medium;
    rules.push(ssh_scan);

    let mut sql_injection = SignatureRule::new(
        1002,
        "SQL Injection Attempt",
        "Possible SQL injection in HTTP request",
    );
    sql_injection.protocol = RuleProtocol::Tcp;
    sql_injection.dst_ports = vec![80, 443, 8080];
    sql_injection.content_patterns = vec![
        "union select".to_string(),
        "or 1=1".to_string(),
        "' or '1'='1".to_string(),
    ];
    sql_injection.severity = Severity::High;
    rules.push(sql_injection);

    let mut port_scan = SignatureRule::new(
        1003,
        "Port Scan Detection",
        "SYN packet to commonly scanned port",
    );
    port_scan.protocol = RuleProtocol::Tcp;
    port_scan.dst_ports = vec![21, 22, 23, 25, 80, 443, 3389, 8080];
    port_scan.tcp_flags_mask = TCP_SYN | TCP_ACK;
    port_scan.tcp_flags_value = TCP_SYN;
    port_scan.severity = Severity::Medium;
    rules.push(port_scan);

    let mut ftp_auth = SignatureRule::new(
        1004,
        "FTP Authentication Attempt",
        "FTP USER or PASS command detected",
    );
    ftp_auth.protocol = RuleProtocol::Tcp;
    ftp_auth.dst_ports = vec![21];
    ftp_auth.content_patterns = vec!["USER ".to_string(), "PASS ".to_string()];
    ftp_auth.severity = Severity::Low;
    rules.push(ftp_auth);

    let mut dns_query = SignatureRule::new(1005, "DNS Query", "DNS query packet detected");
    dns_query.protocol = RuleProtocol::Udp;
    dns_query.dst_ports = vec![53];
    dns_query.severity = Severity::Low;
    dns_query.action = super::RuleAction::Log;
    dns_query.enabled = false; // too noisy
    rules.push(dns_query);

    let mut telnet = SignatureRule::new(
        1006,
        "Telnet Connection",
        "Unencrypted Telnet connection detected",
    );
    telnet.protocol = RuleProtocol::Tcp;
    telnet.dst_ports = vec![23];
    telnet.severity = Severity::Medium;
    rules.push(telnet);

    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{EthernetHeader, Ipv4Header, TcpFlags, TcpHeader, UdpHeader};
    use chrono::Utc;

    const SRC: u32 = 0x0a000005; // 10.0.0.5
    const DST: u32 = 0x0a00000a; // 10.0.0.10

    fn tcp_packet<'a>(dst_port: u16, flags: u8, payload: &'a [u8]) -> ParsedPacket<'a> {
        ParsedPacket {
            timestamp: Utc::now(),
            packet_id: 1,
            raw_length: 54 + payload.len() as u32,
            eth: EthernetHeader { dst_mac: [0; 6], src_mac: [0; 6], ethertype: 0x0800 },
            ipv4: Ipv4Header {
                version_ihl: 0x45,
                tos: 0,
                total_length: 40,
                identification: 0,
                flags_fragment: 0,
                ttl: 64,
                protocol: 6,
                checksum: 0,
                src_ip: SRC,
                dst_ip: DST,
            },
            tcp: Some(TcpHeader {
                src_port: 40000,
                dst_port,
                seq: 0,
                ack: 0,
                data_offset: 5,
                flags: TcpFlags::from_u8(flags),
                window: 8192,
                checksum: 0,
                urgent_pointer: 0,
            }),
            udp: None,
            payload,
        }
    }

    fn udp_packet<'a>(dst_port: u16, payload: &'a [u8]) -> ParsedPacket<'a> {
        ParsedPacket {
            timestamp: Utc::now(),
            packet_id: 1,
            raw_length: 42 + payload.len() as u32,
            eth: EthernetHeader { dst_mac: [0; 6], src_mac: [0; 6], ethertype: 0x0800 },
            ipv4: Ipv4Header {
                version_ihl: 0x45,
                tos: 0,
                total_length: 28,
                identification: 0,
                flags_fragment: 0,
                ttl: 64,
                protocol: 17,
                checksum: 0,
                src_ip: SRC,
                dst_ip: DST,
            },
            tcp: None,
            udp: Some(UdpHeader {
                src_port: 53123,
                dst_port,
                length: 8 + payload.len() as u16,
                checksum: 0,
            }),
            payload,
        }
    }

    #[test]
    fn test_ssh_scan_rule() {
        let mut engine = RuleEngine::new();
        engine.add_rule(default_rules().remove(0));

        let alerts = engine.evaluate(&tcp_packet(22, TCP_SYN, b""));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, 1001);
        assert_eq!(alerts[0].severity, Severity::Medium);
        assert_eq!(alerts[0].src_ip, "10.0.0.5");
        assert_eq!(alerts[0].dst_port, 22);

        // The mask only inspects the SYN bit, so SYN+ACK matches too
        let alerts = engine.evaluate(&tcp_packet(22, TCP_SYN | TCP_ACK, b""));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, 1001);

        // A bare ACK fails the flag predicate
        let alerts = engine.evaluate(&tcp_packet(22, TCP_ACK, b""));
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_sql_injection_content_match() {
        let mut engine = RuleEngine::with_default_rules();
        let payload: &[u8] = b"GET /?id=1 UNION SELECT * FROM users";
        let alerts = engine.evaluate(&tcp_packet(80, TCP_ACK, payload));

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, 1002);
        assert_eq!(alerts[0].severity, Severity::High);
        assert_eq!(alerts[0].matched_content, "union select");
    }

    #[test]
    fn test_port_scan_rule() {
        let mut engine = RuleEngine::new();
        let mut rules = default_rules();
        engine.add_rule(rules.remove(2)); // 1003

        let alerts = engine.evaluate(&tcp_packet(3389, TCP_SYN, b""));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, 1003);
        assert_eq!(alerts[0].severity, Severity::Medium);

        // Mask covers SYN and ACK with ACK required clear, so a
        // SYN+ACK response does not trip the rule
        let alerts = engine.evaluate(&tcp_packet(3389, TCP_SYN | TCP_ACK, b""));
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_disabled_rule_is_silent() {
        let mut engine = RuleEngine::with_default_rules();
        // DNS rule 1005 ships disabled
        let alerts = engine.evaluate(&udp_packet(53, b"\x12\x34\x01\x00"));
        assert!(alerts.is_empty());

        engine.enable_rule(1005, true);
        let alerts = engine.evaluate(&udp_packet(53, b"\x12\x34\x01\x00"));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, 1005);
    }

    #[test]
    fn test_alerts_in_rule_order_with_ascending_ids() {
        let mut engine = RuleEngine::with_default_rules();
        // SYN to port 22 matches both 1001 and 1003
        let alerts = engine.evaluate(&tcp_packet(22, TCP_SYN, b""));
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].rule_id, 1001);
        assert_eq!(alerts[1].rule_id, 1003);
        assert!(alerts[1].alert_id > alerts[0].alert_id);

        let more = engine.evaluate(&tcp_packet(22, TCP_SYN, b""));
        assert!(more[0].alert_id > alerts[1].alert_id);
    }

    #[test]
    fn test_protocol_mismatch_short_circuits() {
        let mut engine = RuleEngine::new();
        let mut rule = SignatureRule::new(1, "udp only", "x");
        rule.protocol = RuleProtocol::Udp;
        engine.add_rule(rule);

        assert!(engine.evaluate(&tcp_packet(53, TCP_ACK, b"")).is_empty());
        assert_eq!(engine.evaluate(&udp_packet(53, b"")).len(), 1);
    }

    #[test]
    fn test_ip_filters() {
        let mut engine = RuleEngine::new();
        let mut rule = SignatureRule::new(1, "from 10.0.0.5", "x");
        rule.src_ip_filter = "10.0.0.5".to_string();
        engine.add_rule(rule);
        let mut other = SignatureRule::new(2, "from elsewhere", "x");
        other.src_ip_filter = "192.168.1.1".to_string();
        engine.add_rule(other);

        let alerts = engine.evaluate(&tcp_packet(80, TCP_ACK, b""));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, 1);
    }

    #[test]
    fn test_content_requires_payload() {
        let mut engine = RuleEngine::new();
        let mut rule = SignatureRule::new(1, "needs content", "x");
        rule.content_patterns = vec!["attack".to_string()];
        engine.add_rule(rule);

        assert!(engine.evaluate(&tcp_packet(80, TCP_ACK, b"")).is_empty());
        assert_eq!(engine.evaluate(&tcp_packet(80, TCP_ACK, b"an ATTACK here")).len(), 1);
    }

    #[test]
    fn test_payload_scan_capped() {
        let mut engine = RuleEngine::new();
        let mut rule = SignatureRule::new(1, "deep content", "x");
        rule.content_patterns = vec!["needle".to_string()];
        engine.add_rule(rule);

        // Pattern past the 1 KiB cap is not seen
        let mut deep = vec![b'a'; 2048];
        deep[1500..1506].copy_from_slice(b"needle");
        assert!(engine.evaluate(&tcp_packet(80, TCP_ACK, &deep)).is_empty());

        let mut shallow = vec![b'a'; 2048];
        shallow[100..106].copy_from_slice(b"needle");
        assert_eq!(engine.evaluate(&tcp_packet(80, TCP_ACK, &shallow)).len(), 1);
    }

    #[test]
    fn test_regex_rule() {
        let mut engine = RuleEngine::new();
        let mut rule = SignatureRule::new(1, "regex", "x");
        rule.regex_patterns = vec![r"select\s+\*\s+from".to_string()];
        engine.add_rule(rule);

        assert_eq!(
            engine.evaluate(&tcp_packet(80, TCP_ACK, b"SELECT  * FROM users")).len(),
            1
        );
        assert!(engine.evaluate(&tcp_packet(80, TCP_ACK, b"nothing here")).is_empty());
    }

    #[test]
    fn test_bad_regex_is_soft_error() {
        let mut engine = RuleEngine::new();
        let mut rule = SignatureRule::new(1, "broken", "x");
        rule.regex_patterns = vec!["[unclosed".to_string()];
        engine.add_rule(rule);
        let mut ok = SignatureRule::new(2, "fine", "x");
        ok.content_patterns = vec!["hello".to_string()];
        engine.add_rule(ok);

        let alerts = engine.evaluate(&tcp_packet(80, TCP_ACK, b"hello world"));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_id, 2);
        assert_eq!(engine.stats().regex_errors, 1);

        // Second packet: failed pattern is cached, not recounted
        engine.evaluate(&tcp_packet(80, TCP_ACK, b"hello again"));
        assert_eq!(engine.stats().regex_errors, 1);
    }

    #[test]
    fn test_index_equivalent_to_linear_scan() {
        let mut engine = RuleEngine::with_default_rules();
        engine.enable_rule(1005, true);

        // Rules fire only for their indexed (protocol, port) combinations
        assert!(engine.evaluate(&tcp_packet(9999, TCP_SYN, b"")).is_empty());
        assert_eq!(engine.evaluate(&udp_packet(53, b"q")).len(), 1);
        assert_eq!(engine.evaluate(&tcp_packet(23, TCP_ACK, b"")).len(), 1);
    }
}
