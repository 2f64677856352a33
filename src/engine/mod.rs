//! Processing pipeline
//!
//! Single-threaded cooperative hot path: capture read, decode, flow
//! update, feature extraction, sink publishing, rule evaluation, alert
//! routing, in that order for every frame. The only blocking points are
//! the capture read and sink I/O; shutdown is a stop flag polled between
//! packets. A background reporter thread observes the shared atomic
//! statistics.

pub mod capture;
pub mod stats;

pub use capture::{create_source, CaptureConfig, CaptureSource, Frame, StaticSource};
pub use stats::{spawn_reporter, Statistics, StatsSnapshot};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::PacketDecoder;
use crate::features::FeatureExtractor;
use crate::flow::FlowTable;
use crate::output::{print_alert, AlertWriter, CsvFeatureWriter, FeatureBus};
use crate::rules::{Alert, RuleEngine};

/// The packet-processing pipeline
pub struct Pipeline {
    decoder: PacketDecoder,
    flows: FlowTable,
    extractor: FeatureExtractor,
    rules: RuleEngine,
    stats: Arc<Statistics>,
    stop: Arc<AtomicBool>,

    csv_writer: Option<CsvFeatureWriter>,
    alert_writer: Option<AlertWriter>,
    bus: Option<Box<dyn FeatureBus>>,
    bus_topic: String,
    print_alerts: bool,
}

impl Pipeline {
    /// Build a pipeline with sinks wired up from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let rules = if config.rules.use_defaults {
            RuleEngine::with_default_rules()
        } else {
            RuleEngine::new()
        };

        let csv_writer = match &config.output.features_csv {
            Some(path) => Some(CsvFeatureWriter::create(path)?),
            None => None,
        };
        let alert_writer = match &config.output.alerts_file {
            Some(path) => Some(AlertWriter::create(path)?),
            None => None,
        };
        let bus: Option<Box<dyn FeatureBus>> = if config.output.publish_features {
            Some(Box::new(crate::output::LogBus::new()))
        } else {
            None
        };

        Ok(Self {
            decoder: PacketDecoder::new(),
            flows: FlowTable::new(config.flow.clone()),
            extractor: FeatureExtractor::new(),
            rules,
            stats: Arc::new(Statistics::new()),
            stop: Arc::new(AtomicBool::new(false)),
            csv_writer,
            alert_writer,
            bus,
            bus_topic: config.output.bus_topic.clone(),
            print_alerts: config.output.print_alerts,
        })
    }

    /// Replace the feature bus transport.
    pub fn with_bus(mut self, bus: Box<dyn FeatureBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Cooperative stop flag, shared with embedders and the reporter.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn stats(&self) -> Arc<Statistics> {
        self.stats.clone()
    }

    pub fn decoder(&self) -> &PacketDecoder {
        &self.decoder
    }

    pub fn flow_table(&mut self) -> &mut FlowTable {
        &mut self.flows
    }

    pub fn rule_engine(&mut self) -> &mut RuleEngine {
        &mut self.rules
    }

    /// Run one frame through the full pipeline. Returns the alerts the
    /// frame produced; decode failures drop the frame and return nothing.
    pub fn process_frame(&mut self, data: &[u8], timestamp: DateTime<Utc>) -> Vec<Alert> {
        let pkt = match self.decoder.decode(data, timestamp) {
            Ok(pkt) => pkt,
            Err(e) => {
                self.stats.record_parse_error();
                debug!(error = %e, "dropped undecodable frame");
                return Vec::new();
            }
        };

        self.stats.record_packet(pkt.ipv4.protocol, pkt.raw_length as u64);

        let rejected_before = self.flows.stats.flows_rejected;
        self.flows.update(&pkt);
        if self.flows.stats.flows_rejected > rejected_before {
            self.stats.record_flow_rejected();
        }

        // Feature extraction is best-effort: absent flow (admission
        // rejection) simply skips export
        let features = self.flows.get(&pkt).map(|flow| self.extractor.extract(flow));
        if let Some(features) = features {
            if let Some(writer) = &mut self.csv_writer {
                if let Err(e) = writer.write(&features) {
                    self.stats.record_sink_error();
                    warn!(error = %e, "feature CSV write failed");
                }
            }
            if let Some(bus) = &mut self.bus {
                if let Err(e) = bus.publish(&self.bus_topic, &features.to_json()) {
                    self.stats.record_publish_error();
                    debug!(error = %e, "feature publish failed");
                }
            }
        }

        let regex_errors_before = self.rules.stats().regex_errors;
        let alerts = self.rules.evaluate(&pkt);
        let regex_errors = self.rules.stats().regex_errors - regex_errors_before;
        if regex_errors > 0 {
            self.stats.record_rule_errors(regex_errors);
        }

        for alert in &alerts {
            self.stats.record_alert(alert.severity);
            if let Some(writer) = &mut self.alert_writer {
                if let Err(e) = writer.write(alert) {
                    self.stats.record_sink_error();
                    warn!(error = %e, "alert log write failed");
                }
            }
            if self.print_alerts {
                print_alert(alert);
            }
        }

        alerts
    }

    /// Pull frames from the source until it is exhausted, the stop flag
    /// is raised, or the capture fails. Pending flows are dropped at
    /// shutdown, not flushed.
    pub fn run(&mut self, source: &mut dyn CaptureSource) -> Result<()> {
        info!(rules = self.rules.rule_count(), "pipeline started");

        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop requested, shutting down");
                break;
            }
            if source.is_exhausted() {
                info!("capture source exhausted");
                break;
            }

            match source.next_frame() {
                Ok(Some(frame)) => {
                    self.process_frame(frame.data, frame.timestamp);
                }
                Ok(None) => {
                    // Nothing right now (live read timeout); poll again
                    continue;
                }
                Err(e) => {
                    self.stats.record_capture_error();
                    error!(error = %e, "capture failed, shutting down");
                    break;
                }
            }
        }

        self.flush()?;
        info!("{}", self.stats.snapshot().render());
        Ok(())
    }

    /// Flush file-backed sinks.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = &mut self.csv_writer {
            writer.flush()?;
        }
        if let Some(writer) = &mut self.alert_writer {
            writer.flush()?;
        }
        Ok(())
    }
}
