//! Feature bus publishing
//!
//! Two-frame messages: a topic string followed by a JSON body whose keys
//! are the CSV column names. The transport is behind the `FeatureBus`
//! trait; publish failures are counted by the pipeline and never stop
//! packet processing.

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::debug;

/// Default topic for feature records
pub const DEFAULT_TOPIC: &str = "features";

/// One two-frame bus message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
}

/// Publish transport for feature records
pub trait FeatureBus: Send {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<()>;

    /// Messages successfully handed to the transport
    fn sent(&self) -> u64;
}

/// Logging transport: counts messages and emits them at debug level.
/// Useful when no consumer is attached.
#[derive(Debug, Default)]
pub struct LogBus {
    sent: u64,
}

impl LogBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureBus for LogBus {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<()> {
        debug!(topic, bytes = payload.len(), "publishing feature record");
        self.sent += 1;
        Ok(())
    }

    fn sent(&self) -> u64 {
        self.sent
    }
}

/// In-process transport over a bounded channel. The receiving side gets
/// the two frames as one `BusMessage`.
pub struct ChannelBus {
    tx: Sender<BusMessage>,
    sent: u64,
}

impl ChannelBus {
    /// Create a bus with the given capacity and hand back the consumer end.
    pub fn channel(capacity: usize) -> (Self, Receiver<BusMessage>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx, sent: 0 }, rx)
    }
}

impl FeatureBus for ChannelBus {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<()> {
        let msg = BusMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
        };
        match self.tx.try_send(msg) {
            Ok(()) => {
                self.sent += 1;
                Ok(())
            }
            Err(TrySendError::Full(_)) => anyhow::bail!("feature bus full"),
            Err(TrySendError::Disconnected(_)) => anyhow::bail!("feature bus disconnected"),
        }
    }

    fn sent(&self) -> u64 {
        self.sent
    }
}
