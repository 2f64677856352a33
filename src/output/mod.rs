//! Output sinks: CSV feature export, feature bus publishing, alert log

pub mod alert_log;
pub mod csv;
pub mod publisher;

pub use alert_log::{print_alert, AlertWriter};
pub use csv::CsvFeatureWriter;
pub use publisher::{BusMessage, ChannelBus, FeatureBus, LogBus};
