use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::capture::CaptureConfig;
use crate::flow::FlowConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub flow: FlowConfig,

    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or fall back to defaults
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/flowsentry/config.toml"),
            PathBuf::from("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;
        Ok(())
    }
}

/// Rule engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Install the stock detection rules on startup
    #[serde(default = "default_true")]
    pub use_defaults: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            use_defaults: default_true(),
        }
    }
}

/// Output sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Feature CSV export path (disabled when unset)
    #[serde(default)]
    pub features_csv: Option<PathBuf>,

    /// Alert JSONL log path (disabled when unset)
    #[serde(default)]
    pub alerts_file: Option<PathBuf>,

    /// Print alerts to stdout
    #[serde(default = "default_true")]
    pub print_alerts: bool,

    /// Publish feature records on the in-process bus
    #[serde(default)]
    pub publish_features: bool,

    /// Topic for published feature records
    #[serde(default = "default_bus_topic")]
    pub bus_topic: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            features_csv: None,
            alerts_file: None,
            print_alerts: default_true(),
            publish_features: false,
            bus_topic: default_bus_topic(),
        }
    }
}

/// Statistics reporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Summary line interval in seconds
    #[serde(default = "default_stats_interval")]
    pub interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_stats_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_bus_topic() -> String {
    "features".to_string()
}

fn default_stats_interval() -> u64 {
    5
}
