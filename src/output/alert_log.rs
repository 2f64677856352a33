//! Alert outputs
//!
//! JSONL file writer (one JSON object per line) and the colored console
//! renderer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

use crate::rules::{Alert, Severity};

/// Append-mode JSONL alert log
pub struct AlertWriter {
    writer: BufWriter<File>,
    alerts_written: u64,
}

impl AlertWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open alert log {}", path.as_ref().display()))?;
        info!(file = %path.as_ref().display(), "alert log enabled");
        Ok(Self {
            writer: BufWriter::new(file),
            alerts_written: 0,
        })
    }

    pub fn write(&mut self, alert: &Alert) -> Result<()> {
        writeln!(self.writer, "{}", alert.to_json_line()).context("failed to write alert")?;
        self.alerts_written += 1;
        Ok(())
    }

    pub fn alerts_written(&self) -> u64 {
        self.alerts_written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("failed to flush alert log")
    }
}

impl Drop for AlertWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Severity-colored console rendering
pub fn print_alert(alert: &Alert) {
    let text = alert.to_string();
    let colored = match alert.severity {
        Severity::Critical => text.red().bold(),
        Severity::High => text.red(),
        Severity::Medium => text.yellow(),
        Severity::Low => text.green(),
    };
    println!("{}\n", colored);
}
