//! CSV feature sink
//!
//! Writes the 76-column header on creation, then one fixed-point row per
//! published feature vector.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::features::{csv_header, FeatureVector};

pub struct CsvFeatureWriter {
    writer: BufWriter<File>,
    rows_written: u64,
}

impl CsvFeatureWriter {
    /// Create (truncate) the file and write the header row.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.as_ref().display()))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", csv_header()).context("failed to write CSV header")?;
        info!(file = %path.as_ref().display(), "feature CSV export enabled");
        Ok(Self { writer, rows_written: 0 })
    }

    pub fn write(&mut self, features: &FeatureVector) -> Result<()> {
        writeln!(self.writer, "{}", features.to_csv_row()).context("failed to write CSV row")?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("failed to flush feature CSV")
    }
}

impl Drop for CsvFeatureWriter {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
