//! Sensor log sinks.
//!
//! [`CsvSensorLog`] appends one line per logging interval to a CSV file
//! (header written when the file is new). [`LogSensorSink`] writes the
//! same record through the `log` facade for runs without a log file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;

use crate::app::ports::SensorLogSink;
use crate::sensors::fusion::{CSV_HEADER, SensorLogRecord};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Append-only CSV file.
pub struct CsvSensorLog {
    path: PathBuf,
    file: File,
}

impl CsvSensorLog {
    /// Open `path` for appending, writing the header if the file is empty.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", CSV_HEADER)?;
        }
        info!("SENSOR: logging to {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SensorLogSink for CsvSensorLog {
    fn append(&mut self, record: &SensorLogRecord) -> std::io::Result<()> {
        writeln!(self.file, "{}", record.to_csv_line(&timestamp()))?;
        self.file.flush()
    }
}

/// Adapter that writes every record to the logger.
pub struct LogSensorSink;

impl LogSensorSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogSensorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorLogSink for LogSensorSink {
    fn append(&mut self, record: &SensorLogRecord) -> std::io::Result<()> {
        info!(
            "SENSOR | T={:.2}\u{00b0}C | H={:.2}% | P={:.2}hPa | dT={:.2} dH={:.2} dP={:.2} | {}",
            record.fused.temperature_c,
            record.fused.humidity_pct,
            record.fused.pressure_hpa,
            record.diff.temperature_c,
            record.diff.humidity_pct,
            record.diff.pressure_hpa,
            record.disagreement,
        );
        Ok(())
    }
}
