//! Telemetry sink
//!
//! Completed samples go to a sink that may fail; failures are reported to
//! the operator but never interrupt the relay. The bridge ships a JSONL file
//! sink; the trait keeps the relay ignorant of where samples actually land.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::accumulate::SampleFields;

/// Errors a sink write can produce
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Underlying storage write failed
    #[error("telemetry write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded
    #[error("telemetry encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for completed measurement samples
pub trait TelemetrySink {
    /// Persist one complete sample under the given measurement name
    fn write(&mut self, measurement: &str, fields: &SampleFields) -> Result<(), TelemetryError>;

    /// Human-readable description for the status display
    fn describe(&self) -> String;
}

#[derive(Serialize)]
struct TelemetryRecord<'a> {
    measurement: &'a str,
    ts: String,
    seq: u64,
    fields: &'a SampleFields,
}

/// Append-only JSONL file sink, one record per completed sample
pub struct JsonlSink {
    path: String,
    file: File,
    seq: u64,
}

impl JsonlSink {
    /// Open (or create) the sink file in append mode
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_string_lossy().into_owned(),
            file,
            seq: 0,
        })
    }
}

impl TelemetrySink for JsonlSink {
    fn write(&mut self, measurement: &str, fields: &SampleFields) -> Result<(), TelemetryError> {
        let record = TelemetryRecord {
            measurement,
            ts: now_rfc3339(),
            seq: self.seq,
            fields,
        };
        let line = serde_json::to_string(&record)?;
        writeln!(self.file, "{line}")?;
        self.file.flush()?;
        self.seq += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("jsonl {}", self.path)
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// In-memory sink for tests
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Every record written so far
    pub records: Vec<(String, SampleFields)>,
    /// When set, every write fails
    pub fail_writes: bool,
}

impl MemorySink {
    /// Create an empty sink that accepts all writes
    pub fn new() -> Self {
        Self::default()
    }
}

impl TelemetrySink for MemorySink {
    fn write(&mut self, measurement: &str, fields: &SampleFields) -> Result<(), TelemetryError> {
        if self.fail_writes {
            return Err(TelemetryError::Io(std::io::Error::other(
                "sink unavailable",
            )));
        }
        self.records.push((measurement.to_string(), fields.clone()));
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
