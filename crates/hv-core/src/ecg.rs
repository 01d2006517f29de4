//! Electrocardiogram CSV exports.
//!
//! Each file starts with `key,value` header rows (`Recorded Date`,
//! `Sample Rate`, ...) followed by one voltage reading per row.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use thiserror::Error;

use crate::record::{log_time_ns, parse_health_date};

const RECORDED_DATE_KEY: &str = "Recorded Date";
const SAMPLE_RATE_KEY: &str = "Sample Rate";

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

#[derive(Debug, Error)]
pub enum EcgError {
    #[error("ECG file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read ECG CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("sample rate not found in ECG file")]
    MissingSampleRate,
    #[error("invalid sample rate: {0:?}")]
    InvalidSampleRate(String),
    #[error("recorded date not found in ECG file")]
    MissingRecordedDate,
    #[error("invalid recorded date: {0:?}")]
    InvalidRecordedDate(String),
}

/// One voltage reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EcgSample {
    pub voltage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EcgRecording {
    pub recorded: DateTime<FixedOffset>,
    pub sample_rate_hz: f64,
    pub samples: Vec<EcgSample>,
}

impl EcgRecording {
    /// Spacing between consecutive samples, truncated to whole nanoseconds.
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "rate is validated positive and finite"
    )]
    pub fn sample_interval_ns(&self) -> u64 {
        (NANOS_PER_SECOND / self.sample_rate_hz) as u64
    }

    /// Samples paired with their log time; `None` if the recorded date is before the epoch.
    pub fn timed_samples(&self) -> Option<impl Iterator<Item = (u64, &EcgSample)> + '_> {
        let start = log_time_ns(&self.recorded)?;
        let interval = self.sample_interval_ns();
        Some(
            self.samples
                .iter()
                .zip(0u64..)
                .map(move |(sample, i)| (start + i * interval, sample)),
        )
    }
}

/// Reads an ECG export from disk.
pub fn read_ecg(path: &Path) -> Result<EcgRecording, EcgError> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EcgError::NotFound(path.to_path_buf())
        } else {
            EcgError::Io(e)
        }
    })?;
    let recording = parse_ecg(file)?;
    tracing::info!(
        path = %path.display(),
        samples = recording.samples.len(),
        rate_hz = recording.sample_rate_hz,
        "parsed ECG recording"
    );
    Ok(recording)
}

pub fn parse_ecg<R: Read>(source: R) -> Result<EcgRecording, EcgError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(source);
    let mut rows = reader.records();

    let mut recorded_raw = None;
    let mut rate_raw = None;
    for row in rows.by_ref() {
        let row = row?;
        let key = row.get(0).unwrap_or_default().trim();
        let value = row.get(1).unwrap_or_default().trim();
        if key.starts_with(RECORDED_DATE_KEY) {
            recorded_raw = Some(value.to_string());
        } else if key.starts_with(SAMPLE_RATE_KEY) {
            rate_raw = Some(value.to_string());
            break;
        }
    }

    let rate_raw = rate_raw.ok_or(EcgError::MissingSampleRate)?;
    let sample_rate_hz = parse_sample_rate(&rate_raw)?;
    let recorded_raw = recorded_raw.ok_or(EcgError::MissingRecordedDate)?;
    let recorded =
        parse_health_date(&recorded_raw).ok_or(EcgError::InvalidRecordedDate(recorded_raw))?;

    let mut samples = Vec::new();
    for row in rows {
        let row = row?;
        let Some(first) = row.get(0).map(str::trim).filter(|f| !f.is_empty()) else {
            continue;
        };
        match first.parse::<f64>() {
            Ok(voltage) => samples.push(EcgSample { voltage }),
            Err(_) => tracing::debug!(row = first, "skipping non-sample ECG row"),
        }
    }

    Ok(EcgRecording {
        recorded,
        sample_rate_hz,
        samples,
    })
}

/// Parses values like `512 Hertz`.
fn parse_sample_rate(raw: &str) -> Result<f64, EcgError> {
    raw.split_whitespace()
        .next()
        .and_then(|n| n.parse::<f64>().ok())
        .filter(|r| r.is_finite() && *r > 0.0)
        .ok_or_else(|| EcgError::InvalidSampleRate(raw.to_string()))
}
