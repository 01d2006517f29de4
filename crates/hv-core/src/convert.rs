//! End-to-end conversions from export inputs to channel records.
//!
//! Every pipeline writes into a caller-provided [`RecordSink`] and returns a
//! [`ConversionSummary`]; opening and finishing the sink is the caller's job.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta};
use serde::Serialize;
use thiserror::Error;

use crate::collect::{CollectOptions, MeasurementGroups, TimeWindow, collect};
use crate::ecg::{EcgError, read_ecg};
use crate::event_log::{EventLog, EventLogError};
use crate::index::ActivitySummary;
use crate::multiplex::{ChannelRegistry, ChannelStats};
use crate::record::{log_time_ns, parse_health_date};
use crate::resolve::resolve;
use crate::schema;
use crate::sink::{RecordSink, SinkError};
use crate::track::{TrackError, TranscodedPoint, read_track, transcode};

const WORKOUT_KEY: &str = "workout";
const WORKOUT_EVENT_KEY: &str = "workout_event";
const GEOJSON_KEY: &str = "geojson";
const LOCATION_KEY: &str = "location";
const ROUTE_METRICS_KEY: &str = "metrics";
const GPX_METRICS_KEY: &str = "gpx_metrics";
const ECG_KEY: &str = "ecg/lead_i";

/// Extension of every output file.
pub const OUTPUT_EXTENSION: &str = "mcap";

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Log(#[from] EventLogError),
    #[error(transparent)]
    Track(#[from] TrackError),
    #[error(transparent)]
    Ecg(#[from] EcgError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("activity has an invalid {field}: {value:?}")]
    InvalidActivityDate { field: &'static str, value: String },
    #[error("recording starts before the Unix epoch")]
    BeforeEpoch,
}

/// What a conversion wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionSummary {
    pub records: usize,
    pub channels: Vec<ChannelStats>,
}

impl ConversionSummary {
    fn from_registry<S: RecordSink>(registry: &ChannelRegistry<S>) -> Self {
        Self {
            records: registry.records_written(),
            channels: registry.stats(),
        }
    }

    /// Total out-of-order records across channels.
    pub fn regressions(&self) -> usize {
        self.channels.iter().map(|c| c.regressions).sum()
    }
}

/// Converts one activity: its summary, pause/resume events, route and the
/// measurements recorded while it ran.
///
/// `export_dir` is the directory holding the log; route references inside
/// the log are relative to it.
pub fn convert_workout<S: RecordSink>(
    log: &EventLog,
    activity: &ActivitySummary,
    export_dir: &Path,
    options: &CollectOptions,
    sink: S,
) -> Result<ConversionSummary, ConvertError> {
    let start = activity_date("start_date", &activity.start_date)?;
    let end = activity_date("end_date", &activity.end_date)?;
    let mut registry = ChannelRegistry::new(sink);

    let resolved = resolve(log, &activity.key())?;
    if resolved.is_found() {
        let handle = registry.get_or_create(WORKOUT_KEY, &schema::workout_summary())?;
        let log_time = log_time_ns(&start).ok_or(ConvertError::BeforeEpoch)?;
        registry.emit(handle, &resolved.attributes, log_time)?;
    }

    if !resolved.events.is_empty() {
        let handle = registry.get_or_create(WORKOUT_EVENT_KEY, &schema::workout_event())?;
        for event in &resolved.events {
            let Some(log_time) = log_time_ns(&event.timestamp) else {
                tracing::warn!(timestamp = %event.timestamp, "event before epoch, skipping");
                continue;
            };
            registry.emit(handle, event, log_time)?;
        }
    }

    match &resolved.track_path {
        Some(reference) => {
            let path = track_file(export_dir, reference);
            let points = transcode(&read_track(&path)?);
            emit_track(&mut registry, &points, TrackLayout::Combined)?;
        }
        None => tracing::info!(activity = %activity.activity_type, "activity has no route"),
    }

    let groups = collect(log, &TimeWindow::new(start, end), options)?;
    emit_measurements(&mut registry, &groups)?;

    Ok(ConversionSummary::from_registry(&registry))
}

/// Converts a route file together with the measurements recorded during it.
///
/// The window spans the first to the last track point, expressed in `offset`.
pub fn convert_route<S: RecordSink>(
    log: &EventLog,
    track_path: &Path,
    offset: FixedOffset,
    options: &CollectOptions,
    sink: S,
) -> Result<ConversionSummary, ConvertError> {
    let points = read_track(track_path)?;
    let mut registry = ChannelRegistry::new(sink);
    emit_track(&mut registry, &transcode(&points), TrackLayout::Combined)?;

    let first = points.iter().map(|p| p.time).min();
    let last = points.iter().map(|p| p.time).max();
    if let (Some(first), Some(last)) = (first, last) {
        let window = TimeWindow::new(first.with_timezone(&offset), last.with_timezone(&offset));
        let groups = collect(log, &window, options)?;
        emit_measurements(&mut registry, &groups)?;
    } else {
        tracing::warn!(path = %track_path.display(), "route has no points, no measurements collected");
    }

    Ok(ConversionSummary::from_registry(&registry))
}

/// Converts a route file on its own.
pub fn convert_track<S: RecordSink>(
    track_path: &Path,
    sink: S,
) -> Result<ConversionSummary, ConvertError> {
    let points = transcode(&read_track(track_path)?);
    let mut registry = ChannelRegistry::new(sink);
    emit_track(&mut registry, &points, TrackLayout::TrackOnly)?;
    Ok(ConversionSummary::from_registry(&registry))
}

/// Converts an electrocardiogram CSV export.
pub fn convert_ecg<S: RecordSink>(
    csv_path: &Path,
    sink: S,
) -> Result<ConversionSummary, ConvertError> {
    let recording = read_ecg(csv_path)?;
    let mut registry = ChannelRegistry::new(sink);
    let handle = registry.get_or_create(ECG_KEY, &schema::ecg())?;
    for (log_time, sample) in recording.timed_samples().ok_or(ConvertError::BeforeEpoch)? {
        registry.emit(handle, sample, log_time)?;
    }
    Ok(ConversionSummary::from_registry(&registry))
}

/// Converts every measurement starting on one calendar date in `offset`.
pub fn convert_day<S: RecordSink>(
    log: &EventLog,
    date: NaiveDate,
    offset: FixedOffset,
    options: &CollectOptions,
    sink: S,
) -> Result<ConversionSummary, ConvertError> {
    let window = day_window(date, offset);
    let mut registry = ChannelRegistry::new(sink);
    let groups = collect(log, &window, options)?;
    emit_measurements(&mut registry, &groups)?;
    Ok(ConversionSummary::from_registry(&registry))
}

/// Window covering `date` from midnight to the last nanosecond of the day.
pub fn day_window(date: NaiveDate, offset: FixedOffset) -> TimeWindow {
    let local_midnight = date.and_time(NaiveTime::MIN);
    let utc_offset = TimeDelta::seconds(i64::from(offset.local_minus_utc()));
    let start = (local_midnight - utc_offset).and_utc().with_timezone(&offset);
    let end = start + TimeDelta::days(1) - TimeDelta::nanoseconds(1);
    TimeWindow::new(start, end)
}

/// Output file name for an activity: `<type>-<start_date>.mcap`.
pub fn workout_file_name(activity: &ActivitySummary) -> String {
    format!(
        "{}-{}.{OUTPUT_EXTENSION}",
        sanitize_file_component(&activity.activity_type),
        sanitize_file_component(&activity.start_date)
    )
}

/// Output file name for a combined route conversion: `<stem>-combined.mcap`.
pub fn combined_file_name(track_path: &Path) -> String {
    format!("{}-combined.{OUTPUT_EXTENSION}", file_stem(track_path))
}

/// Output file name for a single-input conversion: `<stem>.mcap`.
pub fn stem_file_name(input: &Path) -> String {
    format!("{}.{OUTPUT_EXTENSION}", file_stem(input))
}

/// Output file name for a calendar-day conversion: `<YYYY-MM-DD>.mcap`.
pub fn day_file_name(date: NaiveDate) -> String {
    format!("{}.{OUTPUT_EXTENSION}", date.format("%Y-%m-%d"))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| "output".to_string(), |s| sanitize_file_component(&s.to_string_lossy()))
}

/// Replaces characters that are awkward in file names.
pub fn sanitize_file_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            ':' | '/' | '\\' => '-',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

fn activity_date(field: &'static str, value: &str) -> Result<DateTime<FixedOffset>, ConvertError> {
    parse_health_date(value).ok_or_else(|| ConvertError::InvalidActivityDate {
        field,
        value: value.to_string(),
    })
}

/// Resolves a log route reference (`/workout-routes/x.gpx`) against the export directory.
fn track_file(export_dir: &Path, reference: &str) -> PathBuf {
    export_dir.join(reference.trim_start_matches('/'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackLayout {
    /// `geojson`, `location` and `metrics` channels.
    Combined,
    /// `geojson` and `gpx_metrics` channels.
    TrackOnly,
}

fn emit_track<S: RecordSink>(
    registry: &mut ChannelRegistry<S>,
    points: &[TranscodedPoint],
    layout: TrackLayout,
) -> Result<(), SinkError> {
    if points.is_empty() {
        return Ok(());
    }

    let geo = registry.get_or_create(GEOJSON_KEY, &schema::geojson())?;
    let (location, metrics) = match layout {
        TrackLayout::Combined => (
            Some(registry.get_or_create(LOCATION_KEY, &schema::location_fix())?),
            registry.get_or_create(ROUTE_METRICS_KEY, &schema::route_metrics("route_metrics"))?,
        ),
        TrackLayout::TrackOnly => (
            None,
            registry.get_or_create(GPX_METRICS_KEY, &schema::route_metrics("gpx_metrics"))?,
        ),
    };

    for point in points {
        registry.emit(geo, &point.geo, point.log_time)?;
        if let Some(location) = location {
            registry.emit(location, &point.fix, point.log_time)?;
        }
        registry.emit(metrics, &point.metrics, point.log_time)?;
    }
    tracing::debug!(points = points.len(), ?layout, "emitted track");
    Ok(())
}

fn emit_measurements<S: RecordSink>(
    registry: &mut ChannelRegistry<S>,
    groups: &MeasurementGroups,
) -> Result<(), SinkError> {
    let measurement_schema = schema::workout_metrics();
    for group in groups.iter() {
        let handle = registry.get_or_create(&group.key, &measurement_schema)?;
        for record in &group.records {
            registry.emit(handle, record, record.log_time)?;
        }
    }
    Ok(())
}
