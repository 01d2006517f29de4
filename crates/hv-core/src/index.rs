//! Activity index: a sidecar cache of workout summaries built from the log.
//!
//! Scanning a multi-hundred-megabyte export on every invocation is too slow,
//! so the first run writes `workout_cache.json` next to the log and later runs
//! read it back. The cache is not checked against the log; a stale cache is
//! only refreshed by deleting it or running a forced rebuild.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event_log::{EventLog, EventLogError};
use crate::record::{EventRecord, strip_type_prefix};

/// File name of the sidecar index, colocated with the log.
pub const INDEX_FILE_NAME: &str = "workout_cache.json";

/// Tag of activity elements in the log.
pub const WORKOUT_TAG: &str = "Workout";

const ACTIVITY_TYPE_PREFIXES: &[&str] = &["HKWorkoutActivityType"];

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Log(#[from] EventLogError),
}

/// Summary of one recorded activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    /// Activity type with the `HKWorkoutActivityType` prefix removed.
    #[serde(rename = "type")]
    pub activity_type: String,
    pub source_name: String,
    pub source_version: String,
    pub duration: f64,
    pub duration_unit: String,
    pub start_date: String,
    pub end_date: String,
    #[serde(default)]
    pub device: Option<String>,
}

/// Composite key used to find an activity again in the log.
///
/// Not unique: two activities can share all four fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityKey<'a> {
    pub start_date: &'a str,
    pub end_date: &'a str,
    pub source_name: &'a str,
    pub source_version: &'a str,
}

impl ActivityKey<'_> {
    /// Exact string match of all four key fields against a log element.
    pub fn matches(&self, record: &EventRecord) -> bool {
        record.attr("startDate").unwrap_or_default() == self.start_date
            && record.attr("endDate").unwrap_or_default() == self.end_date
            && record.attr("sourceName").unwrap_or_default() == self.source_name
            && record.attr("sourceVersion").unwrap_or_default() == self.source_version
    }
}

impl ActivitySummary {
    /// Builds a summary from a `Workout` element, defaulting missing fields.
    pub fn from_record(record: &EventRecord) -> Self {
        let raw_type = record.attr("workoutActivityType").unwrap_or_default();
        let duration = record
            .attr("duration")
            .and_then(|d| d.trim().parse::<f64>().ok())
            .unwrap_or(0.0);
        Self {
            activity_type: strip_type_prefix(raw_type, ACTIVITY_TYPE_PREFIXES).to_string(),
            source_name: record.attr_owned("sourceName").unwrap_or_default(),
            source_version: record.attr_owned("sourceVersion").unwrap_or_default(),
            duration,
            duration_unit: record.attr_owned("durationUnit").unwrap_or_default(),
            start_date: record.attr_owned("startDate").unwrap_or_default(),
            end_date: record.attr_owned("endDate").unwrap_or_default(),
            device: record.attr_owned("device"),
        }
    }

    pub fn key(&self) -> ActivityKey<'_> {
        ActivityKey {
            start_date: &self.start_date,
            end_date: &self.end_date,
            source_name: &self.source_name,
            source_version: &self.source_version,
        }
    }
}

/// Returns the sidecar path for a log file.
pub fn index_path(log_path: &Path) -> PathBuf {
    log_path
        .parent()
        .map_or_else(|| PathBuf::from(INDEX_FILE_NAME), |dir| dir.join(INDEX_FILE_NAME))
}

/// Loads the sidecar index, rebuilding it from the log when absent or corrupt.
///
/// Summaries are sorted by `start_date`, most recent first.
pub fn load_or_build(log: &EventLog) -> Result<Vec<ActivitySummary>, IndexError> {
    let path = index_path(log.path());
    if let Some(summaries) = load_index(&path) {
        tracing::info!(path = %path.display(), count = summaries.len(), "loaded activity index");
        return Ok(summaries);
    }
    rebuild(log)
}

/// Rebuilds the index from the log and persists it.
pub fn rebuild(log: &EventLog) -> Result<Vec<ActivitySummary>, IndexError> {
    tracing::info!(path = %log.path().display(), "building activity index");
    let summaries = scan_activities(log)?;
    save_index(&index_path(log.path()), &summaries);
    Ok(summaries)
}

/// Scans the log once and returns every activity, most recent first.
pub fn scan_activities(log: &EventLog) -> Result<Vec<ActivitySummary>, IndexError> {
    let mut summaries = Vec::new();
    for record in log.records_tagged(&[WORKOUT_TAG])? {
        summaries.push(ActivitySummary::from_record(&record?));
    }
    // Fixed-width dates compare chronologically as strings. Stable sort keeps
    // log order among equal start dates.
    summaries.sort_by(|a, b| b.start_date.cmp(&a.start_date));
    Ok(summaries)
}

/// Reads the sidecar. Any failure other than "not found" deletes it.
fn load_index(path: &Path) -> Option<Vec<ActivitySummary>> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable activity index, rebuilding");
            discard_index(path);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(summaries) => Some(summaries),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "invalid activity index, rebuilding");
            discard_index(path);
            None
        }
    }
}

fn discard_index(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to delete activity index");
    }
}

/// Writes the sidecar atomically. Failures are logged, not returned.
fn save_index(path: &Path, summaries: &[ActivitySummary]) {
    let content = match serde_json::to_string(summaries) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize activity index");
            return;
        }
    };

    let tmp_path = path.with_extension("tmp");
    if let Err(e) = fs::write(&tmp_path, &content) {
        tracing::warn!(path = %tmp_path.display(), error = %e, "failed to write activity index");
        return;
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        tracing::warn!(
            from = %tmp_path.display(),
            to = %path.display(),
            error = %e,
            "failed to rename activity index"
        );
        let _ = fs::remove_file(&tmp_path);
        return;
    }

    tracing::info!(path = %path.display(), count = summaries.len(), "wrote activity index");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<HealthData locale="en_US">
 <Record type="HKQuantityTypeIdentifierHeartRate" startDate="2024-05-01 08:05:00 -0400" value="120"/>
 <Workout workoutActivityType="HKWorkoutActivityTypeWalking" duration="30.5" durationUnit="min" sourceName="Watch" sourceVersion="10.1" device="&lt;&lt;HKDevice&gt;&gt;" startDate="2024-04-30 18:00:00 -0400" endDate="2024-04-30 18:30:30 -0400">
  <MetadataEntry key="HKIndoorWorkout" value="0"/>
 </Workout>
 <Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="42" durationUnit="min" sourceName="Watch" sourceVersion="10.1" startDate="2024-05-01 08:00:00 -0400" endDate="2024-05-01 08:42:00 -0400"/>
 <Workout workoutActivityType="HKWorkoutActivityTypeCycling" sourceName="Phone" startDate="2023-12-31 23:00:00 -0500" endDate="2024-01-01 00:10:00 -0500"/>
</HealthData>
"#;

    fn write_log(dir: &TempDir) -> EventLog {
        let path = dir.path().join("export.xml");
        fs::write(&path, LOG).unwrap();
        EventLog::open(path).unwrap()
    }

    #[test]
    fn build_sorts_most_recent_first() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir);

        let summaries = load_or_build(&log).unwrap();

        let starts: Vec<&str> = summaries.iter().map(|s| s.start_date.as_str()).collect();
        assert_eq!(
            starts,
            vec![
                "2024-05-01 08:00:00 -0400",
                "2024-04-30 18:00:00 -0400",
                "2023-12-31 23:00:00 -0500",
            ]
        );
        assert_eq!(summaries[0].activity_type, "Running");
        assert_eq!(summaries[1].device.as_deref(), Some("<<HKDevice>>"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir);

        let summaries = scan_activities(&log).unwrap();
        let cycling = &summaries[2];

        assert_eq!(cycling.activity_type, "Cycling");
        assert_eq!(cycling.source_version, "");
        assert_eq!(cycling.duration_unit, "");
        assert!(cycling.device.is_none());
        assert!(cycling.duration.abs() < f64::EPSILON);
    }

    #[test]
    fn build_writes_sidecar_next_to_log() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir);

        load_or_build(&log).unwrap();

        assert!(dir.path().join(INDEX_FILE_NAME).exists());
        assert!(!dir.path().join("workout_cache.tmp").exists());
    }

    #[test]
    fn rebuild_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir);

        let first = rebuild(&log).unwrap();
        let first_bytes = fs::read(dir.path().join(INDEX_FILE_NAME)).unwrap();
        let second = rebuild(&log).unwrap();
        let second_bytes = fs::read(dir.path().join(INDEX_FILE_NAME)).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn loads_from_sidecar_without_rescanning() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir);
        let built = load_or_build(&log).unwrap();

        // A log change is not noticed while the sidecar is valid.
        fs::write(log.path(), "<HealthData/>").unwrap();
        let loaded = load_or_build(&log).unwrap();

        assert_eq!(built, loaded);
    }

    #[test]
    fn corrupt_sidecar_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir);
        fs::write(dir.path().join(INDEX_FILE_NAME), "{not json").unwrap();

        let summaries = load_or_build(&log).unwrap();

        assert_eq!(summaries.len(), 3);
        let repaired = fs::read_to_string(dir.path().join(INDEX_FILE_NAME)).unwrap();
        let parsed: Vec<ActivitySummary> = serde_json::from_str(&repaired).unwrap();
        assert_eq!(parsed, summaries);
    }

    #[test]
    fn sidecar_with_wrong_shape_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let log = write_log(&dir);
        fs::write(dir.path().join(INDEX_FILE_NAME), r#"[{"type": 3}]"#).unwrap();

        let summaries = load_or_build(&log).unwrap();
        assert_eq!(summaries.len(), 3);
    }

    #[test]
    fn summary_serializes_type_field() {
        let summary = ActivitySummary {
            activity_type: "Running".to_string(),
            source_name: "Watch".to_string(),
            source_version: "10.1".to_string(),
            duration: 42.0,
            duration_unit: "min".to_string(),
            start_date: "2024-05-01 08:00:00 -0400".to_string(),
            end_date: "2024-05-01 08:42:00 -0400".to_string(),
            device: None,
        };
        let json = serde_json::to_string(&summary).unwrap();
        insta::assert_snapshot!(json, @r#"{"type":"Running","source_name":"Watch","source_version":"10.1","duration":42.0,"duration_unit":"min","start_date":"2024-05-01 08:00:00 -0400","end_date":"2024-05-01 08:42:00 -0400","device":null}"#);
    }

    #[test]
    fn key_matches_all_four_fields() {
        let mut record = EventRecord::new(WORKOUT_TAG);
        for (k, v) in [
            ("startDate", "2024-05-01 08:00:00 -0400"),
            ("endDate", "2024-05-01 08:42:00 -0400"),
            ("sourceName", "Watch"),
            ("sourceVersion", "10.1"),
        ] {
            record.attributes.insert(k.to_string(), v.to_string());
        }
        let summary = ActivitySummary::from_record(&record);
        assert!(summary.key().matches(&record));

        record
            .attributes
            .insert("sourceVersion".to_string(), "10.2".to_string());
        assert!(!summary.key().matches(&record));
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(EventLog::open(dir.path().join("export.xml")).is_err());
    }
}
