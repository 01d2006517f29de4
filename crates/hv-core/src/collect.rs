//! Time-window collection of measurement records from the event log.
//!
//! A window pass must touch every element of a huge log, so records are
//! rejected by a plain string test on the calendar-date prefix of their
//! `startDate` first. Only survivors have their dates parsed and compared.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::event_log::{EventLog, EventLogError};
use crate::record::{
    DATE_PREFIX_LEN, EventRecord, log_time_ns, parse_health_date, strip_type_prefix,
};

const MEASUREMENT_TYPE_PREFIXES: &[&str] = &["HKQuantityTypeIdentifier", "HKCategoryTypeIdentifier"];

/// Which record attribute provides the emitted timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampField {
    #[default]
    CreationDate,
    StartDate,
    EndDate,
}

impl TimestampField {
    pub const fn attribute(self) -> &'static str {
        match self {
            Self::CreationDate => "creationDate",
            Self::StartDate => "startDate",
            Self::EndDate => "endDate",
        }
    }
}

/// Closed interval `[start, end]` of one activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    prefixes: Vec<String>,
}

impl TimeWindow {
    /// Creates a window. Date prefixes are taken in `start`'s offset.
    ///
    /// `end` before `start` yields a window that matches nothing.
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        let first = start.format("%Y-%m-%d").to_string();
        let last = end.with_timezone(start.offset()).format("%Y-%m-%d").to_string();
        let mut prefixes = vec![first];
        if end > start && last != prefixes[0] {
            tracing::warn!(
                start = %start,
                end = %end,
                "window crosses midnight; records on the second date are only found if the log keeps them in date order"
            );
            prefixes.push(last);
        }
        Self {
            start,
            end,
            prefixes,
        }
    }

    pub const fn start(&self) -> &DateTime<FixedOffset> {
        &self.start
    }

    pub const fn end(&self) -> &DateTime<FixedOffset> {
        &self.end
    }

    /// Calendar-date prefixes (`YYYY-MM-DD`) a record must start with.
    pub fn date_prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Cheap first-stage test: no date parsing.
    pub fn matches_prefix(&self, start_date: &str) -> bool {
        start_date.len() >= DATE_PREFIX_LEN
            && self.prefixes.iter().any(|p| start_date.starts_with(p.as_str()))
    }
}

/// One measurement from the log, as written to its channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    #[serde(skip)]
    pub record_type: String,
    pub unit: Option<String>,
    pub value: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub source_name: Option<String>,
    pub source_version: Option<String>,
    pub device: Option<String>,
    pub creation_date: Option<String>,
    pub tag: String,
    /// Nanoseconds since the epoch, derived from the configured timestamp field.
    #[serde(skip)]
    pub log_time: u64,
}

impl MeasurementRecord {
    fn from_record(record: &EventRecord, record_type: String, log_time: u64) -> Self {
        Self {
            record_type,
            unit: record.attr_owned("unit"),
            value: record.attr_owned("value"),
            start_date: record.attr_owned("startDate"),
            end_date: record.attr_owned("endDate"),
            source_name: record.attr_owned("sourceName"),
            source_version: record.attr_owned("sourceVersion"),
            device: record.attr_owned("device"),
            creation_date: record.attr_owned("creationDate"),
            tag: record.tag.clone(),
            log_time,
        }
    }
}

/// Records sharing one normalized type key, in log order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementGroup {
    pub key: String,
    pub records: Vec<MeasurementRecord>,
}

/// Measurement groups ordered by first appearance in the log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeasurementGroups {
    groups: Vec<MeasurementGroup>,
    positions: HashMap<String, usize>,
}

impl MeasurementGroups {
    pub fn push(&mut self, key: &str, record: MeasurementRecord) {
        let idx = if let Some(&idx) = self.positions.get(key) {
            idx
        } else {
            self.groups.push(MeasurementGroup {
                key: key.to_string(),
                records: Vec::new(),
            });
            self.positions.insert(key.to_string(), self.groups.len() - 1);
            self.groups.len() - 1
        };
        self.groups[idx].records.push(record);
    }

    pub fn get(&self, key: &str) -> Option<&MeasurementGroup> {
        self.positions.get(key).map(|&idx| &self.groups[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeasurementGroup> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of records across all groups.
    pub fn record_count(&self) -> usize {
        self.groups.iter().map(|g| g.records.len()).sum()
    }
}

/// Filtering options for a window pass.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Records from these sources are skipped.
    pub excluded_sources: Vec<String>,
    pub timestamp_field: TimestampField,
}

/// Outcome of testing one record against the window.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Skip,
    Stop,
    Keep(String, MeasurementRecord),
}

/// Collects every record whose start falls inside `window`, grouped by type.
///
/// The scan stops at the first prefix-matching record that starts after the
/// window ends; the log keeps same-date records in time order.
pub fn collect(
    log: &EventLog,
    window: &TimeWindow,
    options: &CollectOptions,
) -> Result<MeasurementGroups, EventLogError> {
    tracing::info!(
        start = %window.start(),
        end = %window.end(),
        prefixes = ?window.date_prefixes(),
        "collecting measurements"
    );

    let mut groups = MeasurementGroups::default();
    let mut scanned = 0usize;
    for record in log.records()? {
        let record = record?;
        scanned += 1;
        match evaluate(&record, window, options) {
            Verdict::Skip => {}
            Verdict::Stop => {
                tracing::debug!(scanned, "passed end of window, stopping scan");
                break;
            }
            Verdict::Keep(key, measurement) => groups.push(&key, measurement),
        }
    }

    tracing::info!(
        scanned,
        types = groups.len(),
        records = groups.record_count(),
        "collected measurements"
    );
    Ok(groups)
}

fn evaluate(record: &EventRecord, window: &TimeWindow, options: &CollectOptions) -> Verdict {
    if record
        .attr("sourceName")
        .is_some_and(|s| options.excluded_sources.iter().any(|e| e == s))
    {
        return Verdict::Skip;
    }

    let Some(start_date) = record.attr("startDate") else {
        return Verdict::Skip;
    };
    if !window.matches_prefix(start_date) {
        return Verdict::Skip;
    }

    let Some(started) = parse_health_date(start_date) else {
        tracing::warn!(start_date, "invalid startDate, skipping record");
        return Verdict::Skip;
    };
    if started < *window.start() {
        return Verdict::Skip;
    }
    if started > *window.end() {
        return Verdict::Stop;
    }

    let Some(raw_type) = record.attr("type") else {
        tracing::warn!(tag = %record.tag, start_date, "record has no type, skipping");
        return Verdict::Skip;
    };

    let field = options.timestamp_field.attribute();
    let log_time = record
        .attr(field)
        .and_then(parse_health_date)
        .and_then(|dt| log_time_ns(&dt));
    let Some(log_time) = log_time else {
        tracing::warn!(field, value = ?record.attr(field), "invalid record timestamp, skipping");
        return Verdict::Skip;
    };

    let key = strip_type_prefix(raw_type, MEASUREMENT_TYPE_PREFIXES).to_string();
    let measurement = MeasurementRecord::from_record(record, raw_type.to_string(), log_time);
    Verdict::Keep(key, measurement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn window(start: &str, end: &str) -> TimeWindow {
        TimeWindow::new(
            DateTime::parse_from_rfc3339(start).unwrap(),
            DateTime::parse_from_rfc3339(end).unwrap(),
        )
    }

    fn record(attrs: &[(&str, &str)]) -> EventRecord {
        let mut r = EventRecord::new("Record");
        for (k, v) in attrs {
            r.attributes.insert((*k).to_string(), (*v).to_string());
        }
        r
    }

    fn heart_rate(start: &str) -> EventRecord {
        record(&[
            ("type", "HKQuantityTypeIdentifierHeartRate"),
            ("sourceName", "Watch"),
            ("unit", "count/min"),
            ("value", "120"),
            ("startDate", start),
            ("endDate", start),
            ("creationDate", start),
        ])
    }

    fn activity_window() -> TimeWindow {
        window("2024-05-01T08:00:05-04:00", "2024-05-01T08:10:00-04:00")
    }

    #[test]
    fn record_before_window_is_excluded() {
        let verdict = evaluate(
            &heart_rate("2024-05-01 08:00:00 -0400"),
            &activity_window(),
            &CollectOptions::default(),
        );
        assert_eq!(verdict, Verdict::Skip);
    }

    #[test]
    fn record_inside_window_is_kept() {
        let verdict = evaluate(
            &heart_rate("2024-05-01 08:05:00 -0400"),
            &activity_window(),
            &CollectOptions::default(),
        );
        let Verdict::Keep(key, measurement) = verdict else {
            panic!("expected record to be kept, got {verdict:?}");
        };
        assert_eq!(key, "HeartRate");
        assert_eq!(measurement.value.as_deref(), Some("120"));
        assert_eq!(measurement.tag, "Record");
        assert_eq!(
            measurement.log_time,
            log_time_ns(&parse_health_date("2024-05-01 08:05:00 -0400").unwrap()).unwrap()
        );
    }

    #[test]
    fn other_date_is_rejected_by_prefix_alone() {
        let window = activity_window();
        assert!(!window.matches_prefix("2024-05-02 00:00:00 -0400"));
        // An unparsable tail after a foreign prefix never reaches the parser.
        let verdict = evaluate(
            &heart_rate("2024-05-02 garbage"),
            &window,
            &CollectOptions::default(),
        );
        assert_eq!(verdict, Verdict::Skip);
    }

    #[test]
    fn record_after_window_stops_scan() {
        let verdict = evaluate(
            &heart_rate("2024-05-01 08:10:01 -0400"),
            &activity_window(),
            &CollectOptions::default(),
        );
        assert_eq!(verdict, Verdict::Stop);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let options = CollectOptions::default();
        for start in ["2024-05-01 08:00:05 -0400", "2024-05-01 08:10:00 -0400"] {
            assert!(matches!(
                evaluate(&heart_rate(start), &activity_window(), &options),
                Verdict::Keep(..)
            ));
        }
    }

    #[test]
    fn missing_type_is_skipped() {
        let r = record(&[
            ("startDate", "2024-05-01 08:05:00 -0400"),
            ("creationDate", "2024-05-01 08:05:00 -0400"),
        ]);
        assert_eq!(
            evaluate(&r, &activity_window(), &CollectOptions::default()),
            Verdict::Skip
        );
    }

    #[test]
    fn unparsable_timestamp_field_is_skipped() {
        let r = record(&[
            ("type", "HKQuantityTypeIdentifierHeartRate"),
            ("startDate", "2024-05-01 08:05:00 -0400"),
            ("creationDate", "yesterday"),
        ]);
        assert_eq!(
            evaluate(&r, &activity_window(), &CollectOptions::default()),
            Verdict::Skip
        );
    }

    #[test]
    fn timestamp_field_is_configurable() {
        let r = record(&[
            ("type", "HKQuantityTypeIdentifierHeartRate"),
            ("startDate", "2024-05-01 08:05:00 -0400"),
            ("endDate", "2024-05-01 08:06:00 -0400"),
        ]);
        let options = CollectOptions {
            timestamp_field: TimestampField::EndDate,
            ..CollectOptions::default()
        };
        let Verdict::Keep(_, measurement) = evaluate(&r, &activity_window(), &options) else {
            panic!("expected record to be kept");
        };
        assert_eq!(
            measurement.log_time,
            log_time_ns(&parse_health_date("2024-05-01 08:06:00 -0400").unwrap()).unwrap()
        );
    }

    #[test]
    fn excluded_sources_are_skipped() {
        let options = CollectOptions {
            excluded_sources: vec!["Watch".to_string()],
            ..CollectOptions::default()
        };
        assert_eq!(
            evaluate(&heart_rate("2024-05-01 08:05:00 -0400"), &activity_window(), &options),
            Verdict::Skip
        );
    }

    #[test]
    fn midnight_window_carries_both_prefixes() {
        let w = window("2024-05-01T23:50:00-04:00", "2024-05-02T00:20:00-04:00");
        assert_eq!(w.date_prefixes(), ["2024-05-01", "2024-05-02"]);
        assert!(w.matches_prefix("2024-05-02 00:05:00 -0400"));
    }

    #[test]
    fn prefix_uses_window_offset() {
        // 02:00 UTC on the 2nd is still the 1st in -0400.
        let w = window("2024-05-01T22:00:00-04:00", "2024-05-01T22:30:00-04:00");
        assert_eq!(w.date_prefixes(), ["2024-05-01"]);
    }

    #[test]
    fn collect_groups_by_type_in_arrival_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.xml");
        fs::write(
            &path,
            r#"<HealthData>
 <Record type="HKQuantityTypeIdentifierHeartRate" startDate="2024-04-30 08:05:00 -0400" creationDate="2024-04-30 08:05:00 -0400" value="90"/>
 <Record type="HKQuantityTypeIdentifierStepCount" startDate="2024-05-01 08:01:00 -0400" creationDate="2024-05-01 08:01:30 -0400" value="40"/>
 <Record type="HKQuantityTypeIdentifierHeartRate" startDate="2024-05-01 08:02:00 -0400" creationDate="2024-05-01 08:02:00 -0400" value="110"/>
 <Record type="HKQuantityTypeIdentifierHeartRate" startDate="2024-05-01 08:03:00 -0400" creationDate="2024-05-01 08:03:00 -0400" value="125"/>
 <Record startDate="2024-05-01 08:04:00 -0400" creationDate="2024-05-01 08:04:00 -0400"/>
 <Record type="HKQuantityTypeIdentifierHeartRate" startDate="2024-05-01 08:30:00 -0400" creationDate="2024-05-01 08:30:00 -0400" value="99"/>
 <Record type="HKQuantityTypeIdentifierHeartRate" startDate="2024-05-01 08:04:30 -0400" creationDate="2024-05-01 08:04:30 -0400" value="130"/>
</HealthData>
"#,
        )
        .unwrap();
        let log = EventLog::open(&path).unwrap();

        let groups = collect(
            &log,
            &window("2024-05-01T08:00:00-04:00", "2024-05-01T08:10:00-04:00"),
            &CollectOptions::default(),
        )
        .unwrap();

        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["StepCount", "HeartRate"]);

        let values: Vec<&str> = groups
            .get("HeartRate")
            .unwrap()
            .records
            .iter()
            .filter_map(|r| r.value.as_deref())
            .collect();
        // 08:30 stops the scan, so the late 08:04:30 record is never seen.
        assert_eq!(values, vec!["110", "125"]);
        assert_eq!(groups.record_count(), 3);
    }

    #[test]
    fn measurement_serializes_with_export_field_names() {
        let Verdict::Keep(_, measurement) = evaluate(
            &heart_rate("2024-05-01 08:05:00 -0400"),
            &activity_window(),
            &CollectOptions::default(),
        ) else {
            panic!("expected record to be kept");
        };
        let json = serde_json::to_string(&measurement).unwrap();
        insta::assert_snapshot!(json, @r#"{"unit":"count/min","value":"120","startDate":"2024-05-01 08:05:00 -0400","endDate":"2024-05-01 08:05:00 -0400","sourceName":"Watch","sourceVersion":null,"device":null,"creationDate":"2024-05-01 08:05:00 -0400","tag":"Record"}"#);
    }
}
