//! Locates one activity in the log and extracts its track reference and events.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::event_log::{EventLog, EventLogError};
use crate::index::{ActivityKey, WORKOUT_TAG};
use crate::record::{EventRecord, parse_health_date};

const EVENT_TAG: &str = "WorkoutEvent";
const ROUTE_TAG: &str = "WorkoutRoute";
const FILE_REFERENCE_TAG: &str = "FileReference";
const METADATA_TAG: &str = "MetadataEntry";

const PAUSE_EVENT_TYPE: &str = "HKWorkoutEventTypePause";
const RESUME_EVENT_TYPE: &str = "HKWorkoutEventTypeResume";

/// Metadata key carrying what triggered a pause or resume.
pub const EVENT_TRIGGER_KEY: &str = "HKMetadataKeyWorkoutEventTrigger";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    Pause,
    Resume,
}

/// A pause or resume inside an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscreteEvent {
    pub event: EventKind,
    pub reason: Option<String>,
    #[serde(skip)]
    pub timestamp: DateTime<FixedOffset>,
}

/// Everything the log says about one activity beyond its summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedActivity {
    /// Export-relative path of the route file, e.g. `/workout-routes/route_...gpx`.
    pub track_path: Option<String>,
    pub events: Vec<DiscreteEvent>,
    /// Attributes of the matched activity element.
    pub attributes: BTreeMap<String, String>,
}

impl ResolvedActivity {
    /// Whether any activity in the log matched the key.
    pub fn is_found(&self) -> bool {
        !self.attributes.is_empty()
    }
}

/// Finds the first activity matching `key` and extracts its details.
///
/// Later activities with an identical key are never looked at. A key with no
/// match yields an empty result, not an error.
pub fn resolve(log: &EventLog, key: &ActivityKey<'_>) -> Result<ResolvedActivity, EventLogError> {
    for record in log.records_tagged(&[WORKOUT_TAG])? {
        let record = record?;
        if key.matches(&record) {
            tracing::debug!(start_date = key.start_date, source = key.source_name, "matched activity");
            return Ok(resolve_record(&record));
        }
    }
    tracing::info!(
        start_date = key.start_date,
        source = key.source_name,
        "no activity matched, continuing without track"
    );
    Ok(ResolvedActivity::default())
}

/// Extracts track reference and events from a matched activity element.
pub fn resolve_record(record: &EventRecord) -> ResolvedActivity {
    let mut resolved = ResolvedActivity {
        attributes: record.attributes.clone(),
        ..ResolvedActivity::default()
    };

    for child in &record.children {
        match child.tag.as_str() {
            EVENT_TAG => {
                if let Some(event) = discrete_event(child) {
                    resolved.events.push(event);
                }
            }
            ROUTE_TAG => {
                let path = child
                    .children_tagged(FILE_REFERENCE_TAG)
                    .filter_map(|r| r.attr_owned("path"))
                    .last();
                if path.is_some() {
                    resolved.track_path = path;
                }
            }
            other => tracing::trace!(tag = other, "ignoring activity child"),
        }
    }

    resolved
}

fn discrete_event(record: &EventRecord) -> Option<DiscreteEvent> {
    let event = match record.attr("type")? {
        PAUSE_EVENT_TYPE => EventKind::Pause,
        RESUME_EVENT_TYPE => EventKind::Resume,
        other => {
            tracing::trace!(event_type = other, "ignoring workout event");
            return None;
        }
    };

    let Some(timestamp) = record.attr("date").and_then(parse_health_date) else {
        tracing::warn!(date = ?record.attr("date"), "workout event has invalid date, skipping");
        return None;
    };

    let reason = record
        .children_tagged(METADATA_TAG)
        .find(|m| m.attr("key") == Some(EVENT_TRIGGER_KEY))
        .and_then(|m| m.attr_owned("value"));

    Some(DiscreteEvent {
        event,
        reason,
        timestamp,
    })
}
