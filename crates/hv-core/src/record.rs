//! Shared representation of one event-log element and the health timestamp format.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};

/// Timestamp format used throughout the health export, e.g. `2024-05-01 08:00:00 -0400`.
pub const HEALTH_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Length of the calendar-date prefix (`YYYY-MM-DD`) of a health timestamp.
pub const DATE_PREFIX_LEN: usize = 10;

/// One element of the event log together with its subtree.
///
/// Records are produced by the tokenizer and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecord {
    /// Element name without namespace prefix.
    pub tag: String,
    /// Flat attribute map, values already unescaped.
    pub attributes: BTreeMap<String, String>,
    /// Child elements in document order.
    pub children: Vec<Self>,
    /// Concatenated text content, if the element had any.
    pub text: Option<String>,
}

impl EventRecord {
    /// Creates a leaf record with no attributes.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Returns the attribute value for `key`, if present.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns an owned copy of the attribute value for `key`.
    pub fn attr_owned(&self, key: &str) -> Option<String> {
        self.attributes.get(key).cloned()
    }

    /// Iterates over direct children with the given tag.
    pub fn children_tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Self> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Returns the first direct child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Returns the trimmed text of the first child with the given tag.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.child(tag)
            .and_then(|c| c.text.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Parses a health export timestamp (`YYYY-MM-DD HH:MM:SS ±HHMM`).
pub fn parse_health_date(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s.trim(), HEALTH_DATE_FORMAT).ok()
}

/// Formats an instant in the health export format, keeping its offset.
pub fn format_health_date(dt: &DateTime<FixedOffset>) -> String {
    dt.format(HEALTH_DATE_FORMAT).to_string()
}

/// Converts an instant to nanoseconds since the Unix epoch.
///
/// Returns `None` for instants before the epoch or outside the i64 nanosecond range.
pub fn log_time_ns<Tz: chrono::TimeZone>(dt: &DateTime<Tz>) -> Option<u64> {
    dt.timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
}

/// Removes the first matching identifier prefix from a raw type name.
pub fn strip_type_prefix<'a>(raw: &'a str, prefixes: &[&str]) -> &'a str {
    prefixes
        .iter()
        .find_map(|p| raw.strip_prefix(p))
        .unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_health_date_with_offset() {
        let dt = parse_health_date("2024-05-01 08:00:00 -0400").unwrap();
        assert_eq!(dt.offset().local_minus_utc(), -4 * 3600);
        assert_eq!(dt.to_rfc3339(), "2024-05-01T08:00:00-04:00");
    }

    #[test]
    fn rejects_malformed_health_date() {
        assert!(parse_health_date("2024-05-01T08:00:00Z").is_none());
        assert!(parse_health_date("").is_none());
        assert!(parse_health_date("2024-05-01 08:00:00").is_none());
    }

    #[test]
    fn format_roundtrips_health_date() {
        let s = "2024-05-01 08:00:00 -0400";
        assert_eq!(format_health_date(&parse_health_date(s).unwrap()), s);
    }

    #[test]
    fn log_time_is_nanoseconds_since_epoch() {
        let dt = parse_health_date("1970-01-01 00:00:01 +0000").unwrap();
        assert_eq!(log_time_ns(&dt), Some(1_000_000_000));
    }

    #[test]
    fn log_time_rejects_pre_epoch() {
        let dt = parse_health_date("1969-12-31 23:59:59 +0000").unwrap();
        assert_eq!(log_time_ns(&dt), None);
    }

    #[test]
    fn strips_known_prefix_only() {
        let prefixes = ["HKQuantityTypeIdentifier", "HKCategoryTypeIdentifier"];
        assert_eq!(
            strip_type_prefix("HKQuantityTypeIdentifierHeartRate", &prefixes),
            "HeartRate"
        );
        assert_eq!(
            strip_type_prefix("HKCategoryTypeIdentifierSleepAnalysis", &prefixes),
            "SleepAnalysis"
        );
        assert_eq!(strip_type_prefix("CustomType", &prefixes), "CustomType");
    }

    #[test]
    fn child_text_ignores_blank() {
        let mut parent = EventRecord::new("extensions");
        let mut speed = EventRecord::new("speed");
        speed.text = Some(" 3.4 ".to_string());
        let mut blank = EventRecord::new("course");
        blank.text = Some("   ".to_string());
        parent.children.push(speed);
        parent.children.push(blank);

        assert_eq!(parent.child_text("speed"), Some("3.4"));
        assert_eq!(parent.child_text("course"), None);
        assert_eq!(parent.child_text("hAcc"), None);
    }
}
