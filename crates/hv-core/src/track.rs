//! GPX track parsing and transcoding onto the shared time axis.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use thiserror::Error;

use crate::event_log::{EventLogError, parse_document};
use crate::record::{EventRecord, log_time_ns};

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("track file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse GPX file: {0}")]
    Parse(#[from] EventLogError),
    #[error("not a GPX document (root element <{0}>)")]
    NotGpx(String),
}

/// Optional per-point values from the `<extensions>` element, kept as raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackExtensions {
    pub speed: Option<String>,
    pub course: Option<String>,
    pub h_acc: Option<String>,
    pub v_acc: Option<String>,
}

impl TrackExtensions {
    fn from_record(extensions: &EventRecord) -> Self {
        let text = |tag: &str| extensions.child_text(tag).map(str::to_string);
        Self {
            speed: text("speed"),
            course: text("course"),
            h_acc: text("hAcc"),
            v_acc: text("vAcc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub time: DateTime<FixedOffset>,
    pub extensions: TrackExtensions,
}

/// Reads and parses a GPX file. A missing file is an error.
pub fn read_track(path: &Path) -> Result<Vec<TrackPoint>, TrackError> {
    let text = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TrackError::NotFound(path.to_path_buf())
        } else {
            TrackError::Io(e)
        }
    })?;
    let points = parse_gpx(&text)?;
    tracing::info!(path = %path.display(), points = points.len(), "parsed track");
    Ok(points)
}

/// Parses GPX text into points in file order (track, then segment, then point).
///
/// Points without a valid position or time are skipped.
pub fn parse_gpx(text: &str) -> Result<Vec<TrackPoint>, TrackError> {
    let root = parse_document(text)?;
    if root.tag != "gpx" {
        return Err(TrackError::NotGpx(root.tag));
    }

    let mut points = Vec::new();
    for track in root.children_tagged("trk") {
        for segment in track.children_tagged("trkseg") {
            points.extend(segment.children_tagged("trkpt").filter_map(parse_point));
        }
    }
    Ok(points)
}

fn parse_point(record: &EventRecord) -> Option<TrackPoint> {
    let coordinate = |key: &str| record.attr(key).and_then(|v| v.trim().parse::<f64>().ok());
    let (Some(latitude), Some(longitude)) = (coordinate("lat"), coordinate("lon")) else {
        tracing::warn!(lat = ?record.attr("lat"), lon = ?record.attr("lon"), "track point has invalid position, skipping");
        return None;
    };

    let Some(time) = record
        .child_text("time")
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
    else {
        tracing::warn!(time = ?record.child_text("time"), "track point has invalid time, skipping");
        return None;
    };

    let elevation = record.child_text("ele").and_then(|e| e.parse::<f64>().ok());
    let extensions = record
        .child("extensions")
        .map(TrackExtensions::from_record)
        .unwrap_or_default();

    Some(TrackPoint {
        latitude,
        longitude,
        elevation,
        time,
        extensions,
    })
}

/// `foxglove.GeoJSON` message: a GeoJSON document carried as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoFeature {
    pub geojson: String,
}

/// `foxglove.LocationFix` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

/// Per-point route metrics. `course` is an integer; the rest stay raw text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsRecord {
    pub elevation: Option<f64>,
    pub speed: Option<String>,
    pub course: Option<i64>,
    #[serde(rename = "hAcc")]
    pub h_acc: Option<String>,
    #[serde(rename = "vAcc")]
    pub v_acc: Option<String>,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    geometry: Geometry,
    properties: FeatureProperties,
}

#[derive(Serialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: &'static str,
    coordinates: [f64; 2],
}

#[derive(Serialize)]
struct FeatureProperties {
    elevation: Option<f64>,
    time: String,
}

/// One track point on the shared time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodedPoint {
    pub log_time: u64,
    pub geo: GeoFeature,
    pub fix: FixRecord,
    pub metrics: MetricsRecord,
}

/// Truncates a course reading to an integer, as the viewer expects.
#[expect(
    clippy::cast_possible_truncation,
    reason = "course is degrees in [0, 360); truncation is the intended coercion"
)]
fn coerce_course(raw: &str) -> Option<i64> {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v.trunc() as i64),
        _ => {
            tracing::warn!(course = raw, "invalid course value, emitting null");
            None
        }
    }
}

fn geo_feature(point: &TrackPoint) -> Result<GeoFeature, serde_json::Error> {
    let feature = Feature {
        kind: "Feature",
        geometry: Geometry {
            kind: "Point",
            coordinates: [point.longitude, point.latitude],
        },
        properties: FeatureProperties {
            elevation: point.elevation,
            time: point.time.to_rfc3339(),
        },
    };
    Ok(GeoFeature {
        geojson: serde_json::to_string(&feature)?,
    })
}

/// Converts one point; `None` if its time cannot be expressed in epoch nanoseconds.
pub fn transcode_point(point: &TrackPoint) -> Option<TranscodedPoint> {
    let Some(log_time) = log_time_ns(&point.time) else {
        tracing::warn!(time = %point.time, "track point time out of range, skipping");
        return None;
    };

    let geo = match geo_feature(point) {
        Ok(geo) => geo,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode track point, skipping");
            return None;
        }
    };

    let ext = &point.extensions;
    Some(TranscodedPoint {
        log_time,
        geo,
        fix: FixRecord {
            latitude: point.latitude,
            longitude: point.longitude,
            altitude: point.elevation,
        },
        metrics: MetricsRecord {
            elevation: point.elevation,
            speed: ext.speed.clone(),
            course: ext.course.as_deref().and_then(coerce_course),
            h_acc: ext.h_acc.clone(),
            v_acc: ext.v_acc.clone(),
        },
    })
}

/// Converts points in order, one output per input point with a usable time.
pub fn transcode(points: &[TrackPoint]) -> Vec<TranscodedPoint> {
    points.iter().filter_map(transcode_point).collect()
}

/// Reads a GPX file and transcodes every point.
pub fn transcode_file(path: &Path) -> Result<Vec<TranscodedPoint>, TrackError> {
    Ok(transcode(&read_track(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="Apple Health Export" xmlns="http://www.topografix.com/GPX/1/1">
  <metadata><time>2024-05-01T12:00:00Z</time></metadata>
  <trk>
    <name>Route 2024-05-01 8:00am</name>
    <trkseg>
      <trkpt lon="-71.0589" lat="42.3601">
        <ele>10.5</ele>
        <time>2024-05-01T12:00:05Z</time>
        <extensions><speed>3.4</speed><course>12.9</course><hAcc>4.1</hAcc><vAcc>2.7</vAcc></extensions>
      </trkpt>
      <trkpt lon="-71.0590" lat="42.3602">
        <time>2024-05-01T12:00:06Z</time>
        <extensions><speed>3.5</speed></extensions>
      </trkpt>
      <trkpt lon="-71.0591" lat="42.3603">
        <ele>11.0</ele>
      </trkpt>
    </trkseg>
  </trk>
</gpx>
"#;

    #[test]
    fn parses_points_in_file_order() {
        let points = parse_gpx(GPX).unwrap();

        assert_eq!(points.len(), 2, "point without time is skipped");
        assert!((points[0].latitude - 42.3601).abs() < 1e-9);
        assert!((points[0].longitude + 71.0589).abs() < 1e-9);
        assert_eq!(points[0].elevation, Some(10.5));
        assert_eq!(points[1].elevation, None);
        assert!(points[0].time < points[1].time);
    }

    #[test]
    fn partial_extensions_default_to_null() {
        let points = parse_gpx(GPX).unwrap();
        let metrics = transcode_point(&points[1]).unwrap().metrics;

        assert_eq!(metrics.speed.as_deref(), Some("3.5"));
        assert!(metrics.course.is_none());
        assert!(metrics.h_acc.is_none());
        assert!(metrics.v_acc.is_none());
        let json = serde_json::to_string(&metrics).unwrap();
        insta::assert_snapshot!(json, @r#"{"elevation":null,"speed":"3.5","course":null,"hAcc":null,"vAcc":null}"#);
    }

    #[test]
    fn course_is_truncated_speed_is_untouched() {
        let points = parse_gpx(GPX).unwrap();
        let metrics = transcode_point(&points[0]).unwrap().metrics;

        assert_eq!(metrics.course, Some(12));
        assert_eq!(metrics.speed.as_deref(), Some("3.4"));
        let json = serde_json::to_string(&metrics).unwrap();
        insta::assert_snapshot!(json, @r#"{"elevation":10.5,"speed":"3.4","course":12,"hAcc":"4.1","vAcc":"2.7"}"#);
    }

    #[test]
    fn negative_course_truncates_toward_zero() {
        assert_eq!(coerce_course("-3.7"), Some(-3));
        assert_eq!(coerce_course("north"), None);
        assert_eq!(coerce_course("NaN"), None);
    }

    #[test]
    fn transcoded_point_carries_geojson_and_fix() {
        let points = parse_gpx(GPX).unwrap();
        let out = transcode_point(&points[0]).unwrap();

        assert_eq!(out.log_time, 1_714_564_805_000_000_000);
        insta::assert_snapshot!(out.geo.geojson, @r#"{"type":"Feature","geometry":{"type":"Point","coordinates":[-71.0589,42.3601]},"properties":{"elevation":10.5,"time":"2024-05-01T12:00:05+00:00"}}"#);
        assert!((out.fix.latitude - 42.3601).abs() < 1e-9);
        assert_eq!(out.fix.altitude, Some(10.5));
    }

    #[test]
    fn transcode_keeps_one_output_per_point() {
        let points = parse_gpx(GPX).unwrap();
        let out = transcode(&points);
        assert_eq!(out.len(), points.len());
        assert!(out.windows(2).all(|w| w[0].log_time <= w[1].log_time));
    }

    #[test]
    fn rejects_non_gpx_documents() {
        assert!(matches!(
            parse_gpx("<HealthData/>"),
            Err(TrackError::NotGpx(tag)) if tag == "HealthData"
        ));
    }

    #[test]
    fn missing_track_file_is_not_found() {
        let result = read_track(Path::new("/nonexistent/route.gpx"));
        assert!(matches!(result, Err(TrackError::NotFound(_))));
    }
}
