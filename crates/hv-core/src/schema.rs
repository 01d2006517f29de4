//! JSON schemas describing each kind of output channel.

use serde_json::json;

/// Structural description of a channel's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSchema {
    /// Schema name shown by the viewer, e.g. `foxglove.GeoJSON`.
    pub name: String,
    /// Schema encoding, always `jsonschema` here.
    pub encoding: &'static str,
    /// Serialized schema document.
    pub data: String,
}

impl ChannelSchema {
    pub fn json_schema(name: impl Into<String>, schema: &serde_json::Value) -> Self {
        Self {
            name: name.into(),
            encoding: "jsonschema",
            data: schema.to_string(),
        }
    }
}

fn object(title: &str, properties: &serde_json::Value) -> serde_json::Value {
    json!({
        "type": "object",
        "title": title,
        "properties": properties,
    })
}

/// Per-point route metrics under the given title (`route_metrics`, `gpx_metrics`).
pub fn route_metrics(title: &str) -> ChannelSchema {
    ChannelSchema::json_schema(
        title,
        &object(
            title,
            &json!({
                "elevation": {"type": "number"},
                "speed": {"type": "number"},
                "course": {"type": "number"},
                "hAcc": {"type": "number"},
                "vAcc": {"type": "number"},
            }),
        ),
    )
}

/// Measurement records collected from the event log.
pub fn workout_metrics() -> ChannelSchema {
    ChannelSchema::json_schema(
        "workout_metrics",
        &object(
            "workout_metrics",
            &json!({
                "unit": {"type": "string"},
                "value": {"type": "number"},
                "startDate": {"type": "string"},
                "endDate": {"type": "string"},
                "sourceName": {"type": "string"},
                "sourceVersion": {"type": "string"},
                "device": {"type": "string"},
                "creationDate": {"type": "string"},
                "tag": {"type": "string"},
            }),
        ),
    )
}

/// Pause and resume events.
pub fn workout_event() -> ChannelSchema {
    ChannelSchema::json_schema(
        "workout_event",
        &object(
            "workout_event",
            &json!({
                "event": {"type": "string", "enum": ["Pause", "Resume"]},
                "reason": {"type": "string"},
            }),
        ),
    )
}

/// Attributes of the activity element itself.
pub fn workout_summary() -> ChannelSchema {
    ChannelSchema::json_schema(
        "workout_summary",
        &json!({
            "type": "object",
            "title": "workout_summary",
            "additionalProperties": {"type": "string"},
        }),
    )
}

/// `foxglove.GeoJSON`.
pub fn geojson() -> ChannelSchema {
    ChannelSchema::json_schema(
        "foxglove.GeoJSON",
        &object(
            "foxglove.GeoJSON",
            &json!({
                "geojson": {"type": "string", "description": "GeoJSON data encoded as a UTF-8 string"},
            }),
        ),
    )
}

/// `foxglove.LocationFix`.
pub fn location_fix() -> ChannelSchema {
    ChannelSchema::json_schema(
        "foxglove.LocationFix",
        &object(
            "foxglove.LocationFix",
            &json!({
                "latitude": {"type": "number"},
                "longitude": {"type": "number"},
                "altitude": {"type": "number"},
            }),
        ),
    )
}

/// Electrocardiogram voltage samples.
pub fn ecg() -> ChannelSchema {
    ChannelSchema::json_schema(
        "ecg",
        &object("ecg", &json!({ "voltage": {"type": "number"} })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_are_valid_json_objects() {
        for schema in [
            route_metrics("route_metrics"),
            workout_metrics(),
            workout_event(),
            workout_summary(),
            geojson(),
            location_fix(),
            ecg(),
        ] {
            let parsed: serde_json::Value = serde_json::from_str(&schema.data).unwrap();
            assert_eq!(parsed["type"], "object", "{}", schema.name);
            assert_eq!(schema.encoding, "jsonschema");
        }
    }

    #[test]
    fn route_metrics_title_follows_name() {
        let schema = route_metrics("gpx_metrics");
        let parsed: serde_json::Value = serde_json::from_str(&schema.data).unwrap();
        assert_eq!(schema.name, "gpx_metrics");
        assert_eq!(parsed["title"], "gpx_metrics");
    }
}
