//! Core conversion logic for health export visualization.
//!
//! This crate turns a health data export into timestamped, per-type channels:
//! - Event log: streaming reads of the multi-gigabyte `export.xml`
//! - Activity index: cached workout summaries and key-based lookup
//! - Window collection: measurements recorded during an activity
//! - Track and ECG transcoding onto the shared nanosecond time axis
//!
//! Output goes through the [`RecordSink`] trait; the `hv-mcap` crate provides
//! the file-backed implementation.

pub mod collect;
pub mod convert;
pub mod ecg;
pub mod event_log;
pub mod index;
pub mod multiplex;
pub mod record;
pub mod resolve;
pub mod schema;
pub mod sink;
pub mod track;

pub use collect::{CollectOptions, MeasurementGroups, MeasurementRecord, TimeWindow, TimestampField};
pub use convert::{ConversionSummary, ConvertError};
pub use event_log::{EventLog, EventLogError};
pub use index::{ActivityKey, ActivitySummary, IndexError};
pub use multiplex::{ChannelHandle, ChannelRegistry, ChannelStats};
pub use record::EventRecord;
pub use resolve::{DiscreteEvent, EventKind, ResolvedActivity};
pub use schema::ChannelSchema;
pub use sink::{ChannelId, RecordSink, SinkError};
pub use track::{TrackError, TrackPoint, TranscodedPoint};
