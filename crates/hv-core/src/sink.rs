//! Output sink interface.

use std::path::PathBuf;

use thiserror::Error;

use crate::schema::ChannelSchema;

/// Identifier the sink assigns to a registered channel.
pub type ChannelId = u16;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The destination exists and overwriting was not requested.
    #[error("{} already exists; run with --overwrite to replace it", .0.display())]
    AlreadyExists(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("unknown channel handle {0}")]
    UnknownChannel(usize),
    #[error("output writer error: {0}")]
    Writer(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Destination for timestamped records on named channels.
pub trait RecordSink {
    /// Registers a channel and returns its id.
    fn add_channel(&mut self, topic: &str, schema: &ChannelSchema) -> Result<ChannelId, SinkError>;

    /// Writes one encoded record at `log_time` (nanoseconds since the epoch).
    fn write(&mut self, channel: ChannelId, log_time: u64, payload: &[u8]) -> Result<(), SinkError>;
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn add_channel(&mut self, topic: &str, schema: &ChannelSchema) -> Result<ChannelId, SinkError> {
        (**self).add_channel(topic, schema)
    }

    fn write(&mut self, channel: ChannelId, log_time: u64, payload: &[u8]) -> Result<(), SinkError> {
        (**self).write(channel, log_time, payload)
    }
}
