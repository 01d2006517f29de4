//! Channel multiplexer: one lazily created output channel per type key.

use std::collections::HashMap;

use serde::Serialize;

use crate::schema::ChannelSchema;
use crate::sink::{ChannelId, RecordSink, SinkError};

/// Stable handle to a registered channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(usize);

/// Per-channel write statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub key: String,
    pub records: usize,
    /// Records written with a log time earlier than the previous one.
    pub regressions: usize,
}

#[derive(Debug)]
struct ChannelState {
    sink_id: ChannelId,
    stats: ChannelStats,
    last_log_time: Option<u64>,
}

/// Owns the key -> channel mapping for one conversion.
///
/// At most one channel exists per key; requesting a key again returns the
/// existing handle and ignores the schema argument.
#[derive(Debug)]
pub struct ChannelRegistry<S> {
    sink: S,
    channels: Vec<ChannelState>,
    by_key: HashMap<String, ChannelHandle>,
}

impl<S: RecordSink> ChannelRegistry<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            channels: Vec::new(),
            by_key: HashMap::new(),
        }
    }

    /// Returns the channel for `key`, registering it with the sink on first use.
    pub fn get_or_create(
        &mut self,
        key: &str,
        schema: &ChannelSchema,
    ) -> Result<ChannelHandle, SinkError> {
        if let Some(&handle) = self.by_key.get(key) {
            return Ok(handle);
        }

        let topic = format!("/{key}");
        let sink_id = self.sink.add_channel(&topic, schema)?;
        let handle = ChannelHandle(self.channels.len());
        self.channels.push(ChannelState {
            sink_id,
            stats: ChannelStats {
                key: key.to_string(),
                records: 0,
                regressions: 0,
            },
            last_log_time: None,
        });
        self.by_key.insert(key.to_string(), handle);
        tracing::debug!(topic, schema = %schema.name, "created channel");
        Ok(handle)
    }

    /// Encodes `record` as JSON and writes it on the channel at `log_time`.
    pub fn emit<T: Serialize>(
        &mut self,
        handle: ChannelHandle,
        record: &T,
        log_time: u64,
    ) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(record)?;
        let channel = self
            .channels
            .get_mut(handle.0)
            .ok_or(SinkError::UnknownChannel(handle.0))?;

        self.sink.write(channel.sink_id, log_time, &payload)?;

        // Only successful writes count toward the ordering baseline.
        if let Some(last) = channel.last_log_time {
            if log_time < last {
                if channel.stats.regressions == 0 {
                    tracing::warn!(
                        channel = %channel.stats.key,
                        previous = last,
                        log_time,
                        "channel timestamps went backwards"
                    );
                }
                channel.stats.regressions += 1;
            }
        }
        channel.last_log_time = Some(channel.last_log_time.map_or(log_time, |l| l.max(log_time)));
        channel.stats.records += 1;
        Ok(())
    }

    /// Looks up an existing channel without creating it.
    pub fn handle(&self, key: &str) -> Option<ChannelHandle> {
        self.by_key.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Statistics for every channel, in creation order.
    pub fn stats(&self) -> Vec<ChannelStats> {
        self.channels.iter().map(|c| c.stats.clone()).collect()
    }

    /// Total records written across all channels.
    pub fn records_written(&self) -> usize {
        self.channels.iter().map(|c| c.stats.records).sum()
    }

    pub const fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Releases the sink so it can be finished.
    pub fn into_sink(self) -> S {
        self.sink
    }
}
