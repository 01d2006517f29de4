//! MCAP output for health visualizer conversions.
//!
//! Channels carry JSON messages described by JSON schemas. Schemas are
//! written once per name and shared by every channel that uses them.
//!
//! Output is written to a `.tmp` file next to the destination and renamed
//! into place by [`McapSink::finish`]. A sink dropped before `finish` removes
//! its temporary file, so a failed conversion leaves no output behind.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hv_core::{ChannelId, ChannelSchema, RecordSink, SinkError};
use mcap::records::MessageHeader;

const MESSAGE_ENCODING: &str = "json";

fn writer_error(e: mcap::McapError) -> SinkError {
    SinkError::Writer(Box::new(e))
}

/// Temporary output file, deleted on drop unless it was renamed into place.
struct PendingFile {
    path: PathBuf,
    armed: bool,
}

impl PendingFile {
    fn persist(&mut self, dest: &Path) -> std::io::Result<()> {
        fs::rename(&self.path, dest)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed unfinished output"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove unfinished output"
            ),
        }
    }
}

/// File-backed [`RecordSink`] producing an MCAP file.
pub struct McapSink {
    path: PathBuf,
    // Dropped before `pending` so the file is closed before it is removed.
    writer: mcap::Writer<BufWriter<File>>,
    pending: PendingFile,
    schemas: HashMap<String, u16>,
    sequence: u32,
}

impl McapSink {
    /// Starts writing output destined for `path`.
    ///
    /// Without `overwrite` an existing file is left untouched and
    /// [`SinkError::AlreadyExists`] is returned. With it, the existing file
    /// is only replaced once [`McapSink::finish`] succeeds.
    pub fn create(path: &Path, overwrite: bool) -> Result<Self, SinkError> {
        if !overwrite && path.exists() {
            return Err(SinkError::AlreadyExists(path.to_path_buf()));
        }

        let tmp_path = tmp_path_for(path);
        let file = File::create(&tmp_path)?;
        let pending = PendingFile {
            path: tmp_path,
            armed: true,
        };
        let writer = mcap::Writer::new(BufWriter::new(file)).map_err(writer_error)?;
        tracing::debug!(path = %path.display(), tmp = %pending.path.display(), overwrite, "opened output");

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            pending,
            schemas: HashMap::new(),
            sequence: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the summary section, closes the file and moves it into place.
    pub fn finish(self) -> Result<PathBuf, SinkError> {
        let Self {
            path,
            mut writer,
            mut pending,
            sequence,
            ..
        } = self;

        writer.finish().map_err(writer_error)?;
        let file = writer
            .into_inner()
            .into_inner()
            .map_err(|e| SinkError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        pending.persist(&path)?;
        tracing::info!(path = %path.display(), messages = sequence, "wrote output");
        Ok(path)
    }

    fn schema_id(&mut self, schema: &ChannelSchema) -> Result<u16, SinkError> {
        if let Some(&id) = self.schemas.get(&schema.name) {
            return Ok(id);
        }
        let id = self
            .writer
            .add_schema(&schema.name, schema.encoding, schema.data.as_bytes())
            .map_err(writer_error)?;
        self.schemas.insert(schema.name.clone(), id);
        Ok(id)
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

impl RecordSink for McapSink {
    fn add_channel(&mut self, topic: &str, schema: &ChannelSchema) -> Result<ChannelId, SinkError> {
        let schema_id = self.schema_id(schema)?;
        self.writer
            .add_channel(schema_id, topic, MESSAGE_ENCODING, &BTreeMap::new())
            .map_err(writer_error)
    }

    fn write(&mut self, channel: ChannelId, log_time: u64, payload: &[u8]) -> Result<(), SinkError> {
        let header = MessageHeader {
            channel_id: channel,
            sequence: self.sequence,
            log_time,
            publish_time: log_time,
        };
        self.writer
            .write_to_known_channel(&header, payload)
            .map_err(writer_error)?;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(())
    }
}
