//! Forward-only streaming reader over the health export log.
//!
//! The log is one root element (`HealthData`) with a very large number of
//! top-level children. [`Records`] yields those children one at a time, each
//! with its (small) subtree materialized, so a pass uses constant memory
//! relative to the log size. Every call to [`EventLog::records`] opens an
//! independent pass from the start of the file.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::QName;
use thiserror::Error;

use crate::record::EventRecord;

/// Buffer size for `BufReader` (64KB for optimal performance on large files)
const BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("document ended inside <{0}>")]
    UnexpectedEof(String),
    #[error("document has no root element")]
    EmptyDocument,
}

/// Handle to an event log file on disk.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Opens a log, failing if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EventLogError> {
        let path = path.into();
        if !path.is_file() {
            return Err(EventLogError::NotFound(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts a new pass over every top-level element.
    pub fn records(&self) -> Result<Records<BufReader<File>>, EventLogError> {
        self.records_tagged(&[])
    }

    /// Starts a new pass yielding only top-level elements with one of `tags`.
    ///
    /// Subtrees of other elements are skipped without being materialized.
    /// An empty `tags` slice selects everything.
    pub fn records_tagged(&self, tags: &[&str]) -> Result<Records<BufReader<File>>, EventLogError> {
        let file = File::open(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EventLogError::NotFound(self.path.clone())
            } else {
                EventLogError::Io(e)
            }
        })?;
        Ok(Records::new(
            BufReader::with_capacity(BUFFER_SIZE, file),
            tags,
        ))
    }
}

/// Lazy producer of top-level log elements.
pub struct Records<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    child_buf: Vec<u8>,
    tags: Vec<String>,
    in_root: bool,
    finished: bool,
}

impl<R: BufRead> Records<R> {
    pub fn new(source: R, tags: &[&str]) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            child_buf: Vec::new(),
            tags: tags.iter().map(ToString::to_string).collect(),
            in_root: false,
            finished: false,
        }
    }

    fn wants(&self, tag: &str) -> bool {
        self.tags.is_empty() || self.tags.iter().any(|t| t == tag)
    }

    fn next_record(&mut self) -> Result<Option<EventRecord>, EventLogError> {
        loop {
            self.buf.clear();
            let (record, raw_name, has_children) = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(start) => {
                    if !self.in_root {
                        self.in_root = true;
                        continue;
                    }
                    (start_record(&start), start.name().as_ref().to_vec(), true)
                }
                Event::Empty(start) => {
                    if !self.in_root {
                        // Empty root element: nothing to yield.
                        return Ok(None);
                    }
                    (start_record(&start), Vec::new(), false)
                }
                Event::End(_) | Event::Eof => return Ok(None),
                _ => continue,
            };

            if !self.wants(&record.tag) {
                if has_children {
                    self.child_buf.clear();
                    self.reader
                        .read_to_end_into(QName(&raw_name), &mut self.child_buf)?;
                }
                continue;
            }

            let mut record = record;
            if has_children {
                read_children(&mut self.reader, &mut self.child_buf, &mut record)?;
            }
            return Ok(Some(record));
        }
    }
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = Result<EventRecord, EventLogError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Parses a whole (small) document and returns its root element.
pub fn parse_document(text: &str) -> Result<EventRecord, EventLogError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                let mut root = start_record(&start);
                let mut child_buf = Vec::new();
                read_children(&mut reader, &mut child_buf, &mut root)?;
                return Ok(root);
            }
            Event::Empty(start) => return Ok(start_record(&start)),
            Event::Eof => return Err(EventLogError::EmptyDocument),
            _ => {}
        }
    }
}

fn start_record(start: &BytesStart<'_>) -> EventRecord {
    let mut record = EventRecord::new(String::from_utf8_lossy(start.local_name().as_ref()));
    for attr in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned(), Cow::into_owned);
        record.attributes.insert(key, value);
    }
    record
}

fn push_text(record: &mut EventRecord, text: &str) {
    if text.is_empty() {
        return;
    }
    match record.text.as_mut() {
        Some(existing) => existing.push_str(text),
        None => record.text = Some(text.to_string()),
    }
}

fn decode_text(text: &BytesText<'_>) -> String {
    text.unescape()
        .map_or_else(|_| String::from_utf8_lossy(text).into_owned(), Cow::into_owned)
}

fn read_children<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    parent: &mut EventRecord,
) -> Result<(), EventLogError> {
    loop {
        buf.clear();
        match reader.read_event_into(buf)? {
            Event::Start(start) => {
                let mut child = start_record(&start);
                read_children(reader, buf, &mut child)?;
                parent.children.push(child);
            }
            Event::Empty(start) => parent.children.push(start_record(&start)),
            Event::Text(text) => {
                let text = decode_text(&text);
                push_text(parent, &text);
            }
            Event::CData(data) => {
                let text = String::from_utf8_lossy(&data).into_owned();
                push_text(parent, &text);
            }
            Event::End(_) => return Ok(()),
            Event::Eof => return Err(EventLogError::UnexpectedEof(parent.tag.clone())),
            _ => {}
        }
    }
}
