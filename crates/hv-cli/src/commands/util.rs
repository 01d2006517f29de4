//! Shared utilities for CLI commands.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{FixedOffset, Local, NaiveDateTime, TimeZone};
use hv_core::{ConversionSummary, ConvertError, EventLog, SinkError};
use hv_mcap::McapSink;

use crate::Config;

/// Opens the export's event log. A missing log is an error.
pub fn open_log(config: &Config) -> Result<EventLog> {
    let path = config.log_path();
    EventLog::open(&path).with_context(|| {
        format!(
            "failed to open {}; point --input-dir at an Apple Health export",
            path.display()
        )
    })
}

/// Local UTC offset in effect at `local` (the earlier one if ambiguous).
pub fn local_offset_at(local: &NaiveDateTime) -> FixedOffset {
    Local
        .offset_from_local_datetime(local)
        .earliest()
        .unwrap_or_else(|| *Local::now().offset())
}

/// Opens a sink for the output file, or returns `None` if it exists and overwriting is off.
pub fn create_sink(config: &Config, file_name: &str) -> Result<Option<McapSink>> {
    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            config.output_dir.display()
        )
    })?;

    let path = config.output_dir.join(file_name);
    match McapSink::create(&path, config.overwrite) {
        Ok(sink) => Ok(Some(sink)),
        Err(SinkError::AlreadyExists(path)) => {
            tracing::warn!(
                path = %path.display(),
                "output already exists, skipping; run with --overwrite to replace it"
            );
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("failed to create {}", path.display())),
    }
}

/// Runs one conversion into `<output_dir>/<file_name>` and reports the result.
///
/// Returns the written path, or `None` if the conversion was skipped.
pub fn convert_into<F>(config: &Config, file_name: &str, convert: F) -> Result<Option<PathBuf>>
where
    F: FnOnce(&mut McapSink) -> Result<ConversionSummary, ConvertError>,
{
    let Some(mut sink) = create_sink(config, file_name)? else {
        return Ok(None);
    };
    // An error drops the unfinished sink, which discards its partial output.
    let summary = convert(&mut sink).with_context(|| format!("failed to convert {file_name}"))?;
    let path = sink
        .finish()
        .with_context(|| format!("failed to finish {file_name}"))?;
    print!("{}", format_summary(&path, &summary));
    Ok(Some(path))
}

/// Format a conversion result for human-readable output.
pub fn format_summary(path: &Path, summary: &ConversionSummary) -> String {
    let mut output = String::new();
    writeln!(
        output,
        "Saved {} ({} records on {} channels)",
        path.display(),
        summary.records,
        summary.channels.len()
    )
    .unwrap();
    for channel in summary.channels.iter().filter(|c| c.regressions > 0) {
        writeln!(
            output,
            "  note: /{} has {} out-of-order records",
            channel.key, channel.regressions
        )
        .unwrap();
    }
    output
}

/// Parses a 1-based `--pick` number against `count` entries.
pub fn pick_index(pick: usize, count: usize) -> Result<usize> {
    if pick == 0 || pick > count {
        anyhow::bail!("--pick {pick} is out of range; choose 1 to {count}");
    }
    Ok(pick - 1)
}

fn write_entries<W: Write>(output: &mut W, labels: &[String], limit: usize) -> io::Result<()> {
    for (idx, label) in labels.iter().take(limit).enumerate() {
        writeln!(output, "{}) {label}", idx + 1)?;
    }
    Ok(())
}

/// Shows the first `recent` labels and asks for a number.
///
/// Typing `list` shows every label. Returns the 0-based choice, or `None`
/// when input ends before a valid choice.
pub fn prompt_selection<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    noun: &str,
    labels: &[String],
    recent: usize,
) -> io::Result<Option<usize>> {
    writeln!(output, "Most recent {noun}s:")?;
    write_entries(output, labels, recent)?;

    let mut line = String::new();
    loop {
        write!(
            output,
            "Enter the number of the {noun} you want to process (or 'list' to see all): "
        )?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(None);
        }

        let choice = line.trim();
        if choice == "list" {
            write_entries(output, labels, labels.len())?;
            continue;
        }
        match choice.parse::<usize>() {
            Ok(n) if (1..=labels.len()).contains(&n) => return Ok(Some(n - 1)),
            _ => writeln!(output, "Invalid input. Please enter a number or 'list'.")?,
        }
    }
}

/// Lists files in `dir` with the given extension, sorted by name.
pub fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read directory {}", dir.display()))?
            .path();
        if path.is_file()
            && path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
