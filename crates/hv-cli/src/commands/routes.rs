//! Route selection and conversion (`hv routes`).
//!
//! Route files are named after their start time in local time, e.g.
//! `route_2024-05-01_8.00am.gpx`; that name is all the selection list shows.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use hv_core::convert::{combined_file_name, convert_route, convert_track, stem_file_name};
use regex::Regex;

use super::util::{
    convert_into, files_with_extension, local_offset_at, open_log, pick_index, prompt_selection,
};
use crate::Config;

static ROUTE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^route_(\d{4})-(\d{2})-(\d{2})_(\d{1,2})\.(\d{2})(am|pm)\.gpx$").unwrap()
});

/// A route file with the start time encoded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteFile {
    pub path: PathBuf,
    pub started: NaiveDateTime,
}

impl RouteFile {
    pub fn label(&self) -> String {
        self.started.format("%Y-%m-%d %I:%M %p").to_string()
    }
}

/// Parses the local start time out of a route file name.
pub fn parse_route_name(name: &str) -> Option<NaiveDateTime> {
    let caps = ROUTE_NAME_RE.captures(name)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    let hour12: u32 = caps[4].parse().ok()?;
    let minute = caps[5].parse().ok()?;
    let pm = caps[6].eq_ignore_ascii_case("pm");

    let hour = match (hour12, pm) {
        (12, false) => 0,
        (h, true) if h < 12 => h + 12,
        (h, _) => h,
    };
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}

/// Route files with parseable names, most recent first.
pub fn dated_routes(paths: &[PathBuf]) -> Vec<RouteFile> {
    let mut routes: Vec<RouteFile> = paths
        .iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let started = parse_route_name(name);
            if started.is_none() {
                tracing::debug!(name, "route file name has no date, skipping");
            }
            Some(RouteFile {
                path: path.clone(),
                started: started?,
            })
        })
        .collect();
    routes.sort_by(|a, b| b.started.cmp(&a.started));
    routes
}

pub fn run(config: &Config, all: bool, pick: Option<usize>) -> Result<()> {
    let dir = config.routes_dir();
    let files = if dir.is_dir() {
        files_with_extension(&dir, "gpx")?
    } else {
        Vec::new()
    };
    if files.is_empty() {
        println!(
            "No GPX files found in {}. Specify a different export directory with --input-dir.",
            dir.display()
        );
        return Ok(());
    }

    if all {
        return convert_all(config, &files);
    }

    let routes = dated_routes(&files);
    if routes.is_empty() {
        println!("No workout route files matched the expected name format.");
        return Ok(());
    }

    let choice = if let Some(pick) = pick {
        pick_index(pick, routes.len())?
    } else {
        let labels: Vec<String> = routes.iter().map(RouteFile::label).collect();
        let stdin = io::stdin();
        let selected = prompt_selection(
            &mut stdin.lock(),
            &mut io::stdout(),
            "workout route",
            &labels,
            config.recent_count,
        )
        .context("failed to read selection")?;
        let Some(choice) = selected else {
            return Ok(());
        };
        choice
    };

    convert_combined(config, &routes[choice])
}

fn convert_combined(config: &Config, route: &RouteFile) -> Result<()> {
    println!("Processing {}...", route.path.display());
    let log = open_log(config)?;
    let offset = local_offset_at(&route.started);
    let options = config.collect_options();
    convert_into(config, &combined_file_name(&route.path), |sink| {
        convert_route(&log, &route.path, offset, &options, sink)
    })?;
    Ok(())
}

fn convert_all(config: &Config, files: &[PathBuf]) -> Result<()> {
    println!("Processing all ({}) GPX files.", files.len());
    for path in files {
        convert_one_track(config, path)?;
    }
    println!("Finished processing {} GPX files.", files.len());
    Ok(())
}

fn convert_one_track(config: &Config, path: &Path) -> Result<()> {
    convert_into(config, &stem_file_name(path), |sink| convert_track(path, sink))?;
    Ok(())
}
