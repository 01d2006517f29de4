//! List command (`hv list`).

use std::fmt::Write;

use anyhow::{Context, Result};
use hv_core::{ActivitySummary, index};

use super::util::open_log;
use super::workouts::format_activity;
use crate::Config;

pub fn run(config: &Config, json: bool) -> Result<()> {
    let log = open_log(config)?;
    let activities = index::load_or_build(&log).context("failed to load workout index")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&activities)?);
    } else {
        print!("{}", format_list(&activities));
    }
    Ok(())
}

/// Format every workout for human-readable output.
pub fn format_list(activities: &[ActivitySummary]) -> String {
    let mut output = String::new();
    if activities.is_empty() {
        writeln!(output, "No workouts found.").unwrap();
        return output;
    }
    for (idx, activity) in activities.iter().enumerate() {
        writeln!(output, "{}) {}", idx + 1, format_activity(activity)).unwrap();
    }
    output
}
