//! Workout selection and conversion (`hv workouts`).

use std::io;

use anyhow::{Context, Result};
use hv_core::convert::{convert_workout, workout_file_name};
use hv_core::{ActivitySummary, EventLog, index};

use super::util::{convert_into, open_log, pick_index, prompt_selection};
use crate::Config;

/// One line per workout: `Running (Watch) - 2024-05-01 08:00:00 -0400 (30 min)`.
pub fn format_activity(activity: &ActivitySummary) -> String {
    format!(
        "{} ({}) - {} ({:.0} {})",
        activity.activity_type,
        activity.source_name,
        activity.start_date,
        activity.duration.round(),
        activity.duration_unit
    )
}

pub fn run(config: &Config, pick: Option<usize>) -> Result<()> {
    let log = open_log(config)?;
    let activities = index::load_or_build(&log).context("failed to load workout index")?;
    if activities.is_empty() {
        println!("No workouts found in {}.", log.path().display());
        return Ok(());
    }

    let choice = if let Some(pick) = pick {
        pick_index(pick, activities.len())?
    } else {
        let labels: Vec<String> = activities.iter().map(format_activity).collect();
        let stdin = io::stdin();
        let selected = prompt_selection(
            &mut stdin.lock(),
            &mut io::stdout(),
            "workout",
            &labels,
            config.recent_count,
        )
        .context("failed to read selection")?;
        let Some(choice) = selected else {
            return Ok(());
        };
        choice
    };

    convert(config, &log, &activities[choice])
}

fn convert(config: &Config, log: &EventLog, activity: &ActivitySummary) -> Result<()> {
    println!("Processing {}...", format_activity(activity));
    let export_dir = config.input_dir.clone();
    let options = config.collect_options();
    convert_into(config, &workout_file_name(activity), |sink| {
        convert_workout(log, activity, &export_dir, &options, sink)
    })?;
    Ok(())
}
