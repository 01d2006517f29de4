//! Reindex command: rebuild the workout index sidecar.

use anyhow::{Context, Result};
use hv_core::index;

use super::util::open_log;
use crate::Config;

pub fn run(config: &Config) -> Result<()> {
    let log = open_log(config)?;
    let activities = index::rebuild(&log).context("failed to rebuild workout index")?;
    println!(
        "Indexed {} workouts into {}",
        activities.len(),
        index::index_path(log.path()).display()
    );
    Ok(())
}
