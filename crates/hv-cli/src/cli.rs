//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Health export visualizer.
///
/// Converts workouts, routes, electrocardiograms and daily measurements from
/// an Apple Health export into MCAP files with one channel per data type.
#[derive(Debug, Parser)]
#[command(name = "hv", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Export directory containing `export.xml`.
    #[arg(long, global = true)]
    pub input_dir: Option<PathBuf>,

    /// Directory output files are written to.
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Replace existing output files.
    #[arg(long, global = true)]
    pub overwrite: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Pick a recent workout and convert it with its route and measurements.
    Workouts {
        /// Convert the workout with this number instead of prompting.
        #[arg(long)]
        pick: Option<usize>,
    },

    /// List every indexed workout.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the workout index from the export.
    Reindex,

    /// Pick a route and convert it with the measurements recorded during it.
    Routes {
        /// Convert every route file on its own.
        #[arg(long, conflicts_with = "pick")]
        all: bool,

        /// Convert the route with this number instead of prompting.
        #[arg(long)]
        pick: Option<usize>,
    },

    /// Convert electrocardiogram CSV files.
    Ecg {
        /// Files to convert (default: every CSV in `electrocardiograms/`).
        files: Vec<PathBuf>,
    },

    /// Convert every measurement recorded on one day.
    Day {
        /// Calendar date, e.g. 2024-05-01.
        date: NaiveDate,
    },
}
