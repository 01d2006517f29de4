//! CLI subcommand implementations.

pub mod day;
pub mod ecg;
pub mod list;
pub mod reindex;
pub mod routes;
pub mod util;
pub mod workouts;
