//! Day command: every measurement recorded on one local calendar date.

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use hv_core::convert::{convert_day, day_file_name};

use super::util::{convert_into, local_offset_at, open_log};
use crate::Config;

pub fn run(config: &Config, date: NaiveDate) -> Result<()> {
    let log = open_log(config)?;
    let offset = local_offset_at(&date.and_time(NaiveTime::MIN));
    let options = config.collect_options();
    println!("Processing {date}...");
    convert_into(config, &day_file_name(date), |sink| {
        convert_day(&log, date, offset, &options, sink)
    })?;
    Ok(())
}
