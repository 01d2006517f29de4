//! ECG command: convert electrocardiogram CSV exports.

use std::path::PathBuf;

use anyhow::Result;
use hv_core::convert::{convert_ecg, stem_file_name};

use super::util::{convert_into, files_with_extension};
use crate::Config;

pub fn run(config: &Config, files: &[PathBuf]) -> Result<()> {
    let files = if files.is_empty() {
        let dir = config.ecg_dir();
        if !dir.is_dir() {
            println!("No electrocardiograms directory at {}.", dir.display());
            return Ok(());
        }
        files_with_extension(&dir, "csv")?
    } else {
        files.to_vec()
    };

    if files.is_empty() {
        println!("No ECG files to convert.");
        return Ok(());
    }

    for path in &files {
        convert_into(config, &stem_file_name(path), |sink| convert_ecg(path, sink))?;
    }
    Ok(())
}
