//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use hv_core::{CollectOptions, TimestampField};
use serde::{Deserialize, Serialize};

use crate::Cli;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Export directory containing `export.xml`.
    pub input_dir: PathBuf,
    /// Directory output files are written to.
    pub output_dir: PathBuf,
    /// Replace existing output files.
    pub overwrite: bool,
    /// Measurement sources left out of every conversion.
    pub excluded_sources: Vec<String>,
    /// Record attribute used as the timestamp of measurements.
    pub measurement_time: TimestampField,
    /// Number of entries shown before prompting.
    pub recent_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./apple_health_export"),
            output_dir: PathBuf::from("./output"),
            overwrite: false,
            excluded_sources: Vec::new(),
            measurement_time: TimestampField::default(),
            recent_count: 10,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("HV_"));

        figment.extract()
    }

    /// Applies command-line flags on top of the loaded configuration.
    #[must_use]
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(dir) = &cli.input_dir {
            self.input_dir.clone_from(dir);
        }
        if let Some(dir) = &cli.output_dir {
            self.output_dir.clone_from(dir);
        }
        self.overwrite |= cli.overwrite;
        self
    }

    pub fn log_path(&self) -> PathBuf {
        self.input_dir.join("export.xml")
    }

    pub fn routes_dir(&self) -> PathBuf {
        self.input_dir.join("workout-routes")
    }

    pub fn ecg_dir(&self) -> PathBuf {
        self.input_dir.join("electrocardiograms")
    }

    pub fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            excluded_sources: self.excluded_sources.clone(),
            timestamp_field: self.measurement_time,
        }
    }
}

/// Returns the platform-specific config directory for hv.
///
/// On Linux: `~/.config/hv`
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("hv"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use clap::Parser;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn defaults_match_export_layout() {
        let config = Config::default();
        assert_eq!(config.log_path(), Path::new("./apple_health_export/export.xml"));
        assert_eq!(
            config.routes_dir(),
            Path::new("./apple_health_export/workout-routes")
        );
        assert_eq!(config.recent_count, 10);
        assert_eq!(config.measurement_time, TimestampField::CreationDate);
    }

    #[test]
    fn config_file_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hv.toml");
        fs::write(
            &path,
            r#"
output_dir = "/tmp/hv-out"
excluded_sources = ["WaterMinder"]
measurement_time = "end_date"
recent_count = 5
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();

        assert_eq!(config.output_dir, Path::new("/tmp/hv-out"));
        assert_eq!(config.excluded_sources, vec!["WaterMinder".to_string()]);
        assert_eq!(config.measurement_time, TimestampField::EndDate);
        assert_eq!(config.recent_count, 5);
        assert_eq!(config.collect_options().timestamp_field, TimestampField::EndDate);
    }

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::parse_from([
            "hv",
            "--input-dir",
            "/data/export",
            "--overwrite",
            "reindex",
        ]);

        let config = Config::default().with_cli(&cli);

        assert_eq!(config.input_dir, Path::new("/data/export"));
        assert_eq!(config.output_dir, Path::new("./output"));
        assert!(config.overwrite);
    }

    #[test]
    fn dirs_config_path_ends_with_hv() {
        let path = dirs_config_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "hv");
    }
}
