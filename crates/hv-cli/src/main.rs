use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hv_cli::commands::{day, ecg, list, reindex, routes, workouts};
use hv_cli::{Cli, Commands, Config};

/// Load config and apply command-line overrides.
fn load_config(cli: &Cli, config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path)
        .context("failed to load configuration")?
        .with_cli(cli);
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = load_config(&cli, cli.config.as_deref())?;
    match command {
        Commands::Workouts { pick } => workouts::run(&config, *pick)?,
        Commands::List { json } => list::run(&config, *json)?,
        Commands::Reindex => reindex::run(&config)?,
        Commands::Routes { all, pick } => routes::run(&config, *all, *pick)?,
        Commands::Ecg { files } => ecg::run(&config, files)?,
        Commands::Day { date } => day::run(&config, *date)?,
    }

    Ok(())
}
