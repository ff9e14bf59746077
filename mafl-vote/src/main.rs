//! mafl-vote - Multi-atlas label fusion
//!
//! Resamples template labels into each target's space and fuses them by
//! voting. Exits non-zero when startup fails or any target fails; a run in
//! which every strategy was already complete exits zero.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use mafl_common::config::{CompiledDefaults, TomlConfig};
use mafl_vote::cli::Args;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse command-line arguments and merge config
    let args = Args::parse();
    let config_source = TomlConfig::source(args.config.as_deref());
    let toml_config = match &config_source {
        Some(path) => TomlConfig::load(path).context("Failed to load configuration")?,
        None => TomlConfig::default(),
    };
    let defaults = CompiledDefaults::for_current_platform();
    let settings = args.resolve(&toml_config, &defaults)?;

    // Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting mafl-vote v{}", env!("CARGO_PKG_VERSION"));
    match &config_source {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("No config file found, using compiled defaults"),
    }
    info!("Input: {}", settings.input_dir.display());
    info!("Output: {}", settings.output_dir.display());
    info!("Registrations: {}", settings.registrations_dir.display());
    info!("Temp root: {}", settings.temp_root.display());
    info!("Processes: {}", settings.concurrency);

    let executor = mafl_vote::executor_for(&settings);
    let summary = match mafl_vote::run(&settings, executor).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Fusion run aborted: {}", e);
            return Err(e.into());
        }
    };

    if let Some(path) = &settings.summary {
        summary
            .write_json(path)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        info!("Summary written to {}", path.display());
    }

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("{} target(s) failed", summary.failed());
        Ok(ExitCode::FAILURE)
    }
}
