//! pgfunc - PostgreSQL/PostGIS connection profiles and stored function runner
//!
//! Thin entry point; the logic lives in the library.

use anyhow::Result;
use clap::Parser;
use pgfunc::commands::{self, Cli, Context};
use pgfunc::config::settings;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => settings::load_settings_from(path)?,
        None => settings::load_settings()?,
    };
    init_logging(cli.verbose, &settings.log_level);

    let ctx = Context::new(settings, cli.profiles, cli.connection)?;
    commands::execute(&ctx, cli.command).await
}

/// RUST_LOG wins, then -v flags, then the configured level
fn init_logging(verbose: u8, configured: &str) {
    let level = match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
