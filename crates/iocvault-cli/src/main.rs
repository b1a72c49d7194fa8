//! CLI entry point for iocvault.
//!
//! This binary provides the `iocvault` command: integration management,
//! indicator lookups, AbuseIPDB reports, user removal and a health check.

mod cli;
mod commands;
mod config;
mod helpers;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;
use crate::config::AppConfig;
use crate::helpers::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    init_tracing(&config.log.level, config.log.json);

    commands::run(&config, cli.config.as_deref(), cli.command).await
}
