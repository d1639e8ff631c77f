// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wr - Windrow CLI
//!
//! Local operation of the ingestion pipeline: process a trigger, inspect
//! rules, and print load plans. The cloud entry glue delivers triggers to
//! the same service this binary drives.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;
mod runtime;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{plan, rules, tail};

#[derive(Parser)]
#[command(
    name = "wr",
    version,
    about = "Windrow - batched object-store ingestion into a warehouse"
)]
struct Cli {
    /// Path to the service config JSON (defaults to $WR_CONFIG)
    #[arg(long = "config", global = true, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one trigger delivery
    Tail(tail::TailArgs),
    /// Rule inspection
    Rules(rules::RulesArgs),
    /// Build and print a load plan without submitting it
    Plan(plan::PlanArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = runtime::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Tail(args) => tail::run(config, args).await,
        Commands::Rules(args) => rules::run(config, args).await,
        Commands::Plan(args) => plan::run(config, args).await,
    }
}
