// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wr rules`: rule inspection.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use wr_adapters::{LocalFsStore, ObjectStore};
use wr_core::Config;
use wr_rules::{format_for_name, parse_rules, Registry};

#[derive(Args)]
pub struct RulesArgs {
    #[command(subcommand)]
    command: RulesCommand,
}

#[derive(Subcommand)]
enum RulesCommand {
    /// Parse and validate every rule file
    Check,
    /// Show the rule (and expanded table) matching a source URL
    Match {
        #[arg(value_name = "URL")]
        source_url: String,
    },
}

pub async fn run(config: Config, args: RulesArgs) -> Result<()> {
    let store = LocalFsStore::new();
    match args.command {
        RulesCommand::Check => check(&config, &store).await,
        RulesCommand::Match { source_url } => match_url(&config, &store, &source_url).await,
    }
}

async fn check(config: &Config, store: &LocalFsStore) -> Result<()> {
    let mut failures = 0usize;
    let mut total = 0usize;
    for meta in store.list(&config.rules_url).await? {
        let Some(format) = format_for_name(&meta.name) else {
            continue;
        };
        let data = store.get(&meta.url).await?;
        match parse_rules(&String::from_utf8_lossy(&data), format, &meta.url) {
            Ok(rules) => {
                total += rules.len();
                println!("ok   {} ({} rule(s))", meta.url, rules.len());
            }
            Err(e) => {
                failures += 1;
                println!("FAIL {}: {e}", meta.url);
            }
        }
    }
    println!("{total} rule(s) valid, {failures} file(s) failed");
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn match_url(config: &Config, store: &LocalFsStore, source_url: &str) -> Result<()> {
    let registry = Registry::new(config.rules_url.clone());
    registry.reload_if_needed(store).await?;
    let Some(rule) = registry.match_source(source_url)? else {
        bail!("no rule matches {source_url}");
    };
    // Expansion previews against the current time when the object is absent.
    let source_time = match store.stat(source_url).await {
        Ok(meta) => meta.mod_time,
        Err(_) => chrono::Utc::now(),
    };
    let table = rule.expand_table(source_url, source_time)?;
    println!("rule:  {}", rule.url);
    println!("table: {table}");
    if let Some(batch) = &rule.batch {
        println!("batch: window={}s multiPath={}", batch.window.as_secs(), batch.multi_path);
    }
    Ok(())
}
