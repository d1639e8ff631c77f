// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wr plan`: build and print a load plan without submitting it.

use anyhow::{bail, Result};
use clap::Args;
use std::sync::Arc;
use wr_adapters::{LocalFsStore, MemWarehouse, ObjectStore};
use wr_core::{Config, Process, Source};
use wr_engine::Planner;
use wr_rules::Registry;

#[derive(Args)]
pub struct PlanArgs {
    /// Source object URL to plan a load for
    #[arg(long = "source-url", value_name = "URL")]
    source_url: String,

    /// Stable event id (generated when omitted)
    #[arg(long = "event-id", value_name = "ID")]
    event_id: Option<String>,
}

pub async fn run(config: Config, args: PlanArgs) -> Result<()> {
    let store = LocalFsStore::new();
    let registry = Registry::new(config.rules_url.clone());
    registry.reload_if_needed(&store).await?;
    let Some(rule) = registry.match_source(&args.source_url)? else {
        bail!("no rule matches {}", args.source_url);
    };

    let source_time = match store.stat(&args.source_url).await {
        Ok(meta) => meta.mod_time,
        Err(_) => chrono::Utc::now(),
    };
    let event_id = args
        .event_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut process = Process::new(
        event_id.into(),
        Source::new(&args.source_url, source_time),
        &rule.url,
        rule.is_async,
    );
    process.dest_table = rule.expand_table(&args.source_url, source_time)?;
    config.assign_process_urls(&mut process);

    // Planning only: region/schema lookups run against the in-process
    // warehouse, nothing is submitted.
    let planner = Planner::new(Arc::new(config));
    process.project_id = planner.select_project(&rule);
    let job = planner
        .build(rule, process, None, &MemWarehouse::new())
        .await?;
    println!("{}", serde_json::to_string_pretty(&vec![&job.plan])?);
    Ok(())
}
