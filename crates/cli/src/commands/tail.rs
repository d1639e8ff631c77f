// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wr tail`: process one trigger delivery.

use crate::runtime;
use anyhow::Result;
use clap::Args;
use tokio_util::sync::CancellationToken;
use wr_core::{Config, TriggerRequest};

#[derive(Args)]
pub struct TailArgs {
    /// Source object URL of the trigger
    #[arg(long = "source-url", value_name = "URL")]
    source_url: String,

    /// Stable event id (generated when omitted)
    #[arg(long = "event-id", value_name = "ID")]
    event_id: Option<String>,
}

pub async fn run(config: Config, args: TailArgs) -> Result<()> {
    let service = runtime::service(config);
    let event_id = args
        .event_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request = TriggerRequest::new(event_id, args.source_url);

    let cancel = CancellationToken::new();
    let guard = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            guard.cancel();
        }
    });

    let response = service.handle(request, cancel).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}
