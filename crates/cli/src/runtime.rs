// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service assembly and configuration loading.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use wr_adapters::{DesktopNotifyAdapter, LocalFsStore, MemWarehouse};
use wr_core::{Config, SystemClock};
use wr_engine::{ServiceCell, TailService};

/// Environment key holding the config path (or the inline JSON document).
pub const CONFIG_ENV_KEY: &str = "WR_CONFIG";

/// Service type for local operation: filesystem store, in-process
/// warehouse, desktop notifications.
pub type LocalService = TailService<LocalFsStore, MemWarehouse, DesktopNotifyAdapter, SystemClock>;

/// Warm-start holder reused across invocations within one process.
static SERVICE: ServiceCell<LocalService> = ServiceCell::new();

/// Load the service config from an explicit path or `WR_CONFIG`.
///
/// The environment value may be a path or the JSON document itself.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        return Ok(Config::from_json(&text)?);
    }
    if let Ok(value) = std::env::var(CONFIG_ENV_KEY) {
        let trimmed = value.trim();
        if trimmed.starts_with('{') {
            return Ok(Config::from_json(trimmed)?);
        }
        let text = std::fs::read_to_string(trimmed)
            .with_context(|| format!("failed to read config: {trimmed}"))?;
        return Ok(Config::from_json(&text)?);
    }
    let fallback = dirs::home_dir().map(|home| home.join(".config/wr/config.json"));
    if let Some(fallback) = fallback.filter(|p| p.exists()) {
        let text = std::fs::read_to_string(&fallback)
            .with_context(|| format!("failed to read config: {}", fallback.display()))?;
        return Ok(Config::from_json(&text)?);
    }
    bail!("no config: pass --config or set {CONFIG_ENV_KEY}")
}

/// The process-wide service (fresh when `runOnce` is set).
pub fn service(config: Config) -> Arc<LocalService> {
    let run_once = config.run_once;
    SERVICE.get_or_init(run_once, move || {
        Arc::new(TailService::new(
            config,
            LocalFsStore::new(),
            MemWarehouse::new(),
            DesktopNotifyAdapter::new(),
            SystemClock,
        ))
    })
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
