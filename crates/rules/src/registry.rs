// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule registry.
//!
//! Catalog of all loaded rules, keyed by rule-file URL in alphabetical
//! order. Reload swaps the whole set behind a lock, so concurrent readers
//! never observe a partially-built rule.

use crate::parser::{format_for_name, parse_rules};
use crate::rule::Rule;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use wr_adapters::ObjectStore;
use wr_core::PipelineError;

#[derive(Default)]
struct RegistryState {
    /// Rule-file URL → rules, in rule-file-alphabetical order.
    files: IndexMap<String, Vec<Arc<Rule>>>,
    /// (file count, newest mod time) of the last successful load.
    signature: Option<(usize, DateTime<Utc>)>,
}

/// Reloading rule catalog.
pub struct Registry {
    rules_url: String,
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new(rules_url: impl Into<String>) -> Self {
        Self {
            rules_url: rules_url.into(),
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn rules_url(&self) -> &str {
        &self.rules_url
    }

    /// Re-read the rules directory when its signature advanced.
    ///
    /// Returns `true` when a reload happened. Unparseable files are
    /// skipped with a warning so one bad rule cannot take ingestion down.
    pub async fn reload_if_needed<S: ObjectStore>(&self, store: &S) -> Result<bool, PipelineError> {
        let listed = store
            .list(&self.rules_url)
            .await
            .map_err(PipelineError::from)?;
        let mut rule_files: Vec<_> = listed
            .into_iter()
            .filter(|meta| !meta.is_dir && format_for_name(&meta.name).is_some())
            .collect();
        rule_files.sort_by(|a, b| a.name.cmp(&b.name));

        let signature = (
            rule_files.len(),
            rule_files
                .iter()
                .map(|meta| meta.mod_time)
                .max()
                .unwrap_or_default(),
        );
        if self.state.read().signature == Some(signature) {
            return Ok(false);
        }

        let mut files = IndexMap::new();
        for meta in &rule_files {
            let Some(format) = format_for_name(&meta.name) else {
                continue;
            };
            let data = store.get(&meta.url).await.map_err(PipelineError::from)?;
            let content = String::from_utf8_lossy(&data);
            match parse_rules(&content, format, &meta.url) {
                Ok(rules) => {
                    files.insert(meta.url.clone(), rules.into_iter().map(Arc::new).collect());
                }
                Err(e) => {
                    tracing::warn!(url = %meta.url, error = %e, "skipping invalid rule file");
                }
            }
        }

        let loaded: usize = files.values().map(Vec::len).sum();
        tracing::info!(rules = loaded, files = files.len(), "rules loaded");
        let mut state = self.state.write();
        state.files = files;
        state.signature = Some(signature);
        Ok(true)
    }

    /// First rule matching the source URL, in rule-file-alphabetical order.
    ///
    /// Two matches inside one file are a configuration error.
    pub fn match_source(&self, source_url: &str) -> Result<Option<Arc<Rule>>, PipelineError> {
        let state = self.state.read();
        for (file_url, rules) in &state.files {
            let matches: Vec<_> = rules.iter().filter(|r| r.has_match(source_url)).collect();
            match matches.len() {
                0 => continue,
                1 => return Ok(Some(Arc::clone(matches[0]))),
                n => {
                    return Err(PipelineError::config(format!(
                        "{n} rules in {file_url} match {source_url}"
                    )))
                }
            }
        }
        Ok(None)
    }

    /// Rule by its rule-file URL (first rule of the file).
    pub fn get(&self, rule_url: &str) -> Option<Arc<Rule>> {
        self.state
            .read()
            .files
            .get(rule_url)
            .and_then(|rules| rules.first())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().files.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
