// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch window coordinator.
//!
//! For every arrival targeting a batched rule, exactly one concurrent
//! worker per (destination table × time bucket) becomes the window owner.
//! The create-only put of the window object is the only serialization
//! primitive; losers deterministically discover the owner by reading the
//! object that beat them.

use chrono::Duration as ChronoDuration;
use wr_adapters::{Gateway, ObjectStore, PutMode};
use wr_core::config::{LOCATION_EXT, WINDOW_EXT};
use wr_core::{short_hash, url, BatchOutcome, ErrorKind, PipelineError, Process, Window};
use wr_rules::Rule;

/// Floor for the close jitter: lets storage list indexes settle before the
/// owner enumerates the window's files.
pub const STORAGE_VISIBILITY_DELAY_MS: u64 = 1_000;

/// Window acquisition and close-time enumeration.
#[derive(Clone)]
pub struct BatchCoordinator<S> {
    store: Gateway<S>,
    batch_base: String,
}

impl<S: ObjectStore> BatchCoordinator<S> {
    pub fn new(store: Gateway<S>, batch_base: impl Into<String>) -> Self {
        Self {
            store,
            batch_base: batch_base.into(),
        }
    }

    /// Window storage key for a destination.
    ///
    /// Single-path rules salt the key with the source parent directory so
    /// each directory stream gets its own window.
    fn window_key(&self, process: &Process, rule: &Rule) -> String {
        let multi_path = rule.batch.as_ref().map(|b| b.multi_path).unwrap_or(false);
        if multi_path {
            process.dest_table.clone()
        } else {
            let (parent, _) = url::split(&process.source.source_url);
            format!("{}_{}", process.dest_table, short_hash(&parent))
        }
    }

    fn window_url(&self, key: &str, end: chrono::DateTime<chrono::Utc>) -> String {
        let end_nanos = end.timestamp_nanos_opt().unwrap_or_default();
        url::join(&self.batch_base, &[key, &format!("{end_nanos}{WINDOW_EXT}")])
    }

    /// `.loc` sibling URL for a participating parent directory.
    fn location_url(window_url: &str, parent: &str) -> String {
        let base = window_url
            .strip_suffix(WINDOW_EXT)
            .unwrap_or(window_url)
            .to_string();
        format!("{}/{}{}", base, short_hash(parent), LOCATION_EXT)
    }

    /// Record this worker's source directory so the owner can enumerate it
    /// at close. Losing the create race to another worker is fine.
    async fn add_location(&self, window_url: &str, parent: &str) -> Result<(), PipelineError> {
        let loc_url = Self::location_url(window_url, parent);
        match self
            .store
            .put(&loc_url, parent.as_bytes().to_vec(), PutMode::IfAbsent)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.kind == ErrorKind::PreconditionFailed => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a window object; a zero-byte object means the owner's create
    /// is not fully visible yet and the trigger should be redelivered.
    pub async fn read_window(&self, window_url: &str) -> Result<Window, PipelineError> {
        let data = self.store.get(window_url).await.map_err(PipelineError::from)?;
        if data.is_empty() {
            return Err(PipelineError::retryable(format!(
                "window not yet visible: {window_url}"
            )));
        }
        serde_json::from_slice(&data).map_err(|e| {
            PipelineError::internal(format!("invalid window {window_url}: {e}"))
        })
    }

    /// Acquire the batch window for one arrival.
    pub async fn try_acquire(
        &self,
        process: &Process,
        rule: &Rule,
    ) -> Result<BatchOutcome, PipelineError> {
        let batch = rule
            .batch
            .as_ref()
            .ok_or_else(|| PipelineError::config(format!("rule has no batch: {}", rule.url)))?;
        let (parent, _) = url::split(&process.source.source_url);
        let key = self.window_key(process, rule);

        let end = batch.bucket_end(process.source.source_time);
        let mut start = end - ChronoDuration::nanoseconds(batch.window_nanos());
        let window_url = self.window_url(&key, end);

        if self.store.exists(&window_url).await.map_err(PipelineError::from)? {
            if batch.multi_path {
                self.add_location(&window_url, &parent).await?;
            }
            let existing = self.read_window(&window_url).await?;
            return Ok(BatchOutcome::Follower {
                owner_event_id: existing.event_id,
            });
        }

        // Rollover: a late arrival whose previous bucket never opened
        // extends this window back to absorb the stragglers.
        if batch.rollover && !batch.is_within_first_half(process.source.source_time) {
            let prev_url = self.window_url(&key, start);
            if !self.store.exists(&prev_url).await.map_err(PipelineError::from)? {
                start -= ChronoDuration::nanoseconds(batch.window_nanos());
            }
        }

        let window = Window::new(process.clone(), start, end, window_url.clone());
        let payload = serde_json::to_vec(&window)
            .map_err(|e| PipelineError::internal(format!("window encode: {e}")))?;
        match self.store.put(&window_url, payload, PutMode::IfAbsent).await {
            Ok(()) => {
                if batch.multi_path {
                    self.add_location(&window_url, &parent).await?;
                }
                tracing::info!(
                    window = %window_url,
                    dest = %window.dest_table,
                    "window acquired"
                );
                Ok(BatchOutcome::Owner(Box::new(window)))
            }
            Err(e)
                if e.kind == ErrorKind::PreconditionFailed
                    || e.kind == ErrorKind::RateLimited =>
            {
                // Lost the race: the winner's object names the owner.
                if batch.multi_path {
                    self.add_location(&window_url, &parent).await?;
                }
                let existing = self.read_window(&window_url).await?;
                Ok(BatchOutcome::Follower {
                    owner_event_id: existing.event_id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Enumerate the window's data URIs (owner only, after `end`).
    ///
    /// Lists every participating base directory and keeps files that match
    /// the rule, expand to the window's table, and were modified inside
    /// `[start, end)`.
    pub async fn collect_window_uris(
        &self,
        rule: &Rule,
        window: &mut Window,
    ) -> Result<(), PipelineError> {
        let mut bases = Vec::new();
        let (opener_parent, _) = url::split(&window.process.source.source_url);
        bases.push(opener_parent);

        let multi_path = rule.batch.as_ref().map(|b| b.multi_path).unwrap_or(false);
        if multi_path {
            window.locations.clear();
            let dir = window
                .window_url
                .strip_suffix(WINDOW_EXT)
                .unwrap_or(&window.window_url)
                .to_string();
            for meta in self.store.list(&dir).await.map_err(PipelineError::from)? {
                if meta.is_dir || !meta.name.ends_with(LOCATION_EXT) {
                    continue;
                }
                let data = self.store.get(&meta.url).await.map_err(PipelineError::from)?;
                let location = String::from_utf8_lossy(&data).trim().to_string();
                window.locations.push(meta.url.clone());
                if !location.is_empty() && !bases.contains(&location) {
                    bases.push(location);
                }
            }
        }

        let mut uris = Vec::new();
        for base in &bases {
            for meta in self.store.list(base).await.map_err(PipelineError::from)? {
                if meta.is_dir || !rule.has_match(&meta.url) {
                    continue;
                }
                let table = rule.expand_table(&meta.url, meta.mod_time)?;
                if table != window.dest_table {
                    continue;
                }
                if meta.mod_time < window.start || meta.mod_time >= window.end {
                    continue;
                }
                uris.push(meta.url.clone());
            }
        }
        uris.sort();
        uris.dedup();
        window.uris = uris;
        Ok(())
    }
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod tests;
