// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch window record.
//!
//! One window exists per (destination table × time bucket); the object at
//! the window URL is the serialization of this struct and doubles as the
//! ownership lock (create-only put).

use crate::id::EventId;
use crate::process::Process;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shared batch-window state.
///
/// Invariants:
/// - `start < end` and `end - start` equals the rule's window duration
///   (except when rollover extended `start` back by one duration);
/// - at most one window object exists at `window_url` for a bucket;
/// - a URI never belongs to two windows at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    /// Event id of the arrival that opened the window.
    pub event_id: EventId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// URL of the window object itself.
    pub window_url: String,
    pub rule_url: String,
    pub dest_table: String,
    /// Work ticket of the opener; the owner drives the load with it.
    pub process: Process,
    /// Multi-path participation markers read back at close.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
    /// Data URIs enumerated when the window closed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<String>,
    /// Failure recorded by a post-load stage, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

impl Window {
    pub fn new(
        process: Process,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        window_url: impl Into<String>,
    ) -> Self {
        Self {
            event_id: process.event_id.clone(),
            start,
            end,
            window_url: window_url.into(),
            rule_url: process.rule_url.clone(),
            dest_table: process.dest_table.clone(),
            process,
            locations: Vec::new(),
            uris: Vec::new(),
            load_error: None,
        }
    }
}

/// Result of a window-acquisition attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// This worker created the window object and owns the close.
    Owner(Box<Window>),
    /// Another worker owns the window; its opener event id is recorded in
    /// the response for tracing.
    Follower { owner_event_id: EventId },
}

impl BatchOutcome {
    pub fn window(&self) -> Option<&Window> {
        match self {
            BatchOutcome::Owner(window) => Some(window),
            BatchOutcome::Follower { .. } => None,
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, BatchOutcome::Owner(_))
    }
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod tests;
