// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger contract: request and response envelope.

use crate::action::JobRef;
use crate::error::PipelineError;
use crate::id::EventId;
use crate::process::Process;
use crate::url;
use crate::window::Window;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";
pub const STATUS_NOT_FOUND: &str = "notFound";

/// One delivery of a storage-object event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub event_id: EventId,
    #[serde(rename = "sourceURL")]
    pub source_url: String,
}

impl TriggerRequest {
    pub fn new(event_id: impl Into<EventId>, source_url: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            source_url: source_url.into(),
        }
    }

    /// True when the source path falls under the given prefix.
    pub fn has_url_prefix(&self, prefix: &str) -> bool {
        url::has_path_prefix(&self.source_url, prefix)
    }
}

/// Everything a trigger invocation reports back to its invoker.
///
/// The invoker redelivers the event whenever `retriable` is set; every
/// other field is diagnostic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub event_id: EventId,
    #[serde(rename = "triggerURL", default, skip_serializing_if = "String::is_empty")]
    pub trigger_url: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default)]
    pub retriable: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub retry_error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_ref: Option<JobRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<Window>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<Process>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub move_error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub upload_error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub not_found_error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub download_error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub counter_error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub load_error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_schema: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrupted: Vec<String>,
    /// Event id of the window owner when this arrival only joined a batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batching_event_id: Option<EventId>,
    /// True when this invocation closed and loaded a window.
    #[serde(default)]
    pub batch_runner: bool,
    #[serde(default)]
    pub list_op_count: u64,
    /// Store retry counts by error class, drained from the gateway gauges.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub storage_retries: HashMap<String, u64>,
    #[serde(default)]
    pub time_taken_ms: u64,
}

impl TriggerResponse {
    pub fn new(event_id: EventId) -> Self {
        Self {
            event_id,
            status: STATUS_OK.to_string(),
            ..Self::default()
        }
    }

    /// Record an error unless one is already present.
    pub fn set_if_error(&mut self, err: &PipelineError) {
        if self.error.is_empty() {
            self.status = STATUS_ERROR.to_string();
            self.error = err.to_string();
            self.retriable = err.is_retryable();
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

#[cfg(test)]
#[path = "contract_tests.rs"]
mod tests;
