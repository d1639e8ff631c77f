// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-arrival work ticket.
//!
//! A [`Process`] is created when a new arrival is accepted and is owned by
//! exactly one worker until it is persisted to its done URL. It carries
//! everything needed to rebuild and replay the load plan.

use crate::action::{ActionKind, StepMode};
use crate::id::EventId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The storage object that triggered an arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub source_url: String,
    pub source_time: DateTime<Utc>,
}

impl Source {
    pub fn new(source_url: impl Into<String>, source_time: DateTime<Utc>) -> Self {
        Self {
            source_url: source_url.into(),
            source_time,
        }
    }
}

/// Work ticket for one arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub event_id: EventId,
    #[serde(flatten)]
    pub source: Source,
    pub rule_url: String,
    /// Expanded destination table (`project:dataset.table`).
    #[serde(default)]
    pub dest_table: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub region: String,
    /// Transient table the load lands in when the rule stages through one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_table: Option<String>,
    /// Where the serialized action plan is persisted before submission.
    #[serde(default)]
    pub process_url: String,
    /// Where the plan is moved on a terminal outcome.
    #[serde(default)]
    pub done_process_url: String,
    #[serde(default)]
    pub step_count: u32,
    /// Dispatched (fire-and-forget) post-load execution when set.
    #[serde(rename = "async", default)]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, serde_json::Value>,
}

impl Process {
    pub fn new(event_id: EventId, source: Source, rule_url: impl Into<String>, is_async: bool) -> Self {
        Self {
            event_id,
            source,
            rule_url: rule_url.into(),
            dest_table: String::new(),
            project_id: String::new(),
            region: String::new(),
            temp_table: None,
            process_url: String::new(),
            done_process_url: String::new(),
            step_count: 0,
            is_async,
            params: HashMap::new(),
        }
    }

    /// Increment and return the step counter.
    pub fn inc_step(&mut self) -> u32 {
        self.step_count += 1;
        self.step_count
    }

    pub fn is_sync_mode(&self) -> bool {
        !self.is_async
    }

    /// Use the already-selected project, or record the given default.
    pub fn get_or_set_project(&mut self, project_id: &str) -> String {
        if self.project_id.is_empty() {
            self.project_id = project_id.to_string();
        }
        self.project_id.clone()
    }

    /// Execution mode for an action of the given kind in this process.
    ///
    /// Only warehouse-job kinds can be dispatched; everything else runs
    /// inline regardless of the rule's async flag.
    pub fn step_mode(&self, kind: ActionKind) -> StepMode {
        match kind {
            ActionKind::Load
            | ActionKind::Reload
            | ActionKind::Query
            | ActionKind::Copy
            | ActionKind::Export => {
                if self.is_async {
                    StepMode::Dispatch
                } else {
                    StepMode::Tail
                }
            }
            ActionKind::Drop | ActionKind::Notify | ActionKind::Delete => StepMode::Nop,
        }
    }
}

crate::builder! {
    pub struct ProcessBuilder => Process {
        into {
            event_id: EventId = "evt-1",
            rule_url: String = "mem://config/rules/test.yaml",
            dest_table: String = "proj:dataset.table",
            project_id: String = "proj",
            region: String = "",
            process_url: String = "",
            done_process_url: String = "",
        }
        set {
            source: Source = Source::new(
                "mem://data/in/part-1.json",
                chrono::TimeZone::timestamp_opt(&chrono::Utc, 1_700_000_000, 0)
                    .single()
                    .unwrap_or_default(),
            ),
            step_count: u32 = 0,
            is_async: bool = false,
            params: HashMap<String, serde_json::Value> = HashMap::new(),
        }
        option {
            temp_table: String = None,
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
