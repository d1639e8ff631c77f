// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-load action DAG.
//!
//! Actions form a tree rooted at the load action: every node owns its
//! successor lists, so the DAG is built bottom-up and cycles are impossible
//! by construction. The serialized plan (tag `action`, payload `request`)
//! is what gets persisted to the process URL and replayed on recovery.

use crate::id::EventId;
use crate::process::Process;
use crate::table::{TableRef, TableSchema};
use serde::{Deserialize, Serialize};

/// Kinds of post-load work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Load,
    Reload,
    Query,
    Copy,
    Export,
    Drop,
    Notify,
    Delete,
}

crate::simple_display! {
    ActionKind {
        Load => "load",
        Reload => "reload",
        Query => "query",
        Copy => "copy",
        Export => "export",
        Drop => "drop",
        Notify => "notify",
        Delete => "delete",
    }
}

/// How a step executes within one trigger invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepMode {
    /// Submit and poll to completion in this invocation.
    Tail,
    /// Submit, persist a post-job record, and return; completion retriggers.
    Dispatch,
    /// Runs inline and produces no warehouse job.
    Nop,
}

crate::simple_display! {
    StepMode {
        Tail => "tail",
        Dispatch => "dispatch",
        Nop => "nop",
    }
}

/// Write disposition for loads, queries, and copies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteDisposition {
    #[default]
    #[serde(rename = "WRITE_APPEND")]
    Append,
    #[serde(rename = "WRITE_TRUNCATE")]
    Truncate,
}

/// Reference to a submitted warehouse job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub location: String,
    pub job_id: String,
}

/// Load data files into a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub source_uris: Vec<String>,
    pub destination_table: TableRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub write_disposition: WriteDisposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_format: Option<String>,
}

/// Run SQL, optionally materializing into a destination table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_table: Option<TableRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_table: Option<String>,
    #[serde(default)]
    pub write_disposition: WriteDisposition,
}

/// Copy one table into another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRequest {
    pub source_table: TableRef,
    pub destination_table: TableRef,
    #[serde(default)]
    pub write_disposition: WriteDisposition,
}

/// Export a table to object-store files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub source_table: TableRef,
    pub destination_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Drop a (transient) table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropRequest {
    pub table: TableRef,
}

/// Send an operator notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub title: String,
    pub message: String,
}

/// Delete objects from the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    /// Also delete the arrival's own source object.
    #[serde(default)]
    pub include_source: bool,
}

/// Tagged request payload for one action node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "request", rename_all = "camelCase")]
pub enum ActionRequest {
    Load(LoadRequest),
    Reload(LoadRequest),
    Query(QueryRequest),
    Copy(CopyRequest),
    Export(ExportRequest),
    Drop(DropRequest),
    Notify(NotifyRequest),
    Delete(DeleteRequest),
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::Load(_) => ActionKind::Load,
            ActionRequest::Reload(_) => ActionKind::Reload,
            ActionRequest::Query(_) => ActionKind::Query,
            ActionRequest::Copy(_) => ActionKind::Copy,
            ActionRequest::Export(_) => ActionKind::Export,
            ActionRequest::Drop(_) => ActionKind::Drop,
            ActionRequest::Notify(_) => ActionKind::Notify,
            ActionRequest::Delete(_) => ActionKind::Delete,
        }
    }
}

/// Metadata stamped on every action of a plan.
///
/// The embedded [`Process`] carries region and project; successors inherit
/// both unless the planner overrides them per action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMeta {
    #[serde(flatten)]
    pub process: Process,
    #[serde(default)]
    pub step: u32,
    /// Action kind this step was re-wrapped as (e.g. reload on recovery).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped: Option<ActionKind>,
}

impl ActionMeta {
    pub fn new(process: Process) -> Self {
        Self {
            process,
            step: 0,
            wrapped: None,
        }
    }

    /// Re-tag this step as the given kind (keeps everything else).
    pub fn wrap(mut self, kind: ActionKind) -> Self {
        self.wrapped = Some(kind);
        self
    }

    /// Deterministic warehouse job id for this step.
    ///
    /// `<table>--<eventId>--<step>--<mode>` with table punctuation folded to
    /// underscores. Replays of the same (table, event, step) regenerate the
    /// same id, so the warehouse rejects the duplicate instead of redoing
    /// the work.
    pub fn job_id(&self, kind: ActionKind) -> String {
        format!(
            "{}--{}--{:03}--{}",
            sanitize_job_component(&self.process.dest_table),
            sanitize_job_component(self.process.event_id.as_str()),
            self.step,
            self.process.step_mode(kind),
        )
    }

    /// File name of the post-job record for a dispatched step.
    pub fn job_filename(&self, kind: ActionKind) -> String {
        format!("{}.json", self.job_id(kind))
    }
}

/// Components recovered from a deterministic job id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdParts {
    pub dest: String,
    pub event_id: EventId,
    pub step: u32,
    pub mode: String,
}

/// Parse a deterministic job id produced by [`ActionMeta::job_id`].
pub fn parse_job_id(job_id: &str) -> Option<JobIdParts> {
    let parts: Vec<&str> = job_id.split("--").collect();
    if parts.len() != 4 {
        return None;
    }
    let step: u32 = parts[2].parse().ok()?;
    Some(JobIdParts {
        dest: parts[0].to_string(),
        event_id: EventId::new(parts[1]),
        step,
        mode: parts[3].to_string(),
    })
}

fn sanitize_job_component(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// One node of the post-load DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(flatten)]
    pub request: ActionRequest,
    pub meta: ActionMeta,
    /// Warehouse job this action submitted (set on dispatched records).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<JobRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<Action>,
}

impl Action {
    pub fn new(request: ActionRequest, meta: ActionMeta) -> Self {
        Self {
            request,
            meta,
            job: None,
            on_success: Vec::new(),
            on_failure: Vec::new(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.request.kind()
    }

    pub fn with_success(mut self, children: Vec<Action>) -> Self {
        self.on_success = children;
        self
    }

    pub fn with_failure(mut self, children: Vec<Action>) -> Self {
        self.on_failure = children;
        self
    }

    /// Successor set for the observed outcome.
    pub fn to_run(&self, failed: bool) -> &[Action] {
        if failed {
            &self.on_failure
        } else {
            &self.on_success
        }
    }

    /// Total node count of this subtree (diagnostics).
    pub fn node_count(&self) -> usize {
        1 + self
            .on_success
            .iter()
            .chain(self.on_failure.iter())
            .map(Action::node_count)
            .sum::<usize>()
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
