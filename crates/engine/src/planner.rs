// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Load planner.
//!
//! Turns (rule, process, optional window) into a [`LoadJob`]: the load
//! request plus the whole post-load action DAG, with deterministic step
//! numbers so replays regenerate identical job ids. The serialized plan is
//! persisted to the process URL before submission and is the recovery root.

use crate::split;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wr_adapters::{Gateway, ObjectStore, PutMode, Warehouse, WarehouseJob};
use wr_core::{
    Action, ActionKind, ActionMeta, ActionRequest, Config, CopyRequest, DeleteRequest,
    DropRequest, ExportRequest, LoadRequest, NotifyRequest, PipelineError, Process, QueryRequest,
    TableRef, TableSchema, Window, WriteDisposition,
};
use wr_rules::{ActionDef, Rule};

/// A planned (and later submitted) load.
#[derive(Debug, Clone)]
pub struct LoadJob {
    pub rule: Arc<Rule>,
    pub process: Process,
    pub window: Option<Window>,
    /// Root of the action DAG; the load itself is the root node.
    pub plan: Action,
    /// Live job handle once submitted.
    pub job: Option<WarehouseJob>,
}

impl LoadJob {
    pub fn load_request(&self) -> Option<&LoadRequest> {
        match &self.plan.request {
            ActionRequest::Load(load) | ActionRequest::Reload(load) => Some(load),
            _ => None,
        }
    }

    /// Persist the plan to the process URL (the recovery root).
    pub async fn persist<S: ObjectStore>(&self, store: &Gateway<S>) -> Result<(), PipelineError> {
        let payload = serde_json::to_vec_pretty(&vec![&self.plan])
            .map_err(|e| PipelineError::internal(format!("plan encode: {e}")))?;
        store
            .put(&self.process.process_url, payload, PutMode::Overwrite)
            .await
            .map_err(PipelineError::from)
    }
}

/// Builds load jobs.
pub struct Planner {
    config: Arc<Config>,
    transient_rotation: AtomicUsize,
}

impl Planner {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            transient_rotation: AtomicUsize::new(0),
        }
    }

    /// Project the load job runs in: round-robin over the rule's transient
    /// candidates, else the configured default.
    pub fn select_project(&self, rule: &Rule) -> String {
        match &rule.dest.transient {
            Some(t) if !t.project_ids.is_empty() => {
                let index = self.transient_rotation.fetch_add(1, Ordering::Relaxed);
                t.project_ids[index % t.project_ids.len()].clone()
            }
            _ => self.config.project_id.clone(),
        }
    }

    /// Build the load job and its post-load action DAG.
    pub async fn build<W: Warehouse>(
        &self,
        rule: Arc<Rule>,
        mut process: Process,
        window: Option<Window>,
        warehouse: &W,
    ) -> Result<LoadJob, PipelineError> {
        let uris = match &window {
            Some(window) => window.uris.clone(),
            None => vec![process.source.source_url.clone()],
        };
        if uris.is_empty() {
            return Err(PipelineError::internal("sourceUris was empty"));
        }

        let dest_ref = TableRef::parse(&process.dest_table)
            .ok_or_else(|| {
                PipelineError::config(format!("invalid destination table: {}", process.dest_table))
            })?
            .with_default_project(&self.config.project_id);

        if process.region.is_empty() {
            process.region = warehouse
                .dataset_region(&dest_ref.project_id, &dest_ref.dataset_id)
                .await
                .map_err(PipelineError::from)?;
        }

        let load_schema = self.resolve_schema(&rule, &dest_ref, warehouse).await?;

        let temp_ref = rule.dest.transient.as_ref().map(|transient| TableRef {
            project_id: if process.project_id.is_empty() {
                self.config.project_id.clone()
            } else {
                process.project_id.clone()
            },
            dataset_id: transient.dataset.clone(),
            table_id: format!(
                "{}_{}_temp",
                dest_ref.table_id,
                sanitize_table_component(process.event_id.as_str())
            ),
        });
        process.temp_table = temp_ref.as_ref().map(TableRef::to_string);

        let vars = ExpandVars {
            dest_table: process.dest_table.clone(),
            temp_table: process.temp_table.clone().unwrap_or_default(),
            event_id: process.event_id.to_string(),
            source_url: process.source.source_url.clone(),
            rule_url: process.rule_url.clone(),
            uris: uris.clone(),
        };

        let meta = ActionMeta::new(process.clone());
        let on_success = build_actions(&rule.on_success, &meta, &vars)?;
        let on_failure = build_actions(&rule.on_failure, &meta, &vars)?;

        let mut root = if let Some(split_config) = rule.dest.split() {
            let temp_ref = temp_ref.clone().ok_or_else(|| {
                PipelineError::config("schema split requires dest.transient".to_string())
            })?;
            split::build_split_plan(split::SplitPlanInput {
                rule: &rule,
                process: &process,
                split: split_config,
                dest_ref: &dest_ref,
                temp_ref: &temp_ref,
                load_schema: load_schema.clone(),
                uris: uris.clone(),
                on_success,
                on_failure,
                meta: meta.clone(),
                warehouse,
            })
            .await?
        } else if let Some(temp_ref) = &temp_ref {
            // Transient staging: load lands in the temp table, a copy
            // promotes it, the temp table is dropped afterwards.
            let load = LoadRequest {
                source_uris: uris.clone(),
                destination_table: temp_ref.clone(),
                schema: load_schema.clone(),
                write_disposition: WriteDisposition::Truncate,
                source_format: rule.dest.source_format.clone(),
            };
            let drop_temp = Action::new(
                ActionRequest::Drop(DropRequest {
                    table: temp_ref.clone(),
                }),
                meta.clone(),
            )
            .with_success(on_success);
            let copy = Action::new(
                ActionRequest::Copy(CopyRequest {
                    source_table: temp_ref.clone(),
                    destination_table: dest_ref.clone(),
                    write_disposition: rule.dest.write_disposition(),
                }),
                meta.clone(),
            )
            .with_success(vec![drop_temp])
            .with_failure(on_failure.clone());
            Action::new(ActionRequest::Load(load), meta.clone())
                .with_success(vec![copy])
                .with_failure(on_failure)
        } else {
            let load = LoadRequest {
                source_uris: uris.clone(),
                destination_table: dest_ref.clone(),
                schema: load_schema.clone(),
                write_disposition: rule.dest.write_disposition(),
                source_format: rule.dest.source_format.clone(),
            };
            Action::new(ActionRequest::Load(load), meta.clone())
                .with_success(on_success)
                .with_failure(on_failure)
        };

        let mut step = 0;
        stamp_steps(&mut root, &process, &mut step);
        process.step_count = step;

        tracing::debug!(
            dest = %process.dest_table,
            uris = uris.len(),
            nodes = root.node_count(),
            "load plan built"
        );

        Ok(LoadJob {
            rule,
            process,
            window,
            plan: root,
            job: None,
        })
    }

    async fn resolve_schema<W: Warehouse>(
        &self,
        rule: &Rule,
        dest_ref: &TableRef,
        warehouse: &W,
    ) -> Result<Option<TableSchema>, PipelineError> {
        let template = rule.dest.schema.as_ref().and_then(|s| s.template.as_ref());
        let lookup_ref = match template {
            Some(template) => TableRef::parse(template)
                .ok_or_else(|| {
                    PipelineError::config(format!("invalid schema template: {template}"))
                })?
                .with_default_project(&self.config.project_id),
            None => dest_ref.clone(),
        };
        warehouse
            .table_schema(&lookup_ref)
            .await
            .map_err(PipelineError::from)
    }
}

/// Assign deterministic step numbers in pre-order and align every node's
/// embedded process snapshot.
fn stamp_steps(action: &mut Action, process: &Process, step: &mut u32) {
    *step += 1;
    action.meta.process = process.clone();
    action.meta.process.step_count = *step;
    action.meta.step = *step;
    for child in action
        .on_success
        .iter_mut()
        .chain(action.on_failure.iter_mut())
    {
        stamp_steps(child, process, step);
    }
}

pub(crate) fn sanitize_table_component(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

struct ExpandVars {
    dest_table: String,
    temp_table: String,
    event_id: String,
    source_url: String,
    rule_url: String,
    uris: Vec<String>,
}

impl ExpandVars {
    fn lookup(&self, token: &str) -> Option<String> {
        match token {
            "$DestTable" => Some(self.dest_table.clone()),
            "$TempTable" => Some(self.temp_table.clone()),
            "$EventID" => Some(self.event_id.clone()),
            "$SourceURL" => Some(self.source_url.clone()),
            "$RuleURL" => Some(self.rule_url.clone()),
            "$LoadURIs" => Some(self.uris.join(",")),
            _ => None,
        }
    }

    fn expand_str(&self, text: &str) -> String {
        let mut result = text.to_string();
        for token in [
            "$DestTable",
            "$TempTable",
            "$EventID",
            "$SourceURL",
            "$RuleURL",
            "$LoadURIs",
        ] {
            if result.contains(token) {
                if let Some(value) = self.lookup(token) {
                    result = result.replace(token, &value);
                }
            }
        }
        result
    }

    /// Expand placeholders in a request document. A bare `"$LoadURIs"`
    /// inside an array splices in one element per URI.
    fn expand_value(&self, value: &Value) -> Value {
        match value {
            Value::String(text) => Value::String(self.expand_str(text)),
            Value::Array(items) => {
                let mut expanded = Vec::new();
                for item in items {
                    match item {
                        Value::String(text) if text == "$LoadURIs" => {
                            expanded
                                .extend(self.uris.iter().cloned().map(Value::String));
                        }
                        other => expanded.push(self.expand_value(other)),
                    }
                }
                Value::Array(expanded)
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.expand_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Convert rule-file action declarations into typed plan nodes.
fn build_actions(
    defs: &[ActionDef],
    meta: &ActionMeta,
    vars: &ExpandVars,
) -> Result<Vec<Action>, PipelineError> {
    defs.iter().map(|def| build_action(def, meta, vars)).collect()
}

fn build_action(
    def: &ActionDef,
    meta: &ActionMeta,
    vars: &ExpandVars,
) -> Result<Action, PipelineError> {
    let kind = def
        .kind()
        .ok_or_else(|| PipelineError::config(format!("unknown action: {}", def.action)))?;
    let request = vars.expand_value(&def.request);
    let request = typed_request(kind, request, vars)?;
    let action = Action::new(request, meta.clone())
        .with_success(build_actions(&def.on_success, meta, vars)?)
        .with_failure(build_actions(&def.on_failure, meta, vars)?);
    Ok(action)
}

fn typed_request(
    kind: ActionKind,
    request: Value,
    vars: &ExpandVars,
) -> Result<ActionRequest, PipelineError> {
    let bad = |e: serde_json::Error| {
        PipelineError::config(format!("invalid {kind} action request: {e}"))
    };
    let missing = |what: &str| {
        PipelineError::config(format!("{kind} action requires {what}"))
    };
    Ok(match kind {
        ActionKind::Load => ActionRequest::Load(serde_json::from_value(request).map_err(bad)?),
        ActionKind::Reload => ActionRequest::Reload(serde_json::from_value(request).map_err(bad)?),
        ActionKind::Query => {
            let query: QueryRequest = serde_json::from_value(request).map_err(bad)?;
            if query.sql.is_empty() {
                return Err(missing("sql"));
            }
            ActionRequest::Query(query)
        }
        ActionKind::Copy => {
            if request.is_null() {
                // Default promotion copy: temp table into the destination.
                let source = TableRef::parse(&vars.temp_table)
                    .ok_or_else(|| missing("request.sourceTable (no temp table)"))?;
                let dest = TableRef::parse(&vars.dest_table)
                    .ok_or_else(|| missing("request.destinationTable"))?;
                ActionRequest::Copy(CopyRequest {
                    source_table: source,
                    destination_table: dest,
                    write_disposition: WriteDisposition::Append,
                })
            } else {
                ActionRequest::Copy(serde_json::from_value(request).map_err(bad)?)
            }
        }
        ActionKind::Export => {
            let export: ExportRequest = serde_json::from_value(request).map_err(bad)?;
            ActionRequest::Export(export)
        }
        ActionKind::Drop => {
            if request.is_null() {
                let table = TableRef::parse(&vars.temp_table)
                    .ok_or_else(|| missing("request.table (no temp table)"))?;
                ActionRequest::Drop(DropRequest { table })
            } else {
                ActionRequest::Drop(serde_json::from_value(request).map_err(bad)?)
            }
        }
        ActionKind::Notify => {
            let notify: NotifyRequest = serde_json::from_value(request).map_err(bad)?;
            ActionRequest::Notify(notify)
        }
        ActionKind::Delete => {
            let mut delete: DeleteRequest = if request.is_null() {
                DeleteRequest::default()
            } else {
                serde_json::from_value(request).map_err(bad)?
            };
            if delete.urls.is_empty() && !delete.include_source {
                delete.urls = vars.uris.clone();
            }
            ActionRequest::Delete(delete)
        }
    })
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
