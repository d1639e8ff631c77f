// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema-split planning.
//!
//! When a rule declares a split, the batch is loaded into a clustered,
//! time-partitioned staging table, selected into the transient temp table,
//! then routed per mapping condition into its final table, and the staging
//! table is dropped. Mappings run in declared order, each triggered by the
//! success of the previous step.

use std::collections::HashMap;
use wr_adapters::Warehouse;
use wr_core::{
    Action, ActionMeta, ActionRequest, Clustering, DropRequest, FieldSchema, LoadRequest,
    PipelineError, Process, QueryRequest, TableDef, TableRef, TableSchema, TimePartitioning,
    WriteDisposition,
};
use wr_rules::{Rule, SchemaSplit};

const TIMESTAMP_TYPE: &str = "TIMESTAMP";
const DAY_PARTITION: &str = "DAY";

pub(crate) struct SplitPlanInput<'a, W> {
    pub rule: &'a Rule,
    pub process: &'a Process,
    pub split: &'a SchemaSplit,
    pub dest_ref: &'a TableRef,
    pub temp_ref: &'a TableRef,
    pub load_schema: Option<TableSchema>,
    pub uris: Vec<String>,
    pub on_success: Vec<Action>,
    pub on_failure: Vec<Action>,
    pub meta: ActionMeta,
    pub warehouse: &'a W,
}

/// Build the split plan rooted at the staging load.
pub(crate) async fn build_split_plan<W: Warehouse>(
    input: SplitPlanInput<'_, W>,
) -> Result<Action, PipelineError> {
    let SplitPlanInput {
        rule,
        process,
        split,
        dest_ref,
        temp_ref,
        load_schema,
        uris,
        on_success,
        on_failure,
        meta,
        warehouse,
    } = input;

    let load_schema = load_schema.ok_or_else(|| {
        PipelineError::config("schema split requires a load schema (dest.schema.template)")
    })?;

    let split_ref = TableRef {
        project_id: temp_ref.project_id.clone(),
        dataset_id: temp_ref.dataset_id.clone(),
        table_id: format!(
            "{}_{}_split",
            dest_ref.table_id,
            crate::planner::sanitize_table_component(process.event_id.as_str())
        ),
    };

    let staging = staging_table(split, &split_ref, &load_schema)?;
    warehouse
        .create_table_if_not_exists(&staging)
        .await
        .map_err(PipelineError::from)?;

    // Chain tail: drop the staging table, then the rule's own successors.
    let drop_staging = Action::new(
        ActionRequest::Drop(DropRequest {
            table: split_ref.clone(),
        }),
        meta.clone(),
    )
    .with_success(on_success);

    // Per-mapping routing queries, last first so each mapping triggers the
    // next on success.
    let rewrite = cluster_column_map(split);
    let mut next = drop_staging;
    for mapping in split.mapping.iter().rev() {
        let then_table = rule.expand_template(
            &mapping.then,
            &process.source.source_url,
            process.source.source_time,
        )?;
        let then_ref = TableRef::parse(&then_table)
            .ok_or_else(|| {
                PipelineError::config(format!("invalid split mapping table: {then_table}"))
            })?
            .with_default_project(&temp_ref.project_id);
        let condition = rewrite_condition(&mapping.when, &rewrite);
        let sql = with_where(&build_select(temp_ref, Some(&staging.schema)), &condition);
        next = Action::new(
            ActionRequest::Query(QueryRequest {
                sql,
                destination_table: Some(then_ref),
                template_table: rule
                    .dest
                    .schema
                    .as_ref()
                    .and_then(|s| s.template.clone()),
                write_disposition: rule.dest.write_disposition(),
            }),
            meta.clone(),
        )
        .with_success(vec![next]);
    }

    // Phase one: everything from staging into the partitioned temp table.
    let select_all = with_where(&build_select(&split_ref, Some(&staging.schema)), "");
    let into_temp = Action::new(
        ActionRequest::Query(QueryRequest {
            sql: select_all,
            destination_table: Some(temp_ref.clone()),
            template_table: None,
            write_disposition: WriteDisposition::Truncate,
        }),
        meta.clone(),
    )
    .with_success(vec![next]);

    let load = LoadRequest {
        source_uris: uris,
        destination_table: split_ref,
        schema: Some(staging.schema.clone()),
        write_disposition: WriteDisposition::Truncate,
        source_format: rule.dest.source_format.clone(),
    };
    Ok(Action::new(ActionRequest::Load(load), meta)
        .with_success(vec![into_temp])
        .with_failure(on_failure))
}

/// Staging table definition: load schema plus synthesized split columns,
/// day-partitioned on the split time column and clustered on the short
/// cluster-column names.
fn staging_table(
    split: &SchemaSplit,
    split_ref: &TableRef,
    load_schema: &TableSchema,
) -> Result<TableDef, PipelineError> {
    let mut schema = load_schema.clone();

    let time_column = split.time_column().to_string();
    if schema.column(&time_column).is_none() {
        schema
            .fields
            .push(FieldSchema::new(time_column.clone(), TIMESTAMP_TYPE));
    }

    let mut cluster_fields = Vec::new();
    for column in &split.cluster_columns {
        match column.rsplit_once('.') {
            Some((_, short)) => {
                let nested = load_schema.column(column).ok_or_else(|| {
                    PipelineError::config(format!("failed to lookup cluster column: {column}"))
                })?;
                if schema.column(short).is_none() {
                    let mut promoted = nested.clone();
                    promoted.name = short.to_string();
                    promoted.fields = Vec::new();
                    schema.fields.push(promoted);
                }
                cluster_fields.push(short.to_string());
            }
            None => cluster_fields.push(column.clone()),
        }
    }

    Ok(TableDef {
        table_reference: split_ref.clone(),
        schema,
        time_partitioning: Some(TimePartitioning {
            field: time_column,
            partition_type: DAY_PARTITION.to_string(),
        }),
        clustering: if cluster_fields.is_empty() {
            None
        } else {
            Some(Clustering {
                fields: cluster_fields,
            })
        },
    })
}

/// Dotted cluster column → short-name rewrite map for mapping conditions.
fn cluster_column_map(split: &SchemaSplit) -> HashMap<String, String> {
    split
        .cluster_columns
        .iter()
        .filter_map(|column| {
            column
                .rsplit_once('.')
                .map(|(_, short)| (column.clone(), short.to_string()))
        })
        .collect()
}

fn rewrite_condition(condition: &str, rewrite: &HashMap<String, String>) -> String {
    let mut result = condition.to_string();
    for (dotted, short) in rewrite {
        if result.contains(dotted.as_str()) {
            result = result.replace(dotted.as_str(), short);
        }
    }
    result
}

/// `SELECT <columns> FROM <table>$WHERE`; the caller substitutes `$WHERE`.
fn build_select(source: &TableRef, schema: Option<&TableSchema>) -> String {
    let columns = match schema {
        Some(schema) if !schema.fields.is_empty() => schema
            .fields
            .iter()
            .map(|f| f.name.clone())
            .collect::<Vec<_>>()
            .join(", "),
        _ => "*".to_string(),
    };
    format!(
        "SELECT {columns} FROM `{}.{}.{}`$WHERE",
        source.project_id, source.dataset_id, source.table_id
    )
}

fn with_where(sql: &str, condition: &str) -> String {
    if condition.is_empty() {
        sql.replace("$WHERE", "")
    } else {
        sql.replace("$WHERE", &format!(" WHERE {condition}"))
    }
}

#[cfg(test)]
#[path = "split_tests.rs"]
mod tests;
