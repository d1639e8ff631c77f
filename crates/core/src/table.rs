// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warehouse table references and schema wire types.

use serde::{Deserialize, Serialize};

/// Fully-qualified table reference.
///
/// Textual form is `project:dataset.table`; the project may be omitted
/// (`dataset.table`) and defaulted by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRef {
    #[serde(default)]
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    /// Parse `project:dataset.table` or `dataset.table`.
    pub fn parse(text: &str) -> Option<Self> {
        let (project, rest) = match text.split_once(':') {
            Some((p, r)) => (p.to_string(), r),
            None => (String::new(), text),
        };
        let (dataset, table) = rest.split_once('.')?;
        if dataset.is_empty() || table.is_empty() {
            return None;
        }
        Some(Self {
            project_id: project,
            dataset_id: dataset.to_string(),
            table_id: table.to_string(),
        })
    }

    pub fn with_default_project(mut self, project_id: &str) -> Self {
        if self.project_id.is_empty() {
            self.project_id = project_id.to_string();
        }
        self
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.project_id.is_empty() {
            write!(f, "{}.{}", self.dataset_id, self.table_id)
        } else {
            write!(f, "{}:{}.{}", self.project_id, self.dataset_id, self.table_id)
        }
    }
}

/// One field of a table schema; nested records carry child fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSchema>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            mode: None,
            fields: Vec::new(),
        }
    }
}

/// Flat schema wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl TableSchema {
    /// Look up a column by (possibly dotted) name, case-insensitively.
    ///
    /// `a.b` descends into the nested fields of record column `a`.
    pub fn column(&self, name: &str) -> Option<&FieldSchema> {
        column_in(&self.fields, name)
    }
}

fn column_in<'a>(fields: &'a [FieldSchema], name: &str) -> Option<&'a FieldSchema> {
    let lowered = name.to_lowercase();
    if let Some((parent, rest)) = lowered.split_once('.') {
        let parent_field = fields.iter().find(|f| f.name.to_lowercase() == parent)?;
        return column_in(&parent_field.fields, rest);
    }
    fields.iter().find(|f| f.name.to_lowercase() == lowered)
}

/// Daily time partitioning on a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePartitioning {
    pub field: String,
    #[serde(rename = "type")]
    pub partition_type: String,
}

/// Clustering column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clustering {
    pub fields: Vec<String>,
}

/// Table definition for idempotent creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDef {
    pub table_reference: TableRef,
    pub schema: TableSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_partitioning: Option<TimePartitioning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clustering: Option<Clustering>,
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
