// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Load-failure classification.
//!
//! Partitions a failed load's configured source URIs into missing,
//! corrupted, invalid-schema, and valid sets. Classification aggregates
//! every error per URI before deciding, so the outcome is stable under
//! permutation of the error list. A URI lands in exactly one bucket, with
//! precedence missing > invalid-schema > corrupted.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use wr_core::url;
use wr_adapters::{JobFault, WarehouseJob};

// Allow expect here as the regexes are compile-time verified to be valid
#[allow(clippy::expect_used)]
static URI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-z][a-z0-9+.-]*://[^\s,;]+").expect("constant regex pattern is valid")
});
#[allow(clippy::expect_used)]
static BIGSTORE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/bigstore/([^\s,;]+)").expect("constant regex pattern is valid")
});
#[allow(clippy::expect_used)]
static MISSING_FIELD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"No such field: ([A-Za-z_][\w.]*)").expect("constant regex pattern is valid")
});
#[allow(clippy::expect_used)]
static ROWS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Rows: (\d+)").expect("constant regex pattern is valid"));

/// A named field a load could not place, for operator diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub row: u32,
    pub name: String,
    pub location: String,
}

/// Classified partition of a failed load's source URIs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UriStatus {
    pub missing: Vec<String>,
    pub corrupted: Vec<String>,
    pub invalid_schema: Vec<String>,
    pub valid: Vec<String>,
    pub missing_fields: Vec<FieldIssue>,
}

#[derive(Default)]
struct UriFlags {
    missing: bool,
    invalid_schema: bool,
    corrupted: bool,
}

impl UriStatus {
    /// Classify a finished job's errors against its configured URIs.
    pub fn classify(job: &WarehouseJob) -> Self {
        let configured = job.source_uris();
        let faults = all_faults(job);

        let mut flags: HashMap<&str, UriFlags> = HashMap::new();
        let mut field_issues: Vec<FieldIssue> = Vec::new();
        let mut rows_by_location: HashMap<String, u32> = HashMap::new();

        for fault in &faults {
            if let Some(caps) = ROWS_PATTERN.captures(&fault.message) {
                if let (Some(location), Ok(rows)) = (&fault.location, caps[1].parse::<u32>()) {
                    rows_by_location.insert(location.clone(), rows);
                }
            }
            match fault.reason.as_str() {
                "notFound" => {
                    if let Some(uri) = resolve_missing_uri(configured, &fault.message) {
                        flags.entry(uri).or_default().missing = true;
                    }
                }
                "invalid" => {
                    let Some(location) = &fault.location else {
                        continue;
                    };
                    let Some(uri) = configured
                        .iter()
                        .find(|u| u.as_str() == location)
                        .map(String::as_str)
                    else {
                        continue;
                    };
                    if let Some(caps) = MISSING_FIELD_PATTERN.captures(&fault.message) {
                        flags.entry(uri).or_default().invalid_schema = true;
                        let name = caps[1].trim_end_matches('.').to_string();
                        if !field_issues
                            .iter()
                            .any(|f| f.name == name && &f.location == location)
                        {
                            field_issues.push(FieldIssue {
                                row: 0,
                                name,
                                location: location.clone(),
                            });
                        }
                    } else if is_field_mismatch(&fault.message) {
                        flags.entry(uri).or_default().invalid_schema = true;
                    } else if is_payload_parse_failure(&fault.message) {
                        flags.entry(uri).or_default().corrupted = true;
                    }
                }
                _ => {}
            }
        }

        for issue in &mut field_issues {
            issue.row = rows_by_location.get(&issue.location).copied().unwrap_or(0);
        }

        let mut status = UriStatus {
            missing_fields: field_issues,
            ..UriStatus::default()
        };
        for uri in configured {
            match flags.get(uri.as_str()) {
                Some(f) if f.missing => status.missing.push(uri.clone()),
                Some(f) if f.invalid_schema => status.invalid_schema.push(uri.clone()),
                Some(f) if f.corrupted => status.corrupted.push(uri.clone()),
                _ => status.valid.push(uri.clone()),
            }
        }
        status
    }
}

fn all_faults(job: &WarehouseJob) -> Vec<JobFault> {
    if !job.status.errors.is_empty() {
        return job.status.errors.clone();
    }
    job.status.error_result.clone().into_iter().collect()
}

/// Recover the configured URI a not-found message points at.
///
/// Messages carry either the URI itself or the backend's
/// `/bigstore/<bucket>/<path>` spelling of it.
fn resolve_missing_uri<'a>(configured: &'a [String], message: &str) -> Option<&'a str> {
    if let Some(m) = URI_PATTERN.find(message) {
        let uri = m.as_str().trim_end_matches(['.', ',']);
        return configured.iter().find(|u| u.as_str() == uri).map(|u| u.as_str());
    }
    if let Some(caps) = BIGSTORE_PATTERN.captures(message) {
        let bucket_path = caps[1].trim_end_matches(['.', ',']).to_string();
        return configured
            .iter()
            .find(|u| format!("{}/{}", url::bucket(u), url::path(u)) == bucket_path)
            .map(|u| u.as_str());
    }
    None
}

fn is_field_mismatch(message: &str) -> bool {
    message.contains("No such field") || message.contains("Field: ")
}

fn is_payload_parse_failure(message: &str) -> bool {
    message.contains("JSON parsing error")
        || message.contains("Unexpected token")
        || message.contains("Invalid JSON payload")
        || message.contains("Closing quote")
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
