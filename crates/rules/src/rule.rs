// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rule model.
//!
//! A rule maps a source-URL shape to a destination table plus everything
//! that should happen around the load. Rules are immutable once loaded;
//! the registry swaps whole rule sets on reload.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use wr_core::{url, ActionKind, WriteDisposition};

/// Source-URL filter: all present parts must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFilter {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub suffix: String,
    /// Regex over the leading-slash path; named groups become params.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip)]
    compiled: Option<Regex>,
}

impl SourceFilter {
    /// Compile the pattern. Must run once after deserialization.
    pub fn init(&mut self) -> Result<(), regex::Error> {
        if let Some(pattern) = &self.pattern {
            self.compiled = Some(Regex::new(pattern)?);
        }
        Ok(())
    }

    fn match_path(source_url: &str) -> String {
        format!("/{}", url::path(source_url))
    }

    pub fn has_match(&self, source_url: &str) -> bool {
        let path = Self::match_path(source_url);
        if !self.prefix.is_empty() && !path.starts_with(&self.prefix) {
            return false;
        }
        if !self.suffix.is_empty() && !path.ends_with(&self.suffix) {
            return false;
        }
        match &self.compiled {
            Some(regex) => regex.is_match(&path),
            None => true,
        }
    }

    /// Positional captures (`$1`..) of the pattern over the source path.
    pub fn captures(&self, source_url: &str) -> Vec<String> {
        let path = Self::match_path(source_url);
        let Some(regex) = &self.compiled else {
            return Vec::new();
        };
        let Some(caps) = regex.captures(&path) else {
            return Vec::new();
        };
        caps.iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect()
    }

    /// Named captures of the pattern over the source path.
    pub fn named_captures(&self, source_url: &str) -> HashMap<String, String> {
        let path = Self::match_path(source_url);
        let mut result = HashMap::new();
        let Some(regex) = &self.compiled else {
            return result;
        };
        let Some(caps) = regex.captures(&path) else {
            return result;
        };
        for name in regex.capture_names().flatten() {
            if let Some(value) = caps.name(name) {
                result.insert(name.to_string(), value.as_str().to_string());
            }
        }
        result
    }
}

/// Transient-load staging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transient {
    /// Dataset the intermediate table is created in.
    pub dataset: String,
    /// Candidate projects for running the load; selected round-robin.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project_ids: Vec<String>,
}

/// Conditional split of a loaded batch into per-condition tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSplit {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_column: Option<String>,
    /// Evaluated in declared order; each row lands per its first match.
    pub mapping: Vec<SplitMapping>,
}

impl SchemaSplit {
    /// Partition column; defaults to `ts`.
    pub fn time_column(&self) -> &str {
        self.time_column.as_deref().unwrap_or("ts")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitMapping {
    /// SQL condition over the loaded rows.
    pub when: String,
    /// Destination table template for matching rows.
    pub then: String,
}

/// Destination schema handling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestSchema {
    /// Table whose schema seeds loads and split staging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<SchemaSplit>,
}

/// Load destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Destination table template (`$YYYY`/`$MM`/`$DD`/`$HH`, `$1`..`$9`,
    /// `$name` placeholders).
    pub table: String,
    #[serde(default)]
    pub truncate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient: Option<Transient>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<DestSchema>,
    /// Static user params, merged under the pattern's named captures.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, String>,
}

impl Destination {
    pub fn write_disposition(&self) -> WriteDisposition {
        if self.truncate {
            WriteDisposition::Truncate
        } else {
            WriteDisposition::Append
        }
    }

    pub fn split(&self) -> Option<&SchemaSplit> {
        self.schema.as_ref().and_then(|s| s.split.as_ref())
    }
}

/// Batch window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    /// Window width, e.g. `60s`, `5m`.
    #[serde(with = "duration_str")]
    pub window: Duration,
    /// Absorb late arrivals of a just-missed bucket by extending back.
    #[serde(default)]
    pub rollover: bool,
    /// One window per destination table across source directories.
    #[serde(default)]
    pub multi_path: bool,
    /// Upper bound for the close jitter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

impl BatchConfig {
    pub fn window_nanos(&self) -> i64 {
        self.window.as_nanos().min(i64::MAX as u128) as i64
    }

    /// End of the bucket containing `t` (bucket `[kW, (k+1)W)`).
    pub fn bucket_end(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let window = self.window_nanos();
        let nanos = t.timestamp_nanos_opt().unwrap_or_default();
        let end = (nanos.div_euclid(window) + 1) * window;
        Utc.timestamp_nanos(end)
    }

    pub fn bucket_start(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        self.bucket_end(t) - ChronoDuration::nanoseconds(self.window_nanos())
    }

    /// True when `t` falls in the first half of its bucket.
    pub fn is_within_first_half(&self, t: DateTime<Utc>) -> bool {
        let window = self.window_nanos();
        let nanos = t.timestamp_nanos_opt().unwrap_or_default();
        nanos.rem_euclid(window) < window / 2
    }

    /// Close jitter upper bound, never below `min_ms`.
    pub fn max_delay_ms(&self, min_ms: u64) -> u64 {
        self.max_delay_ms.unwrap_or(0).max(min_ms)
    }
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Parse `90s` / `5m` / `2h` / bare seconds.
    pub fn parse(text: &str) -> Option<Duration> {
        let text = text.trim();
        let (value, unit) = match text.find(|c: char| !c.is_ascii_digit()) {
            Some(idx) => text.split_at(idx),
            None => (text, "s"),
        };
        let value: u64 = value.parse().ok()?;
        let secs = match unit {
            "s" | "" => value,
            "m" => value * 60,
            "h" => value * 3600,
            _ => return None,
        };
        if secs == 0 {
            return None;
        }
        Some(Duration::from_secs(secs))
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}s", value.as_secs()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid window duration: {text:?}"))
        })
    }
}

pub(crate) use duration_str::parse as parse_duration;

/// Post-load action declaration as written in a rule file.
///
/// Requests stay untyped here; the planner validates them against the
/// action kind when it builds the typed plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDef {
    pub action: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub request: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<ActionDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<ActionDef>,
}

impl ActionDef {
    pub fn kind(&self) -> Option<ActionKind> {
        match self.action.as_str() {
            "load" => Some(ActionKind::Load),
            "reload" => Some(ActionKind::Reload),
            "query" => Some(ActionKind::Query),
            "copy" => Some(ActionKind::Copy),
            "export" => Some(ActionKind::Export),
            "drop" => Some(ActionKind::Drop),
            "notify" => Some(ActionKind::Notify),
            "delete" => Some(ActionKind::Delete),
            _ => None,
        }
    }
}

/// One ingestion rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// URL of the rule file this rule was loaded from.
    #[serde(skip)]
    pub url: String,
    pub when: SourceFilter,
    pub dest: Destination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchConfig>,
    #[serde(rename = "async", default)]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<ActionDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<ActionDef>,
    /// Override of the global corrupted-file quarantine.
    #[serde(rename = "corruptedFileURL", default, skip_serializing_if = "String::is_empty")]
    pub corrupted_file_url: String,
    /// Override of the global invalid-schema quarantine.
    #[serde(rename = "invalidSchemaURL", default, skip_serializing_if = "String::is_empty")]
    pub invalid_schema_url: String,
}

impl Rule {
    pub fn has_match(&self, source_url: &str) -> bool {
        self.when.has_match(source_url)
    }

    /// User params for an arrival: named pattern captures over static params.
    pub fn params_for(&self, source_url: &str) -> HashMap<String, String> {
        let mut params = self.dest.params.clone();
        params.extend(self.when.named_captures(source_url));
        params
    }

    /// Expand the destination-table template for one source object.
    pub fn expand_table(
        &self,
        source_url: &str,
        source_time: DateTime<Utc>,
    ) -> Result<String, wr_core::PipelineError> {
        self.expand_template(&self.dest.table, source_url, source_time)
    }

    /// Expand any table template (split mappings use their own).
    pub fn expand_template(
        &self,
        template: &str,
        source_url: &str,
        source_time: DateTime<Utc>,
    ) -> Result<String, wr_core::PipelineError> {
        crate::expand::expand_table(
            template,
            source_time,
            &self.when.captures(source_url),
            &self.params_for(source_url),
        )
    }
}

#[cfg(test)]
#[path = "rule_tests.rs"]
mod tests;
