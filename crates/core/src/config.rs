// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service configuration and persisted-layout conventions.
//!
//! Every path the pipeline persists to is derived here so the layout in
//! one place matches what the trigger router expects back.

use crate::error::PipelineError;
use crate::id::EventId;
use crate::process::Process;
use crate::url;
use serde::{Deserialize, Serialize};

/// Window record extension.
pub const WINDOW_EXT: &str = ".win";
/// Multi-path participation marker extension.
pub const LOCATION_EXT: &str = ".loc";
/// Retry counter extension.
pub const COUNTER_EXT: &str = ".cnt";
/// Error text extension.
pub const ERROR_EXT: &str = ".err";
/// Serialized response extension.
pub const RESPONSE_EXT: &str = ".resp";
/// Copied process-plan extension.
pub const PROCESS_EXT: &str = ".process";

const RETRY_COUNTER_SUBPATH: &str = "retry-counters";
const RETRY_DATA_SUBPATH: &str = "retry-data";
const DONE_SUBPATH: &str = "done";

fn default_max_retries() -> u32 {
    3
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(rename = "projectID")]
    pub project_id: String,
    /// Bucket receiving storage triggers; may carry an explicit scheme.
    pub trigger_bucket: String,
    #[serde(rename = "rulesURL")]
    pub rules_url: String,
    /// Base URL for window records and `.loc` markers.
    pub batch_base: String,
    /// Path prefix (inside the trigger bucket) of persisted load plans.
    pub load_process_prefix: String,
    /// Path prefix of dispatched post-job records.
    pub post_job_prefix: String,
    /// Path prefix of window-close triggers.
    pub batch_prefix: String,
    #[serde(rename = "journalURL")]
    pub journal_url: String,
    #[serde(rename = "errorURL")]
    pub error_url: String,
    #[serde(rename = "corruptedFileURL", default)]
    pub corrupted_file_url: String,
    #[serde(rename = "invalidSchemaURL", default)]
    pub invalid_schema_url: String,
    /// When set, post-load job summaries are uploaded under this path.
    #[serde(rename = "bqJobInfoPath", default)]
    pub job_info_path: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(rename = "slackCredentialsURL", default)]
    pub slack_credentials_url: String,
    /// Construct a fresh service per invocation instead of reusing the
    /// warm-start singleton.
    #[serde(default)]
    pub run_once: bool,
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        let config: Config = serde_json::from_str(text)
            .map_err(|e| PipelineError::config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, value) in [
            ("projectID", &self.project_id),
            ("triggerBucket", &self.trigger_bucket),
            ("rulesURL", &self.rules_url),
            ("batchBase", &self.batch_base),
            ("loadProcessPrefix", &self.load_process_prefix),
            ("postJobPrefix", &self.post_job_prefix),
            ("batchPrefix", &self.batch_prefix),
            ("journalURL", &self.journal_url),
            ("errorURL", &self.error_url),
        ] {
            if value.is_empty() {
                return Err(PipelineError::config(format!("{name} was empty")));
            }
        }
        Ok(())
    }

    /// URL of the trigger bucket root.
    ///
    /// A bare bucket name inherits the scheme of `rulesURL` so one config
    /// works unchanged against the fs store and the in-memory store.
    pub fn trigger_base(&self) -> String {
        if self.trigger_bucket.contains("://") {
            self.trigger_bucket.trim_end_matches('/').to_string()
        } else {
            let scheme = match url::scheme(&self.rules_url) {
                "" => "file",
                s => s,
            };
            format!("{}://{}", scheme, self.trigger_bucket)
        }
    }

    /// Active plan location: `<loadProcessPrefix>/<eventId>.json`.
    pub fn load_process_url(&self, event_id: &EventId) -> String {
        url::join(
            &self.trigger_base(),
            &[&self.load_process_prefix, &format!("{}.json", event_id)],
        )
    }

    /// Done plan location under the journal.
    pub fn done_process_url(&self, event_id: &EventId) -> String {
        url::join(
            &self.journal_url,
            &[DONE_SUBPATH, &format!("{}.json", event_id)],
        )
    }

    /// Post-job record location for a dispatched action.
    pub fn post_job_url(&self, filename: &str) -> String {
        url::join(&self.trigger_base(), &[&self.post_job_prefix, filename])
    }

    /// Retry counter file for one event id.
    pub fn retry_counter_url(&self, event_id: &EventId) -> String {
        url::join(
            &self.journal_url,
            &[
                RETRY_COUNTER_SUBPATH,
                &format!("{}{}", event_id, COUNTER_EXT),
            ],
        )
    }

    /// Quarantine destination for a source that exhausted its retry budget.
    pub fn retry_data_url(&self, event_id: &EventId, source_url: &str) -> String {
        url::join(
            &self.journal_url,
            &[RETRY_DATA_SUBPATH, event_id.as_str(), url::path(source_url)],
        )
    }

    /// Journal destination of a replayed plan file.
    pub fn journal_url_for(&self, name: &str) -> String {
        url::join(&self.journal_url, &[name])
    }

    /// Diagnostic file under `errors/<dest>/` with the given extension.
    pub fn error_file_url(&self, dest_table: &str, event_id: &EventId, ext: &str) -> String {
        url::join(
            &self.error_url,
            &[dest_table, &format!("{}{}", event_id, ext)],
        )
    }

    /// Upload location for a fetched warehouse-job summary.
    pub fn job_info_url(&self, job_id: &str) -> Option<String> {
        if self.job_info_path.is_empty() {
            return None;
        }
        Some(url::join(
            &self.trigger_base(),
            &[&self.job_info_path, &format!("{}.json", job_id)],
        ))
    }

    /// Stamp plan/done URLs onto a freshly-built process.
    pub fn assign_process_urls(&self, process: &mut Process) {
        process.process_url = self.load_process_url(&process.event_id);
        process.done_process_url = self.done_process_url(&process.event_id);
    }
}

crate::builder! {
    pub struct ConfigBuilder => Config {
        into {
            project_id: String = "proj",
            trigger_bucket: String = "mem://trigger",
            rules_url: String = "mem://config/rules",
            batch_base: String = "mem://trigger/batch",
            load_process_prefix: String = "loadProcess",
            post_job_prefix: String = "postJob",
            batch_prefix: String = "batch",
            journal_url: String = "mem://ops/journal",
            error_url: String = "mem://ops/errors",
            corrupted_file_url: String = "mem://ops/corrupted",
            invalid_schema_url: String = "mem://ops/invalidSchema",
            job_info_path: String = "",
            slack_credentials_url: String = "",
        }
        set {
            max_retries: u32 = 3,
            run_once: bool = false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
