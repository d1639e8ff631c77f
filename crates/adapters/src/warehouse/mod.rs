// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warehouse abstraction.
//!
//! The production client library is an external collaborator; the pipeline
//! consumes it through this narrow interface. Job ids are supplied by the
//! caller (deterministic), and a duplicate submission must fail with
//! [`ErrorKind::DuplicateJob`] so replays converge on the existing job.

mod mem;

pub use mem::MemWarehouse;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use wr_core::{
    CopyRequest, ErrorKind, ExportRequest, JobRef, LoadRequest, PipelineError, QueryRequest,
    TableDef, TableRef, TableSchema,
};

pub const JOB_STATE_DONE: &str = "DONE";

/// Classified warehouse failure.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct WarehouseError {
    pub kind: ErrorKind,
    pub message: String,
}

impl WarehouseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_duplicate_job(&self) -> bool {
        self.kind == ErrorKind::DuplicateJob
    }
}

impl From<WarehouseError> for PipelineError {
    fn from(err: WarehouseError) -> Self {
        PipelineError::new(err.kind, err.message)
    }
}

/// One error record attached to a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFault {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub message: String,
}

impl JobFault {
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            location: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Completion state of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_result: Option<JobFault>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<JobFault>,
}

impl JobStatus {
    pub fn done() -> Self {
        Self {
            state: JOB_STATE_DONE.to_string(),
            error_result: None,
            errors: Vec::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == JOB_STATE_DONE
    }
}

/// A submitted (or fetched) warehouse job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseJob {
    pub job_reference: JobRef,
    /// Load configuration, when this job is a load (drives recovery).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadRequest>,
    pub status: JobStatus,
}

impl WarehouseJob {
    pub fn source_uris(&self) -> &[String] {
        self.load.as_ref().map(|l| l.source_uris.as_slice()).unwrap_or_default()
    }
}

/// Work submitted as a warehouse job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobSpec {
    Load(LoadRequest),
    Query(QueryRequest),
    Copy(CopyRequest),
    Export(ExportRequest),
}

/// Error classification for a finished job (reason → kind).
///
/// Backend/internal reasons are retryable; quota and rate reasons are
/// rate-limited; everything else on a failed job is a permanent load error.
pub fn job_error(job: &WarehouseJob) -> Option<PipelineError> {
    let fault = job.status.error_result.as_ref()?;
    let kind = match fault.reason.as_str() {
        "backendError" | "internalError" => ErrorKind::RetryableBackend,
        "rateLimitExceeded" | "quotaExceeded" => ErrorKind::RateLimited,
        _ => ErrorKind::PermanentLoad,
    };
    Some(PipelineError::new(
        kind,
        format!("{}: {}", fault.reason, fault.message),
    ))
}

/// Narrow warehouse interface.
#[async_trait]
pub trait Warehouse: Clone + Send + Sync + 'static {
    /// Submit a job under the caller-chosen reference.
    ///
    /// Must fail with [`ErrorKind::DuplicateJob`] when a job with the same
    /// id already exists.
    async fn submit(&self, spec: JobSpec, job_ref: JobRef) -> Result<WarehouseJob, WarehouseError>;

    async fn get_job(&self, job_ref: &JobRef) -> Result<WarehouseJob, WarehouseError>;

    /// Poll the job to completion, honoring cancellation.
    async fn wait(
        &self,
        job_ref: &JobRef,
        cancel: &CancellationToken,
    ) -> Result<WarehouseJob, WarehouseError>;

    /// Schema of an existing table, or `None` when the table is absent.
    async fn table_schema(&self, table: &TableRef) -> Result<Option<TableSchema>, WarehouseError>;

    async fn create_table_if_not_exists(&self, def: &TableDef) -> Result<(), WarehouseError>;

    async fn drop_table(&self, table: &TableRef) -> Result<(), WarehouseError>;

    /// Region of a dataset (stamped onto action metadata).
    async fn dataset_region(
        &self,
        project_id: &str,
        dataset_id: &str,
    ) -> Result<String, WarehouseError>;
}

#[cfg(test)]
#[path = "warehouse_tests.rs"]
mod tests;
