// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory warehouse.
//!
//! Serves the CLI's local mode and every test suite. Jobs complete
//! immediately; outcomes are scriptable per job-id fragment so failure
//! classification and recovery paths can be driven end to end.

use super::{
    job_error, JobFault, JobSpec, JobStatus, Warehouse, WarehouseError, WarehouseJob,
    JOB_STATE_DONE,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wr_core::{ErrorKind, JobRef, TableDef, TableRef, TableSchema};

/// One scripted outcome, consumed by the first matching submission.
struct OutcomeRule {
    job_id_contains: String,
    faults: Vec<JobFault>,
}

#[derive(Default)]
struct MemWarehouseState {
    jobs: HashMap<String, WarehouseJob>,
    tables: HashMap<String, TableDef>,
    dataset_regions: HashMap<String, String>,
    outcomes: Vec<OutcomeRule>,
    submissions: Vec<WarehouseJob>,
}

/// Shared in-memory warehouse.
#[derive(Clone, Default)]
pub struct MemWarehouse {
    state: Arc<Mutex<MemWarehouseState>>,
}

impl MemWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next job whose id contains `job_id_contains` to finish
    /// with the given errors (first fault becomes the error result).
    pub fn fail_next(&self, job_id_contains: impl Into<String>, faults: Vec<JobFault>) {
        self.state.lock().outcomes.push(OutcomeRule {
            job_id_contains: job_id_contains.into(),
            faults,
        });
    }

    /// Declare a dataset's region.
    pub fn set_dataset_region(
        &self,
        project_id: &str,
        dataset_id: &str,
        region: impl Into<String>,
    ) {
        self.state
            .lock()
            .dataset_regions
            .insert(format!("{project_id}:{dataset_id}"), region.into());
    }

    /// Pre-register a table (e.g. a schema template).
    pub fn put_table(&self, def: TableDef) {
        let key = def.table_reference.to_string();
        self.state.lock().tables.insert(key, def);
    }

    /// Every submission in order (assertions).
    pub fn submissions(&self) -> Vec<WarehouseJob> {
        self.state.lock().submissions.clone()
    }

    /// Submitted load jobs only.
    pub fn loads(&self) -> Vec<WarehouseJob> {
        self.state
            .lock()
            .submissions
            .iter()
            .filter(|j| j.load.is_some())
            .cloned()
            .collect()
    }

    pub fn table(&self, table: &TableRef) -> Option<TableDef> {
        self.state.lock().tables.get(&table.to_string()).cloned()
    }

    fn status_for(state: &mut MemWarehouseState, job_id: &str) -> JobStatus {
        match state
            .outcomes
            .iter()
            .position(|rule| job_id.contains(&rule.job_id_contains))
        {
            Some(idx) => {
                let rule = state.outcomes.remove(idx);
                JobStatus {
                    state: JOB_STATE_DONE.to_string(),
                    error_result: rule.faults.first().cloned(),
                    errors: rule.faults,
                }
            }
            None => JobStatus::done(),
        }
    }
}

#[async_trait]
impl Warehouse for MemWarehouse {
    async fn submit(&self, spec: JobSpec, job_ref: JobRef) -> Result<WarehouseJob, WarehouseError> {
        let mut state = self.state.lock();
        if state.jobs.contains_key(&job_ref.job_id) {
            return Err(WarehouseError::new(
                ErrorKind::DuplicateJob,
                format!("job already exists: {}", job_ref.job_id),
            ));
        }
        let status = Self::status_for(&mut state, &job_ref.job_id);
        let load = match &spec {
            JobSpec::Load(load) => Some(load.clone()),
            _ => None,
        };
        let job = WarehouseJob {
            job_reference: job_ref.clone(),
            load,
            status,
        };

        // Loads that succeed land in the table registry so later schema
        // lookups see the destination.
        if let (JobSpec::Load(load), None) = (&spec, job_error(&job)) {
            let key = load.destination_table.to_string();
            state.tables.entry(key).or_insert_with(|| TableDef {
                table_reference: load.destination_table.clone(),
                schema: load.schema.clone().unwrap_or_default(),
                time_partitioning: None,
                clustering: None,
            });
        }

        state.jobs.insert(job_ref.job_id.clone(), job.clone());
        state.submissions.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_ref: &JobRef) -> Result<WarehouseJob, WarehouseError> {
        self.state
            .lock()
            .jobs
            .get(&job_ref.job_id)
            .cloned()
            .ok_or_else(|| {
                WarehouseError::new(
                    ErrorKind::NotFound,
                    format!("job not found: {}", job_ref.job_id),
                )
            })
    }

    async fn wait(
        &self,
        job_ref: &JobRef,
        _cancel: &CancellationToken,
    ) -> Result<WarehouseJob, WarehouseError> {
        // Jobs complete at submit time here, so waiting is a fetch.
        self.get_job(job_ref).await
    }

    async fn table_schema(&self, table: &TableRef) -> Result<Option<TableSchema>, WarehouseError> {
        Ok(self
            .state
            .lock()
            .tables
            .get(&table.to_string())
            .map(|def| def.schema.clone()))
    }

    async fn create_table_if_not_exists(&self, def: &TableDef) -> Result<(), WarehouseError> {
        let key = def.table_reference.to_string();
        self.state.lock().tables.entry(key).or_insert_with(|| def.clone());
        Ok(())
    }

    async fn drop_table(&self, table: &TableRef) -> Result<(), WarehouseError> {
        self.state.lock().tables.remove(&table.to_string());
        Ok(())
    }

    async fn dataset_region(
        &self,
        project_id: &str,
        dataset_id: &str,
    ) -> Result<String, WarehouseError> {
        Ok(self
            .state
            .lock()
            .dataset_regions
            .get(&format!("{project_id}:{dataset_id}"))
            .cloned()
            .unwrap_or_else(|| "US".to_string()))
    }
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
