// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action runtime.
//!
//! Executes a post-load DAG node by node. Warehouse-job actions run sync
//! (submit, wait, then successors) or dispatched (persist a post-job
//! record keyed by the deterministic job id, submit, and return; the
//! job's completion retriggers through the dispatcher). Retryable
//! failures propagate up so the whole trigger is redelivered; permanent
//! failures route to the on-failure successors.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wr_adapters::{
    job_error, Gateway, JobSpec, NotifyAdapter, ObjectStore, PutMode, StoreError, Warehouse,
    WarehouseJob,
};
use wr_core::{
    Action, ActionKind, ActionRequest, Config, DeleteRequest, ErrorKind, JobRef, PipelineError,
    StepMode,
};

/// Executes action DAGs against the configured adapters.
#[derive(Clone)]
pub struct ActionRunner<S, W, N> {
    store: Gateway<S>,
    warehouse: W,
    notifier: N,
    config: Arc<Config>,
}

impl<S, W, N> ActionRunner<S, W, N>
where
    S: ObjectStore,
    W: Warehouse,
    N: NotifyAdapter,
{
    pub fn new(store: Gateway<S>, warehouse: W, notifier: N, config: Arc<Config>) -> Self {
        Self {
            store,
            warehouse,
            notifier,
            config,
        }
    }

    /// Run a list of sibling actions in order.
    ///
    /// Boxed so the DAG recursion (run → successors → run) type-checks.
    pub fn run_all<'a>(
        &'a self,
        actions: &'a [Action],
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), PipelineError>> + Send + 'a>> {
        Box::pin(async move {
            for action in actions {
                self.run(action, cancel).await?;
            }
            Ok(())
        })
    }

    /// Run one action; returns the warehouse job it produced, if any.
    pub async fn run(
        &self,
        action: &Action,
        cancel: &CancellationToken,
    ) -> Result<Option<WarehouseJob>, PipelineError> {
        let kind = action.kind();
        tracing::debug!(action = %kind, step = action.meta.step, "running action");
        match &action.request {
            ActionRequest::Load(load) | ActionRequest::Reload(load) => {
                self.run_job(action, kind, JobSpec::Load(load.clone()), cancel)
                    .await
                    .map(Some)
            }
            ActionRequest::Query(query) => self
                .run_job(action, kind, JobSpec::Query(query.clone()), cancel)
                .await
                .map(Some),
            ActionRequest::Copy(copy) => self
                .run_job(action, kind, JobSpec::Copy(copy.clone()), cancel)
                .await
                .map(Some),
            ActionRequest::Export(export) => self
                .run_job(action, kind, JobSpec::Export(export.clone()), cancel)
                .await
                .map(Some),
            ActionRequest::Drop(drop) => {
                match self.warehouse.drop_table(&drop.table).await {
                    Ok(()) => {}
                    // Dropping an already-absent table is a success under
                    // idempotent re-delivery.
                    Err(e) if e.kind == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                self.run_all(&action.on_success, cancel).await?;
                Ok(None)
            }
            ActionRequest::Notify(notify) => {
                // A lost notification never fails the chain.
                if let Err(e) = self.notifier.notify(&notify.title, &notify.message).await {
                    tracing::warn!(error = %e, "notify action failed");
                }
                self.run_all(&action.on_success, cancel).await?;
                Ok(None)
            }
            ActionRequest::Delete(delete) => {
                self.run_delete(&action.meta.process.source.source_url, delete)
                    .await?;
                self.run_all(&action.on_success, cancel).await?;
                Ok(None)
            }
        }
    }

    /// Submit a warehouse job under its deterministic reference.
    ///
    /// A duplicate-job rejection means an earlier delivery already created
    /// it: fetch and continue as if we were the first submitter.
    async fn submit(
        &self,
        spec: JobSpec,
        job_ref: &JobRef,
    ) -> Result<WarehouseJob, PipelineError> {
        match self.warehouse.submit(spec, job_ref.clone()).await {
            Ok(job) => Ok(job),
            Err(e) if e.is_duplicate_job() => {
                tracing::info!(job_id = %job_ref.job_id, "duplicate job, fetching existing");
                self.warehouse
                    .get_job(job_ref)
                    .await
                    .map_err(PipelineError::from)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn run_job(
        &self,
        action: &Action,
        kind: ActionKind,
        spec: JobSpec,
        cancel: &CancellationToken,
    ) -> Result<WarehouseJob, PipelineError> {
        let meta = &action.meta;
        let project_id = if meta.process.project_id.is_empty() {
            self.config.project_id.clone()
        } else {
            meta.process.project_id.clone()
        };
        let job_ref = JobRef {
            project_id,
            location: meta.process.region.clone(),
            job_id: meta.job_id(kind),
        };

        if meta.process.step_mode(kind) == StepMode::Dispatch {
            // The post-job record goes first: once the job exists, its
            // completion event must find the record waiting.
            let mut record = action.clone();
            record.job = Some(job_ref.clone());
            let payload = serde_json::to_vec(&record)
                .map_err(|e| PipelineError::internal(format!("post-job encode: {e}")))?;
            let record_url = self.config.post_job_url(&meta.job_filename(kind));
            self.store
                .put(&record_url, payload, PutMode::Overwrite)
                .await
                .map_err(PipelineError::from)?;
            let job = self.submit(spec, &job_ref).await?;
            tracing::info!(job_id = %job_ref.job_id, record = %record_url, "job dispatched");
            return Ok(job);
        }

        let job = self.submit(spec, &job_ref).await?;
        let job = if job.status.is_done() {
            job
        } else {
            self.warehouse
                .wait(&job_ref, cancel)
                .await
                .map_err(PipelineError::from)?
        };

        let failure = job_error(&job);
        if let Some(err) = &failure {
            if err.is_retryable() {
                return Err(err.clone());
            }
            tracing::warn!(job_id = %job_ref.job_id, error = %err, "job failed");
        }
        self.run_all(action.to_run(failure.is_some()), cancel).await?;
        Ok(job)
    }

    async fn run_delete(
        &self,
        source_url: &str,
        delete: &DeleteRequest,
    ) -> Result<(), PipelineError> {
        let mut targets = delete.urls.clone();
        if delete.include_source {
            targets.push(source_url.to_string());
        }
        let mut last_err: Option<StoreError> = None;
        for target in &targets {
            match self.store.delete(target).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "actions_tests.rs"]
mod tests;
