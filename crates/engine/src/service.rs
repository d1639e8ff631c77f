// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tail service.
//!
//! One [`TailService::handle`] call processes one trigger delivery:
//! routing by URL prefix, new-arrival tailing, window close, post-load
//! dispatch, plan replay, recovery, and the on-done bookkeeping (retry
//! counter, quarantine, source cleanup).

use crate::actions::ActionRunner;
use crate::dispatch::read_post_job_record;
use crate::planner::{LoadJob, Planner};
use crate::status::UriStatus;
use crate::window::{BatchCoordinator, STORAGE_VISIBILITY_DELAY_MS};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wr_adapters::{
    job_error, take_list_count, take_retry_counts, Gateway, NotifyAdapter, ObjectStore,
    PutMode, StoreError, Warehouse,
};
use wr_core::config::{ERROR_EXT, PROCESS_EXT, RESPONSE_EXT};
use wr_core::{
    url, ActionKind, ActionRequest, Clock, Config, ErrorKind, EventId, PipelineError, Process,
    Source, TriggerRequest, TriggerResponse, Window, STATUS_NOT_FOUND, STATUS_OK,
};
use wr_rules::{Registry, Rule};

/// Grace pause after a failed attempt so immediate redelivery does not hit
/// a still-broken backend.
const RETRY_GRACE: Duration = Duration::from_secs(3);

/// The ingestion service. One instance serves many trigger invocations.
pub struct TailService<S, W, N, C> {
    config: Arc<Config>,
    registry: Arc<Registry>,
    store: Gateway<S>,
    warehouse: W,
    notifier: N,
    clock: C,
    planner: Planner,
}

impl<S, W, N, C> TailService<S, W, N, C>
where
    S: ObjectStore,
    W: Warehouse,
    N: NotifyAdapter,
    C: Clock,
{
    pub fn new(config: Config, store: S, warehouse: W, notifier: N, clock: C) -> Self {
        let config = Arc::new(config);
        Self {
            registry: Arc::new(Registry::new(config.rules_url.clone())),
            store: Gateway::new(store),
            warehouse,
            notifier,
            clock,
            planner: Planner::new(Arc::clone(&config)),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Process one trigger delivery.
    pub async fn handle(
        &self,
        request: TriggerRequest,
        cancel: CancellationToken,
    ) -> TriggerResponse {
        let started = Instant::now();
        let store = self.store.with_cancel(cancel.clone());
        let runner = ActionRunner::new(
            store.clone(),
            self.warehouse.clone(),
            self.notifier.clone(),
            Arc::clone(&self.config),
        );

        let mut response = TriggerResponse::new(request.event_id.clone());
        response.trigger_url = request.source_url.clone();

        tracing::info!(event_id = %request.event_id, url = %request.source_url, "trigger");

        let result = if request.has_url_prefix(&self.config.load_process_prefix) {
            self.run_load_process(&store, &runner, &request, &mut response, &cancel)
                .await
        } else if request.has_url_prefix(&self.config.post_job_prefix) {
            self.run_post_load_actions(&store, &runner, &request, &mut response, &cancel)
                .await
        } else if request.has_url_prefix(&self.config.batch_prefix) {
            self.run_batch(&store, &runner, &request, &mut response, &cancel)
                .await
        } else {
            self.tail(&store, &runner, &request, &mut response, &cancel)
                .await
        };

        if let Err(err) = result {
            let message = err.to_string();
            // A vanished data object mid-flow is the aftermath of
            // idempotent redelivery; table and job-fetch misses are real
            // errors.
            if err.kind == ErrorKind::NotFound
                && !message.contains("table")
                && !message.contains("failed to fetch job")
            {
                response.not_found_error = message;
            } else {
                response.set_if_error(&err);
                if !response.retriable {
                    self.handle_process_error(&store, &err, &request, &mut response)
                        .await;
                }
            }
        }

        self.on_done(&store, &request, &mut response, started).await;
        response
    }

    /// New-arrival route: match, expand, and load (batched or direct).
    async fn tail(
        &self,
        store: &Gateway<S>,
        runner: &ActionRunner<S, W, N>,
        request: &TriggerRequest,
        response: &mut TriggerResponse,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        self.registry.reload_if_needed(store).await?;
        let Some(rule) = self.registry.match_source(&request.source_url)? else {
            return Ok(());
        };

        let source_meta = match store.stat(&request.source_url).await {
            Ok(meta) => meta,
            Err(e) if e.is_not_found() => {
                response.not_found_error = e.to_string();
                response.status = STATUS_NOT_FOUND.to_string();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let process = self.new_process(&rule, request, source_meta.mod_time)?;
        response.process = Some(process.clone());

        if rule.batch.is_some() {
            self.tail_in_batch(store, runner, rule, process, response, cancel)
                .await
        } else {
            let mut job = self
                .planner
                .build(rule, process, None, &self.warehouse)
                .await?;
            self.submit_load(store, runner, &mut job, response, cancel)
                .await?;
            self.try_recover_and_report(store, runner, &mut job, response, cancel)
                .await
        }
    }

    fn new_process(
        &self,
        rule: &Arc<Rule>,
        request: &TriggerRequest,
        source_time: chrono::DateTime<chrono::Utc>,
    ) -> Result<Process, PipelineError> {
        let mut process = Process::new(
            request.event_id.clone(),
            Source::new(&request.source_url, source_time),
            &rule.url,
            rule.is_async,
        );
        process.dest_table = rule.expand_table(&request.source_url, source_time)?;
        process.project_id = self.planner.select_project(rule);
        process.params = rule
            .params_for(&request.source_url)
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        self.config.assign_process_urls(&mut process);
        Ok(process)
    }

    async fn tail_in_batch(
        &self,
        store: &Gateway<S>,
        runner: &ActionRunner<S, W, N>,
        rule: Arc<Rule>,
        process: Process,
        response: &mut TriggerResponse,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let coordinator = BatchCoordinator::new(store.clone(), self.config.batch_base.clone());
        match coordinator.try_acquire(&process, &rule).await? {
            wr_core::BatchOutcome::Follower { owner_event_id } => {
                response.batching_event_id = Some(owner_event_id);
                Ok(())
            }
            wr_core::BatchOutcome::Owner(window) => {
                response.window = Some((*window).clone());
                if rule.is_async {
                    // The window object's own storage event drives the close.
                    return Ok(());
                }
                self.run_in_batch(store, runner, rule, *window, response, cancel)
                    .await
            }
        }
    }

    /// Window-close route: triggered by the window object itself.
    async fn run_batch(
        &self,
        store: &Gateway<S>,
        runner: &ActionRunner<S, W, N>,
        request: &TriggerRequest,
        response: &mut TriggerResponse,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let coordinator = BatchCoordinator::new(store.clone(), self.config.batch_base.clone());
        let window = coordinator.read_window(&request.source_url).await?;
        // The close runs on behalf of the opener's arrival.
        response.event_id = window.event_id.clone();

        self.registry.reload_if_needed(store).await?;
        let rule = self
            .registry
            .get(&window.rule_url)
            .ok_or_else(|| {
                PipelineError::config(format!("rule was empty for {}", window.rule_url))
            })?;
        self.run_in_batch(store, runner, rule, window, response, cancel)
            .await
    }

    /// Close a window: wait out the jitter, enumerate, load.
    async fn run_in_batch(
        &self,
        store: &Gateway<S>,
        runner: &ActionRunner<S, W, N>,
        rule: Arc<Rule>,
        mut window: Window,
        response: &mut TriggerResponse,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        response.batch_runner = true;
        response.window = Some(window.clone());

        let batch = rule
            .batch
            .as_ref()
            .ok_or_else(|| PipelineError::config(format!("rule has no batch: {}", rule.url)))?;
        let max_delay = batch.max_delay_ms(STORAGE_VISIBILITY_DELAY_MS);
        let jitter_ms = rand::thread_rng().gen_range(STORAGE_VISIBILITY_DELAY_MS..=max_delay);
        let close_at = window.end + chrono::Duration::milliseconds(jitter_ms as i64);
        let now = self.clock.now();
        if close_at > now {
            let wait = (close_at - now).to_std().unwrap_or_default();
            tracing::info!(window = %window.window_url, wait_ms = wait.as_millis() as u64, "waiting for window end");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => return Err(PipelineError::internal("cancelled")),
            }
        }

        let coordinator = BatchCoordinator::new(store.clone(), self.config.batch_base.clone());
        coordinator.collect_window_uris(&rule, &mut window).await?;
        response.window = Some(window.clone());

        let mut process = window.process.clone();
        process.is_async = rule.is_async;
        self.config.assign_process_urls(&mut process);
        response.process = Some(process.clone());

        if window.uris.is_empty() {
            tracing::info!(window = %window.window_url, "window closed empty");
            return Ok(());
        }

        let mut job = self
            .planner
            .build(rule, process, Some(window), &self.warehouse)
            .await?;
        self.submit_load(store, runner, &mut job, response, cancel)
            .await?;
        self.try_recover_and_report(store, runner, &mut job, response, cancel)
            .await
    }

    /// Persist the plan and run its root load action.
    async fn submit_load(
        &self,
        store: &Gateway<S>,
        runner: &ActionRunner<S, W, N>,
        job: &mut LoadJob,
        response: &mut TriggerResponse,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if job
            .load_request()
            .map(|l| l.source_uris.is_empty())
            .unwrap_or(true)
        {
            return Err(PipelineError::internal("sourceUris was empty"));
        }
        if let Err(e) = job.persist(store).await {
            response.upload_error = e.to_string();
        }
        job.job = runner.run(&job.plan, cancel).await?;
        if let Some(submitted) = &job.job {
            response.job_ref = Some(submitted.job_reference.clone());
        }
        Ok(())
    }

    /// Plan-replay route: rerun a persisted action plan under this
    /// delivery's event id.
    async fn run_load_process(
        &self,
        store: &Gateway<S>,
        runner: &ActionRunner<S, W, N>,
        request: &TriggerRequest,
        response: &mut TriggerResponse,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let data = store
            .get(&request.source_url)
            .await
            .map_err(PipelineError::from)?;
        let mut actions: Vec<wr_core::Action> = serde_json::from_slice(&data).map_err(|e| {
            PipelineError::internal(format!("unable to decode load plan {}: {e}", request.source_url))
        })?;
        for action in &mut actions {
            retarget_event(action, &request.event_id);
        }

        let result = runner.run_all(&actions, cancel).await;

        let (_, name) = url::split(&request.source_url);
        let journal_url = self.config.journal_url_for(&name);
        if let Err(e) = store.rename(&request.source_url, &journal_url).await {
            response.not_found_error = e.to_string();
        }
        result
    }

    /// Post-load dispatch route: react to a dispatched job's completion.
    async fn run_post_load_actions(
        &self,
        store: &Gateway<S>,
        runner: &ActionRunner<S, W, N>,
        request: &TriggerRequest,
        response: &mut TriggerResponse,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let mut action = read_post_job_record(store, &request.source_url, cancel).await?;
        let job_ref = action.job.clone().ok_or_else(|| {
            PipelineError::internal(format!(
                "post-job record missing job reference: {}",
                request.source_url
            ))
        })?;

        if !job_ref.location.is_empty() {
            action.meta.process.region = job_ref.location.clone();
        }
        if !job_ref.project_id.is_empty() {
            action.meta.process.project_id = job_ref.project_id.clone();
        }
        response.process = Some(action.meta.process.clone());

        let warehouse_job = match self.warehouse.get_job(&job_ref).await {
            Ok(job) => job,
            Err(e) => {
                response.retriable = e.kind.is_retryable();
                return Err(PipelineError::new(
                    e.kind,
                    format!("failed to fetch job {}: {}", job_ref.job_id, e.message),
                ));
            }
        };
        if let Err(e) = self.log_job_info(store, &warehouse_job).await {
            response.upload_error = format!("failed to log job info: {e}");
        }

        let failure = job_error(&warehouse_job);
        let is_load = matches!(
            action.kind(),
            ActionKind::Load | ActionKind::Reload
        );
        if let Some(err) = &failure {
            if err.is_retryable() {
                response.retriable = true;
                return Err(err.clone());
            }
            if is_load && warehouse_job.load.is_some() {
                self.registry.reload_if_needed(store).await?;
                let Some(rule) = self.registry.get(&action.meta.process.rule_url) else {
                    return Err(err.clone());
                };
                let mut load_job = LoadJob {
                    rule,
                    process: action.meta.process.clone(),
                    window: None,
                    plan: action.clone(),
                    job: Some(warehouse_job),
                };
                return self
                    .try_recover_and_report(store, runner, &mut load_job, response, cancel)
                    .await;
            }
        }

        runner
            .run_all(action.to_run(failure.is_some()), cancel)
            .await?;
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn log_job_info(
        &self,
        store: &Gateway<S>,
        job: &wr_adapters::WarehouseJob,
    ) -> Result<(), PipelineError> {
        let Some(info_url) = self.config.job_info_url(&job.job_reference.job_id) else {
            return Ok(());
        };
        let payload = serde_json::to_vec(job)
            .map_err(|e| PipelineError::internal(format!("job info encode: {e}")))?;
        store
            .put(&info_url, payload, PutMode::Overwrite)
            .await
            .map_err(PipelineError::from)
    }

    /// Recovery entry: inspect the submitted job and re-drive what's valid.
    async fn try_recover_and_report(
        &self,
        store: &Gateway<S>,
        runner: &ActionRunner<S, W, N>,
        job: &mut LoadJob,
        response: &mut TriggerResponse,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let Some(warehouse_job) = job.job.clone() else {
            return Ok(());
        };
        let Some(err) = job_error(&warehouse_job) else {
            return Ok(());
        };
        if err.is_retryable() {
            return Err(err);
        }
        response.process = Some(job.process.clone());

        if warehouse_job.source_uris().is_empty() {
            return Err(err);
        }
        response.load_error = err.to_string();

        let uris = UriStatus::classify(&warehouse_job);
        response.corrupted = uris.corrupted.clone();
        response.invalid_schema = uris.invalid_schema.clone();

        let (corrupted_url, invalid_url) = self.quarantine_urls(&job.rule);
        if let Err(e) = self.move_assets(store, &uris.corrupted, &corrupted_url).await {
            response.move_error = format!(
                "failed to move {:?} to {corrupted_url}: {e}",
                uris.corrupted
            );
        }
        if let Err(e) = self
            .move_assets(store, &uris.invalid_schema, &invalid_url)
            .await
        {
            response.move_error = format!(
                "failed to move {:?} to {invalid_url}: {e}",
                uris.invalid_schema
            );
        }

        if uris.valid.is_empty() {
            // Fully quarantined: permanent, nothing to resubmit.
            response.retriable = false;
            return Ok(());
        }

        response.status = STATUS_OK.to_string();
        response.error.clear();

        // Resubmit only the valid subset one step later, inheriting the
        // chained post-actions so the downstream DAG still runs.
        let mut reload = job.plan.clone();
        if let ActionRequest::Load(load) | ActionRequest::Reload(load) = &mut reload.request {
            load.source_uris = uris.valid.clone();
        }
        if let ActionRequest::Load(load) = reload.request.clone() {
            reload.request = ActionRequest::Reload(load);
        }
        let failed_step = wr_core::parse_job_id(&warehouse_job.job_reference.job_id)
            .map(|parts| parts.step)
            .unwrap_or(reload.meta.step);
        reload.meta.step = failed_step + 1;
        reload.meta = reload.meta.clone().wrap(ActionKind::Reload);
        tracing::info!(
            valid = uris.valid.len(),
            step = reload.meta.step,
            "resubmitting valid subset"
        );

        let recovered = runner.run(&reload, cancel).await?;
        if let Some(recovered) = recovered {
            response.job_ref = Some(recovered.job_reference.clone());
            if let Some(err) = job_error(&recovered) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn quarantine_urls(&self, rule: &Rule) -> (String, String) {
        let corrupted = if rule.corrupted_file_url.is_empty() {
            self.config.corrupted_file_url.clone()
        } else {
            rule.corrupted_file_url.clone()
        };
        let invalid = if rule.invalid_schema_url.is_empty() {
            self.config.invalid_schema_url.clone()
        } else {
            rule.invalid_schema_url.clone()
        };
        (corrupted, invalid)
    }

    /// Best-effort quarantine move; a file already absent counts as moved.
    async fn move_assets(
        &self,
        store: &Gateway<S>,
        urls: &[String],
        base_dest: &str,
    ) -> Result<(), PipelineError> {
        let mut last_err: Option<StoreError> = None;
        for source in urls {
            let dest = url::join(base_dest, &[url::path(source)]);
            if let Err(e) = store.rename(source, &dest).await {
                if !store.exists(source).await.unwrap_or(false) {
                    continue;
                }
                last_err = Some(e);
            } else {
                tracing::info!(from = %source, to = %dest, "quarantined");
            }
        }
        match last_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Terminal failure handling: replay internal/backend faults, journal
    /// everything else and move the plan to done.
    async fn handle_process_error(
        &self,
        store: &Gateway<S>,
        err: &PipelineError,
        _request: &TriggerRequest,
        response: &mut TriggerResponse,
    ) {
        let Some(process) = response.process.clone() else {
            return;
        };
        let active_url = if process.process_url.is_empty() {
            self.config.load_process_url(&process.event_id)
        } else {
            process.process_url.clone()
        };

        if err.kind.is_replayable() && store.exists(&active_url).await.unwrap_or(false) {
            // Rewriting the plan object fires a fresh storage event, which
            // re-executes the whole process from scratch.
            if store.copy(&active_url, &active_url).await.is_ok() {
                tracing::warn!(plan = %active_url, error = %err, "replaying load process");
                return;
            }
        }

        let dest = if process.dest_table.is_empty() {
            "unknown"
        } else {
            process.dest_table.as_str()
        };
        let event_id = &process.event_id;
        if let Ok(data) = serde_json::to_vec(&response.clone()) {
            let response_url = self.config.error_file_url(dest, event_id, RESPONSE_EXT);
            if let Err(e) = store.put(&response_url, data, PutMode::Overwrite).await {
                response.upload_error = e.to_string();
            }
        }
        let error_url = self.config.error_file_url(dest, event_id, ERROR_EXT);
        if let Err(e) = store
            .put(&error_url, err.to_string().into_bytes(), PutMode::Overwrite)
            .await
        {
            response.upload_error = e.to_string();
        }
        let process_copy_url = self.config.error_file_url(dest, event_id, PROCESS_EXT);
        let _ = store.copy(&active_url, &process_copy_url).await;
        let done_url = if process.done_process_url.is_empty() {
            self.config.done_process_url(event_id)
        } else {
            process.done_process_url.clone()
        };
        let _ = store.rename(&active_url, &done_url).await;
    }

    /// Read-increment-write the event's retry counter.
    ///
    /// Deliberately unsynchronized: concurrent writers can only over-count,
    /// which shortens the retry budget, and event ids are unique per
    /// arrival so same-counter races require a duplicated delivery.
    async fn bump_counter(
        &self,
        store: &Gateway<S>,
        counter_url: &str,
    ) -> Result<u32, PipelineError> {
        let mut counter = 0u32;
        match store.get(counter_url).await {
            Ok(data) => {
                counter = String::from_utf8_lossy(&data).trim().parse().unwrap_or(0);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        counter += 1;
        store
            .put(
                counter_url,
                counter.to_string().into_bytes(),
                PutMode::Overwrite,
            )
            .await
            .map_err(PipelineError::from)?;
        Ok(counter)
    }

    /// Final bookkeeping for every trigger outcome.
    async fn on_done(
        &self,
        store: &Gateway<S>,
        request: &TriggerRequest,
        response: &mut TriggerResponse,
        started: Instant,
    ) {
        response.list_op_count = take_list_count();
        response.storage_retries = take_retry_counts();
        response.time_taken_ms = started.elapsed().as_millis() as u64;

        if !response.error.is_empty() {
            let counter_url = self.config.retry_counter_url(&response.event_id);
            match self.bump_counter(store, &counter_url).await {
                Ok(counter) if counter > self.config.max_retries => {
                    // Budget exhausted: quarantine the source and report
                    // success so the retry chain stops.
                    response.retry_error = response.error.clone();
                    response.status = STATUS_OK.to_string();
                    response.error.clear();
                    response.retriable = false;
                    let retry_url = self
                        .config
                        .retry_data_url(&response.event_id, &request.source_url);
                    tracing::warn!(
                        source = %request.source_url,
                        quarantine = %retry_url,
                        "retry budget exhausted"
                    );
                    if let Err(e) = store.rename(&request.source_url, &retry_url).await {
                        response.move_error = e.to_string();
                    }
                    return;
                }
                Ok(_) => {
                    tokio::time::sleep(RETRY_GRACE).await;
                }
                Err(e) => {
                    response.counter_error = e.to_string();
                }
            }
        }

        if response.retriable {
            response.retry_error = response.error.clone();
            return;
        }

        // Nothing to clean up unless this delivery produced work.
        if response.process.is_none() {
            return;
        }
        // Batched data files must survive until the owner's close.
        if response.batching_event_id.is_some()
            || (response.window.is_some() && !response.batch_runner)
        {
            return;
        }

        if let Err(e) = store.delete(&request.source_url).await {
            if response.not_found_error.is_empty() && !e.is_not_found() {
                response.not_found_error =
                    format!("failed to delete: {}, {}", request.source_url, e);
            }
        }
    }
}

fn retarget_event(action: &mut wr_core::Action, event_id: &EventId) {
    action.meta.process.event_id = event_id.clone();
    for child in action
        .on_success
        .iter_mut()
        .chain(action.on_failure.iter_mut())
    {
        retarget_event(child, event_id);
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
