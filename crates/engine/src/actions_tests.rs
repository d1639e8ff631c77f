// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wr_adapters::{FakeNotifyAdapter, JobFault, MemStore, MemWarehouse};
use wr_core::{
    ActionMeta, DropRequest, LoadRequest, NotifyRequest, Process, TableRef, WriteDisposition,
};

fn runner(
    store: &MemStore,
    warehouse: &MemWarehouse,
    notifier: &FakeNotifyAdapter,
) -> ActionRunner<MemStore, MemWarehouse, FakeNotifyAdapter> {
    ActionRunner::new(
        Gateway::new(store.clone()),
        warehouse.clone(),
        notifier.clone(),
        Arc::new(Config::builder().build()),
    )
}

fn load_action(is_async: bool) -> Action {
    let mut process = Process::builder()
        .event_id("evt-1")
        .dest_table("proj:ds.t")
        .build();
    process.is_async = is_async;
    let mut meta = ActionMeta::new(process);
    meta.step = 1;
    Action::new(
        ActionRequest::Load(LoadRequest {
            source_uris: vec!["mem://data/in/a.json".into()],
            destination_table: TableRef::parse("proj:ds.t").unwrap(),
            schema: None,
            write_disposition: WriteDisposition::Append,
            source_format: None,
        }),
        meta,
    )
}

fn notify_child(title: &str) -> Action {
    let mut meta = ActionMeta::new(Process::builder().build());
    meta.step = 2;
    Action::new(
        ActionRequest::Notify(NotifyRequest {
            title: title.into(),
            message: "m".into(),
        }),
        meta,
    )
}

#[tokio::test]
async fn sync_success_runs_on_success_chain() {
    let store = MemStore::new();
    let warehouse = MemWarehouse::new();
    let notifier = FakeNotifyAdapter::new();
    let action = load_action(false)
        .with_success(vec![notify_child("ok")])
        .with_failure(vec![notify_child("failed")]);

    let job = runner(&store, &warehouse, &notifier)
        .run(&action, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert!(job.status.is_done());

    let calls = notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].title, "ok");
}

#[tokio::test]
async fn permanent_failure_routes_to_on_failure_chain() {
    let store = MemStore::new();
    let warehouse = MemWarehouse::new();
    warehouse.fail_next(
        "proj_ds_t",
        vec![JobFault::new("invalid", "Unexpected token.").at("mem://data/in/a.json")],
    );
    let notifier = FakeNotifyAdapter::new();
    let action = load_action(false)
        .with_success(vec![notify_child("ok")])
        .with_failure(vec![notify_child("failed")]);

    let job = runner(&store, &warehouse, &notifier)
        .run(&action, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert!(wr_adapters::job_error(&job).is_some());
    assert_eq!(notifier.calls()[0].title, "failed");
}

#[tokio::test]
async fn retryable_failure_propagates_without_successors() {
    let store = MemStore::new();
    let warehouse = MemWarehouse::new();
    warehouse.fail_next("proj_ds_t", vec![JobFault::new("backendError", "try later")]);
    let notifier = FakeNotifyAdapter::new();
    let action = load_action(false).with_failure(vec![notify_child("failed")]);

    let err = runner(&store, &warehouse, &notifier)
        .run(&action, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RetryableBackend);
    assert!(notifier.calls().is_empty());
}

#[tokio::test]
async fn dispatched_job_writes_its_post_job_record_first() {
    let store = MemStore::new();
    let warehouse = MemWarehouse::new();
    let notifier = FakeNotifyAdapter::new();
    let action = load_action(true).with_success(vec![notify_child("ok")]);

    let job = runner(&store, &warehouse, &notifier)
        .run(&action, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    // Record keyed by the deterministic job id, with the reference inside.
    let record_url = format!("mem://trigger/postJob/{}.json", job.job_reference.job_id);
    let record: Action = serde_json::from_slice(&store.contents(&record_url).unwrap()).unwrap();
    assert_eq!(record.job.as_ref().unwrap(), &job.job_reference);
    assert_eq!(record.on_success.len(), 1);

    // Dispatched mode returns without running successors.
    assert!(notifier.calls().is_empty());
}

#[tokio::test]
async fn duplicate_submission_fetches_the_existing_job() {
    let store = MemStore::new();
    let warehouse = MemWarehouse::new();
    let notifier = FakeNotifyAdapter::new();
    let action = load_action(false);
    let runner = runner(&store, &warehouse, &notifier);

    let first = runner.run(&action, &CancellationToken::new()).await.unwrap().unwrap();
    let second = runner.run(&action, &CancellationToken::new()).await.unwrap().unwrap();
    assert_eq!(first.job_reference, second.job_reference);
    // Only one real submission reached the warehouse.
    assert_eq!(warehouse.submissions().len(), 1);
}

#[tokio::test]
async fn delete_action_tolerates_missing_objects() {
    let store = MemStore::new();
    store.seed("mem://data/in/a.json", "a", chrono::Utc::now());
    let warehouse = MemWarehouse::new();
    let notifier = FakeNotifyAdapter::new();

    let mut meta = ActionMeta::new(Process::builder().build());
    meta.step = 1;
    let action = Action::new(
        ActionRequest::Delete(wr_core::DeleteRequest {
            urls: vec![
                "mem://data/in/a.json".into(),
                "mem://data/in/already-gone.json".into(),
            ],
            include_source: false,
        }),
        meta,
    );

    runner(&store, &warehouse, &notifier)
        .run(&action, &CancellationToken::new())
        .await
        .unwrap();
    assert!(store.contents("mem://data/in/a.json").is_none());
}

#[tokio::test]
async fn drop_action_tolerates_absent_table() {
    let store = MemStore::new();
    let warehouse = MemWarehouse::new();
    let notifier = FakeNotifyAdapter::new();

    let mut meta = ActionMeta::new(Process::builder().build());
    meta.step = 1;
    let action = Action::new(
        ActionRequest::Drop(DropRequest {
            table: TableRef::parse("proj:temp.never_created").unwrap(),
        }),
        meta,
    )
    .with_success(vec![notify_child("after-drop")]);

    runner(&store, &warehouse, &notifier)
        .run(&action, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(notifier.calls()[0].title, "after-drop");
}

#[tokio::test]
async fn notify_failure_never_fails_the_chain() {
    let store = MemStore::new();
    let warehouse = MemWarehouse::new();
    let notifier = FakeNotifyAdapter::new();
    notifier.fail_sends();

    let action = load_action(false).with_success(vec![notify_child("dropped")]);
    let job = runner(&store, &warehouse, &notifier)
        .run(&action, &CancellationToken::new())
        .await
        .unwrap();
    assert!(job.is_some());
}
