//! Dispatched (async) post-load flow.

use crate::prelude::*;
use wr_adapters::JobFault;

const ASYNC_RULE: &str = r#"
when: { prefix: "/in/", suffix: ".json" }
dest: { table: "proj:ds.x" }
async: true
onSuccess:
  - action: notify
    request: { title: "loaded", message: "$DestTable" }
onFailure:
  - action: notify
    request: { title: "load failed", message: "$DestTable" }
"#;

#[tokio::test(start_paused = true)]
async fn dispatched_load_completes_through_the_post_job_trigger() {
    let h = harness();
    h.seed_rule("x.yaml", ASYNC_RULE);
    h.seed_data("mem://data/in/1.json", 1_700_000_000);

    // The arrival submits the load and returns without waiting.
    let arrival = h.deliver("evt-1", "mem://data/in/1.json").await;
    assert!(arrival.is_ok(), "{arrival:?}");
    assert_eq!(h.warehouse.loads().len(), 1);
    assert!(h.notifier.calls().is_empty());

    let job_id = arrival.job_ref.as_ref().unwrap().job_id.clone();
    assert!(job_id.ends_with("--dispatch"));
    let record_url = format!("mem://trigger/postJob/{job_id}.json");
    assert!(h.store.contents(&record_url).is_some());

    // The job's completion fires the post-job trigger; the dispatcher
    // fetches the job and runs the success chain.
    let completion = h.deliver("evt-post", &record_url).await;
    assert!(completion.is_ok(), "{completion:?}");
    assert_eq!(h.notifier.calls().len(), 1);
    assert_eq!(h.notifier.calls()[0].title, "loaded");
    // The record is cleaned up after dispatch.
    assert!(h.store.contents(&record_url).is_none());
}

#[tokio::test(start_paused = true)]
async fn dispatched_load_failure_recovers_without_resubmission() {
    let h = harness();
    // Every configured URI is missing, so recovery quarantines nothing and
    // has nothing valid to resubmit: the failure is terminal but handled.
    h.seed_rule(
        "x.yaml",
        r#"
when: { prefix: "/in/", suffix: ".json" }
dest: { table: "proj:ds.x" }
async: true
onFailure:
  - action: notify
    request: { title: "load failed", message: "$DestTable" }
"#,
    );
    h.seed_data("mem://data/in/1.json", 1_700_000_000);
    h.warehouse.fail_next(
        "proj_ds_x",
        vec![JobFault::new(
            "notFound",
            "Not found: URI mem://data/in/1.json",
        )],
    );

    let arrival = h.deliver("evt-1", "mem://data/in/1.json").await;
    assert!(arrival.is_ok());
    let job_id = arrival.job_ref.as_ref().unwrap().job_id.clone();
    let record_url = format!("mem://trigger/postJob/{job_id}.json");

    let completion = h.deliver("evt-post", &record_url).await;
    // Everything was missing; the failure is permanent and fully handled.
    assert!(completion.is_ok(), "{completion:?}");
    assert!(!completion.retriable);
    assert!(!completion.load_error.is_empty());
    assert_eq!(h.warehouse.submissions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_post_job_record_is_redelivery_aftermath() {
    let h = harness();
    h.seed_rule("x.yaml", ASYNC_RULE);

    let response = h
        .deliver("evt-post", "mem://trigger/postJob/ghost--evt--001--dispatch.json")
        .await;
    assert!(response.is_ok());
    assert!(!response.not_found_error.is_empty());
}
