//! Unbatched arrivals: direct load, idempotent redelivery.

use crate::prelude::*;

const RULE: &str = r#"
when: { prefix: "/in/", suffix: ".json" }
dest: { table: "proj:ds.x" }
"#;

#[tokio::test(start_paused = true)]
async fn single_arrival_loads_and_cleans_up() {
    let h = harness();
    h.seed_rule("x.yaml", RULE);
    h.seed_data("mem://data/in/1.json", 1_700_000_000);

    let response = h.deliver("evt-1", "mem://data/in/1.json").await;

    assert!(response.is_ok(), "{response:?}");
    assert!(!response.retriable);
    let loads = h.warehouse.loads();
    assert_eq!(loads.len(), 1);
    similar_asserts::assert_eq!(
        loads[0].load.as_ref().unwrap().source_uris,
        vec!["mem://data/in/1.json".to_string()]
    );
    assert_eq!(
        loads[0].load.as_ref().unwrap().destination_table.to_string(),
        "proj:ds.x"
    );
    // No post actions declared; the source is deleted by the service.
    assert!(h.store.contents("mem://data/in/1.json").is_none());
    assert!(response.job_ref.is_some());
}

#[tokio::test(start_paused = true)]
async fn redelivery_after_source_deletion_reports_not_found_success() {
    let h = harness();
    h.seed_rule("x.yaml", RULE);
    h.seed_data("mem://data/in/1.json", 1_700_000_000);

    let first = h.deliver("evt-1", "mem://data/in/1.json").await;
    assert!(first.is_ok());

    // The idempotent redelivery finds the source already gone.
    let second = h.deliver("evt-1", "mem://data/in/1.json").await;
    assert_eq!(second.status, "notFound");
    assert!(second.error.is_empty());
    assert_eq!(h.warehouse.submissions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_replay_converges_on_the_existing_job() {
    let h = harness();
    h.seed_rule("x.yaml", RULE);
    h.seed_data("mem://data/in/1.json", 1_700_000_000);

    let first = h.deliver("evt-1", "mem://data/in/1.json").await;
    let first_job = first.job_ref.clone().unwrap();

    // Same storage event delivered again after the job exists: the planner
    // regenerates the same job id, the warehouse rejects the duplicate, and
    // the worker proceeds as if it were the first submitter.
    h.seed_data("mem://data/in/1.json", 1_700_000_000);
    let second = h.deliver("evt-1", "mem://data/in/1.json").await;

    assert!(second.is_ok(), "{second:?}");
    assert_eq!(second.job_ref.unwrap(), first_job);
    assert_eq!(h.warehouse.submissions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn persisted_plan_replays_through_the_load_process_route() {
    let h = harness();
    h.seed_rule("x.yaml", RULE);
    h.seed_data("mem://data/in/1.json", 1_700_000_000);

    h.deliver("evt-1", "mem://data/in/1.json").await;
    let plan_url = "mem://trigger/loadProcess/evt-1.json";
    assert!(h.store.contents(plan_url).is_some());

    // Replaying the persisted plan under the same event id regenerates the
    // same job ids, so the warehouse converges instead of reloading.
    h.seed_data("mem://data/in/1.json", 1_700_000_000);
    let replay = h.deliver("evt-1", plan_url).await;
    assert!(replay.is_ok(), "{replay:?}");
    assert_eq!(h.warehouse.submissions().len(), 1);

    // The plan file is journaled after the replay.
    assert!(h.store.contents(plan_url).is_none());
    assert!(h
        .store
        .contents("mem://ops/journal/evt-1.json")
        .is_some());
}
