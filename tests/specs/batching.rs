//! Batch windows: ownership, close, rollover.

use crate::prelude::*;
use tokio_util::sync::CancellationToken;
use wr_core::TriggerRequest;

const BATCHED_RULE: &str = r#"
when: { prefix: "/in/", suffix: ".json" }
dest: { table: "proj:ds.x" }
batch: { window: 60s }
onSuccess:
  - action: delete
"#;

const ASYNC_BATCHED_RULE: &str = r#"
when: { prefix: "/in/", suffix: ".json" }
dest: { table: "proj:ds.x" }
batch: { window: 60s }
async: true
"#;

#[tokio::test(start_paused = true)]
async fn opener_and_follower_share_one_load() {
    let h = harness();
    h.seed_rule("x.yaml", BATCHED_RULE);
    // Both files land in the same bucket before the owner's close lists.
    h.seed_data("mem://data/in/1.json", 1_700_000_000);
    h.seed_data("mem://data/in/2.json", 1_700_000_030);

    // Worker A opens the window and (sync rule) closes it inline after
    // sleeping past the window end.
    let owner = h.deliver("evt-a", "mem://data/in/1.json").await;
    assert!(owner.is_ok(), "{owner:?}");
    assert!(owner.batch_runner);
    let window = owner.window.as_ref().unwrap();
    assert_eq!(window.start, at(BUCKET_START));
    assert_eq!(window.end, at(BUCKET_END));
    similar_asserts::assert_eq!(
        window.uris,
        vec![
            "mem://data/in/1.json".to_string(),
            "mem://data/in/2.json".to_string(),
        ]
    );

    // One load carries both URIs; the delete action reaped them.
    let loads = h.warehouse.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].load.as_ref().unwrap().source_uris.len(), 2);
    assert!(h.store.contents("mem://data/in/2.json").is_none());

    // Worker B arrives afterwards and just observes the owner.
    h.seed_data("mem://data/in/2.json", 1_700_000_030);
    let follower = h.deliver("evt-b", "mem://data/in/2.json").await;
    assert!(follower.is_ok());
    assert_eq!(
        follower.batching_event_id.as_ref().unwrap().as_str(),
        "evt-a"
    );
    assert!(follower.window.is_none());
    // The follower's file is left for the window owner.
    assert!(h.store.contents("mem://data/in/2.json").is_some());
    assert_eq!(h.warehouse.loads().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn async_rule_defers_the_close_to_the_window_trigger() {
    let h = harness();
    h.seed_rule("x.yaml", ASYNC_BATCHED_RULE);
    h.seed_data("mem://data/in/1.json", 1_700_000_000);
    h.seed_data("mem://data/in/2.json", 1_700_000_030);

    let owner = h.deliver("evt-a", "mem://data/in/1.json").await;
    assert!(owner.is_ok());
    assert!(!owner.batch_runner);
    let window_url = owner.window.as_ref().unwrap().window_url.clone();
    assert!(h.warehouse.loads().is_empty());
    // The owner's data file survives until the close.
    assert!(h.store.contents("mem://data/in/1.json").is_some());

    // The window object's own storage event closes the batch.
    h.clock.set(at(BUCKET_END + 5));
    let close = h.deliver("evt-win", &window_url).await;
    assert!(close.is_ok(), "{close:?}");
    assert!(close.batch_runner);
    // The close runs on behalf of the opener's arrival.
    assert_eq!(close.event_id.as_str(), "evt-a");
    let loads = h.warehouse.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].load.as_ref().unwrap().source_uris.len(), 2);
    // The window record itself is cleaned up after the close.
    assert!(h.store.contents(&window_url).is_none());
}

#[tokio::test(start_paused = true)]
async fn exactly_one_owner_under_concurrent_arrivals() {
    let h = harness();
    h.seed_rule("x.yaml", ASYNC_BATCHED_RULE);
    // Slow down the create-only put so every worker reaches it together.
    h.store.set_create_latency(std::time::Duration::from_millis(50));

    let mut handles = Vec::new();
    for i in 0..6 {
        let source_url = format!("mem://data/in/{i}.json");
        h.seed_data(&source_url, 1_700_000_000 + i);
        let service = std::sync::Arc::clone(&h.service);
        handles.push(tokio::spawn(async move {
            service
                .handle(
                    TriggerRequest::new(format!("evt-{i}"), source_url),
                    CancellationToken::new(),
                )
                .await
        }));
    }

    let mut owners = 0;
    let mut follower_owner_ids = Vec::new();
    for handle in handles {
        let response = handle.await.unwrap();
        assert!(response.is_ok(), "{response:?}");
        match (&response.window, &response.batching_event_id) {
            (Some(_), None) => owners += 1,
            (None, Some(owner_id)) => follower_owner_ids.push(owner_id.to_string()),
            other => panic!("ambiguous outcome: {other:?}"),
        }
    }
    assert_eq!(owners, 1, "exactly one owner per (table, bucket)");
    assert_eq!(follower_owner_ids.len(), 5);
    // Every follower resolved the same owner.
    follower_owner_ids.dedup();
    assert_eq!(follower_owner_ids.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rollover_absorbs_a_just_missed_bucket() {
    let h = harness();
    h.seed_rule(
        "x.yaml",
        r#"
when: { prefix: "/in/", suffix: ".json" }
dest: { table: "proj:ds.x" }
batch: { window: 60s, rollover: true }
async: true
"#,
    );
    // Arrival 45s into its bucket, no previous window: the opened window
    // extends one duration back.
    h.seed_data("mem://data/in/late.json", BUCKET_START + 45);
    h.clock.set(at(BUCKET_START + 45));

    let owner = h.deliver("evt-late", "mem://data/in/late.json").await;
    let window = owner.window.as_ref().unwrap();
    assert_eq!(window.end, at(BUCKET_END));
    assert_eq!(window.start, at(BUCKET_START - 60));
}
