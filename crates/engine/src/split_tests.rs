// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::planner::Planner;
use std::sync::Arc;
use wr_adapters::MemWarehouse;
use wr_core::{ActionRequest, Config, Source};
use wr_rules::parse_rules;

const SPLIT_RULE: &str = r#"
when: { suffix: ".json" }
dest:
  table: "proj:ds.events"
  transient: { dataset: "temp" }
  schema:
    template: "proj:ds.events_template"
    split:
      clusterColumns: ["meta.region"]
      timeColumn: "ts"
      mapping:
        - when: "meta.region = 'us'"
          then: "proj:ds.events_us"
        - when: "meta.region = 'eu'"
          then: "proj:ds.events_eu"
onSuccess:
  - action: delete
"#;

fn template_schema() -> TableSchema {
    TableSchema {
        fields: vec![
            FieldSchema::new("id", "STRING"),
            FieldSchema {
                name: "meta".into(),
                field_type: "RECORD".into(),
                mode: None,
                fields: vec![FieldSchema::new("region", "STRING")],
            },
        ],
    }
}

fn warehouse_with_template() -> MemWarehouse {
    let warehouse = MemWarehouse::new();
    warehouse.put_table(TableDef {
        table_reference: TableRef::parse("proj:ds.events_template").unwrap(),
        schema: template_schema(),
        time_partitioning: None,
        clustering: None,
    });
    warehouse
}

async fn build_split_job(warehouse: &MemWarehouse) -> crate::planner::LoadJob {
    let rules = parse_rules(SPLIT_RULE, wr_rules::Format::Yaml, "mem://config/rules/s.yaml").unwrap();
    let rule = Arc::new(rules.into_iter().next().unwrap());
    let mut process = Process::builder()
        .event_id("evt-1")
        .dest_table("proj:ds.events")
        .rule_url("mem://config/rules/s.yaml")
        .build();
    process.source = Source::new(
        "mem://data/in/a.json",
        chrono::TimeZone::timestamp_opt(&chrono::Utc, 1_700_000_000, 0)
            .single()
            .unwrap(),
    );
    Config::builder().build().assign_process_urls(&mut process);
    Planner::new(Arc::new(Config::builder().build()))
        .build(rule, process, None, warehouse)
        .await
        .unwrap()
}

#[tokio::test]
async fn staging_table_is_created_with_partitioning_and_clustering() {
    let warehouse = warehouse_with_template();
    build_split_job(&warehouse).await;

    let staging_ref = TableRef::parse("proj:temp.events_evt_1_split").unwrap();
    let staging = warehouse.table(&staging_ref).expect("staging table created");
    assert_eq!(staging.time_partitioning.as_ref().unwrap().field, "ts");
    assert_eq!(
        staging.clustering.as_ref().unwrap().fields,
        vec!["region".to_string()]
    );
    // Synthesized columns: the split time column and the promoted short
    // cluster column.
    assert!(staging.schema.column("ts").is_some());
    let region = staging.schema.column("region").unwrap();
    assert_eq!(region.field_type, "STRING");
}

#[tokio::test]
async fn split_plan_routes_load_through_staging() {
    let warehouse = warehouse_with_template();
    let job = build_split_job(&warehouse).await;

    // Load lands in the staging table with the augmented schema.
    let load = job.load_request().unwrap();
    assert_eq!(load.destination_table.to_string(), "proj:temp.events_evt_1_split");
    assert!(load.schema.as_ref().unwrap().column("ts").is_some());

    // Phase one: staging → temp, no condition.
    let into_temp = &job.plan.on_success[0];
    let ActionRequest::Query(q) = &into_temp.request else {
        panic!("expected query");
    };
    assert_eq!(
        q.sql,
        "SELECT id, meta, ts, region FROM `proj.temp.events_evt_1_split`"
    );
    assert_eq!(
        q.destination_table.as_ref().unwrap().to_string(),
        "proj:temp.events_evt_1_temp"
    );

    // Mappings run in declared order with the dotted column rewritten.
    let first = &into_temp.on_success[0];
    let ActionRequest::Query(q1) = &first.request else {
        panic!("expected mapping query");
    };
    assert!(q1.sql.ends_with("WHERE region = 'us'"), "{}", q1.sql);
    assert_eq!(
        q1.destination_table.as_ref().unwrap().to_string(),
        "proj:ds.events_us"
    );

    let second = &first.on_success[0];
    let ActionRequest::Query(q2) = &second.request else {
        panic!("expected mapping query");
    };
    assert!(q2.sql.ends_with("WHERE region = 'eu'"), "{}", q2.sql);

    // Staging is dropped after the last mapping; the rule chain follows.
    let drop = &second.on_success[0];
    let ActionRequest::Drop(drop_request) = &drop.request else {
        panic!("expected drop");
    };
    assert_eq!(drop_request.table.to_string(), "proj:temp.events_evt_1_split");
    assert!(matches!(
        drop.on_success[0].request,
        ActionRequest::Delete(_)
    ));
}

#[tokio::test]
async fn split_without_template_schema_is_config_error() {
    let warehouse = MemWarehouse::new(); // template table absent
    let rules = parse_rules(SPLIT_RULE, wr_rules::Format::Yaml, "mem://config/rules/s.yaml").unwrap();
    let rule = Arc::new(rules.into_iter().next().unwrap());
    let mut process = Process::builder()
        .event_id("evt-1")
        .dest_table("proj:ds.events")
        .build();
    process.source = Source::new("mem://data/in/a.json", chrono::Utc::now());
    let err = Planner::new(Arc::new(Config::builder().build()))
        .build(rule, process, None, &warehouse)
        .await
        .unwrap_err();
    assert_eq!(err.kind, wr_core::ErrorKind::Config);
}
