// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn at_nov_19() -> DateTime<Utc> {
    // 2019-11-19T19:33:00Z
    Utc.with_ymd_and_hms(2019, 11, 19, 19, 33, 0).single().unwrap()
}

#[test]
fn date_tokens_from_source_time() {
    let table = expand_table("proj:ds.logs_$YYYY$MM$DD", at_nov_19(), &[], &Default::default())
        .unwrap();
    assert_eq!(table, "proj:ds.logs_20191119");
}

#[test]
fn hour_token() {
    let table =
        expand_table("ds.t_$HH", at_nov_19(), &[], &Default::default()).unwrap();
    assert_eq!(table, "ds.t_19");
}

#[test]
fn positional_captures() {
    let captures = vec!["request".to_string(), "2019".to_string()];
    let table = expand_table("ds.xlog_$1_$2", at_nov_19(), &captures, &Default::default())
        .unwrap();
    assert_eq!(table, "ds.xlog_request_2019");
}

#[test]
fn named_params() {
    let mut params = std::collections::HashMap::new();
    params.insert("team".to_string(), "ads".to_string());
    let table = expand_table("ds.t_$team", at_nov_19(), &[], &params).unwrap();
    assert_eq!(table, "ds.t_ads");
}

#[test]
fn unresolved_placeholder_is_config_error() {
    let err = expand_table("ds.t_$missing", at_nov_19(), &[], &Default::default()).unwrap_err();
    assert_eq!(err.kind, wr_core::ErrorKind::Config);
    assert!(err.to_string().contains("$missing"));

    let err = expand_table("ds.t_$3", at_nov_19(), &[], &Default::default()).unwrap_err();
    assert!(err.to_string().contains("$3"));
}

#[test]
fn template_without_placeholders_is_unchanged() {
    let table = expand_table("proj:ds.static", at_nov_19(), &[], &Default::default()).unwrap();
    assert_eq!(table, "proj:ds.static");
}
