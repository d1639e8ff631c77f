// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const RULE_YAML: &str = r#"
when:
  prefix: "/in/"
  suffix: ".json"
dest:
  table: "proj:ds.t_$YYYY$MM$DD"
batch:
  window: 60s
  rollover: true
async: true
onSuccess:
  - action: delete
onFailure:
  - action: notify
    request:
      title: "load failed"
      message: "$DestTable"
"#;

#[test]
fn parses_single_yaml_rule() {
    let rules = parse_rules(RULE_YAML, Format::Yaml, "mem://config/rules/a.yaml").unwrap();
    assert_eq!(rules.len(), 1);
    let rule = &rules[0];
    assert_eq!(rule.url, "mem://config/rules/a.yaml");
    assert!(rule.is_async);
    assert!(rule.batch.as_ref().unwrap().rollover);
    assert_eq!(rule.batch.as_ref().unwrap().window.as_secs(), 60);
    assert_eq!(rule.on_success.len(), 1);
    assert_eq!(rule.on_failure.len(), 1);
}

#[test]
fn parses_rule_list() {
    let content = r#"
- when: { prefix: "/a/" }
  dest: { table: "ds.a" }
- when: { prefix: "/b/" }
  dest: { table: "ds.b" }
"#;
    let rules = parse_rules(content, Format::Yaml, "mem://config/rules/two.yaml").unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[1].dest.table, "ds.b");
}

#[test]
fn parses_json_rule() {
    let content = r#"{"when": {"suffix": ".json"}, "dest": {"table": "ds.t"}}"#;
    let rules = parse_rules(content, Format::Json, "mem://config/rules/a.json").unwrap();
    assert_eq!(rules[0].dest.table, "ds.t");
}

#[test]
fn rejects_empty_table() {
    let err = parse_rules(
        "when: { prefix: \"/in/\" }\ndest: { table: \"\" }",
        Format::Yaml,
        "mem://config/rules/bad.yaml",
    )
    .unwrap_err();
    assert!(matches!(err, ParseError::InvalidRule { .. }));
    assert!(err.to_string().contains("dest.table"));
}

#[test]
fn rejects_unknown_action() {
    let content = r#"
when: { prefix: "/in/" }
dest: { table: "ds.t" }
onSuccess:
  - action: teleport
"#;
    let err = parse_rules(content, Format::Yaml, "mem://config/rules/bad.yaml").unwrap_err();
    assert!(err.to_string().contains("teleport"));
}

#[test]
fn rejects_bad_pattern() {
    let content = "when: { pattern: \"(\" }\ndest: { table: \"ds.t\" }";
    let err = parse_rules(content, Format::Yaml, "mem://config/rules/bad.yaml").unwrap_err();
    assert!(err.to_string().contains("when.pattern"));
}

#[test]
fn rejects_empty_split_mapping() {
    let content = r#"
when: { prefix: "/in/" }
dest:
  table: "ds.t"
  schema:
    split:
      mapping: []
"#;
    let err = parse_rules(content, Format::Yaml, "mem://config/rules/bad.yaml").unwrap_err();
    assert!(err.to_string().contains("mapping"));
}

#[yare::parameterized(
    yaml = { "a.yaml", Some(Format::Yaml) },
    yml = { "a.yml", Some(Format::Yaml) },
    json = { "a.json", Some(Format::Json) },
    other = { "a.txt", None },
)]
fn file_format_detection(name: &str, expected: Option<Format>) {
    assert_eq!(format_for_name(name), expected);
}
