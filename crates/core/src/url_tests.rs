// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    mem = { "mem://bucket/a/b.json", "mem" },
    file = { "file:///var/data/x", "file" },
    bare = { "bucket/a", "" },
)]
fn scheme_of(url: &str, expected: &str) {
    assert_eq!(scheme(url), expected);
}

#[test]
fn bucket_of_url() {
    assert_eq!(bucket("mem://data/in/x.json"), "data");
    assert_eq!(bucket("mem://data"), "data");
    assert_eq!(bucket("no-scheme"), "");
}

#[test]
fn path_of_url() {
    assert_eq!(path("mem://data/in/x.json"), "in/x.json");
    assert_eq!(path("mem://data"), "");
    assert_eq!(path("file:///var/tmp/x"), "var/tmp/x");
}

#[test]
fn join_normalizes_slashes() {
    assert_eq!(join("mem://b/", &["a/", "/c"]), "mem://b/a/c");
    assert_eq!(join("mem://b", &["", "x.json"]), "mem://b/x.json");
}

#[test]
fn split_parent_and_name() {
    let (parent, name) = split("mem://b/a/x.json");
    assert_eq!(parent, "mem://b/a");
    assert_eq!(name, "x.json");
}

#[test]
fn split_at_bucket_root() {
    let (parent, name) = split("mem://b/x.json");
    assert_eq!(parent, "mem://b");
    assert_eq!(name, "x.json");
}

#[yare::parameterized(
    exact = { "mem://t/loadProcess/e.json", "loadProcess", true },
    nested = { "mem://t/postJob/a/b.json", "postJob", true },
    partial_segment = { "mem://t/loadProcessX/e.json", "loadProcess", false },
    elsewhere = { "mem://t/data/e.json", "loadProcess", false },
    empty_prefix = { "mem://t/data/e.json", "", false },
)]
fn prefix_routing(url: &str, prefix: &str, expected: bool) {
    assert_eq!(has_path_prefix(url, prefix), expected);
}
