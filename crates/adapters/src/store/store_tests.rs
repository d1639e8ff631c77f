// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::mem::MemStore;

#[test]
fn store_error_helpers() {
    let err = StoreError::not_found("mem://b/x");
    assert!(err.is_not_found());
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = StoreError::precondition_failed("mem://b/x");
    assert_eq!(err.kind, ErrorKind::PreconditionFailed);
    assert!(!err.is_not_found());
}

#[test]
fn store_error_converts_to_pipeline_error() {
    let err: wr_core::PipelineError = StoreError::not_found("mem://b/x").into();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn exists_default_distinguishes_absent() {
    let store = MemStore::new();
    assert!(!store.exists("mem://b/x").await.unwrap());
    store.put("mem://b/x", b"data".to_vec(), PutMode::Overwrite).await.unwrap();
    assert!(store.exists("mem://b/x").await.unwrap());
}
