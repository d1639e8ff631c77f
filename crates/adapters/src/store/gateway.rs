// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retrying store gateway.
//!
//! Wraps any [`ObjectStore`] with bounded exponential backoff on transient
//! failures, cancellation, and process-global telemetry gauges (list-op and
//! retry counts are read-reset, reported once per trigger response).

use super::{ObjectMeta, ObjectStore, PutMode, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wr_core::ErrorKind;

const MAX_ATTEMPTS: u32 = 4;
const BASE_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

static LIST_OPS: AtomicU64 = AtomicU64::new(0);
static RETRY_COUNTS: Mutex<Option<HashMap<String, u64>>> = Mutex::new(None);

/// Drain the process-global list-operation gauge.
pub fn take_list_count() -> u64 {
    LIST_OPS.swap(0, Ordering::Relaxed)
}

/// Drain the process-global retry gauge (error kind → retry count).
pub fn take_retry_counts() -> HashMap<String, u64> {
    RETRY_COUNTS.lock().take().unwrap_or_default()
}

fn record_retry(kind: ErrorKind) {
    let mut guard = RETRY_COUNTS.lock();
    *guard
        .get_or_insert_with(HashMap::new)
        .entry(kind.to_string())
        .or_insert(0) += 1;
}

/// Store wrapper that retries transient failures.
#[derive(Clone)]
pub struct Gateway<S> {
    inner: S,
    cancel: CancellationToken,
}

impl<S: ObjectStore> Gateway<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cancel: CancellationToken::new(),
        }
    }

    /// Clone of this gateway bound to the invocation's cancellation token.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            inner: self.inner.clone(),
            cancel,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn run_with_retries<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let mut backoff = BASE_BACKOFF;
        let mut attempt = 1;
        loop {
            if self.cancel.is_cancelled() {
                return Err(StoreError::new(ErrorKind::Internal, "cancelled"));
            }
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.kind.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(op, attempt, error = %e, "retrying store operation");
                    record_retry(e.kind);
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.cancel.cancelled() => {
                            return Err(StoreError::new(ErrorKind::Internal, "cancelled"));
                        }
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for Gateway<S> {
    async fn get(&self, url: &str) -> Result<Vec<u8>, StoreError> {
        self.run_with_retries("get", || self.inner.get(url)).await
    }

    async fn put(&self, url: &str, data: Vec<u8>, mode: PutMode) -> Result<(), StoreError> {
        // Create-only puts are not retried on precondition failure: losing
        // the race is an outcome, not an error.
        self.run_with_retries("put", || self.inner.put(url, data.clone(), mode))
            .await
    }

    async fn list(&self, url: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        LIST_OPS.fetch_add(1, Ordering::Relaxed);
        self.run_with_retries("list", || self.inner.list(url)).await
    }

    async fn stat(&self, url: &str) -> Result<ObjectMeta, StoreError> {
        self.run_with_retries("stat", || self.inner.stat(url)).await
    }

    async fn delete(&self, url: &str) -> Result<(), StoreError> {
        self.run_with_retries("delete", || self.inner.delete(url))
            .await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.run_with_retries("copy", || self.inner.copy(from, to))
            .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.run_with_retries("rename", || self.inner.rename(from, to))
            .await
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
