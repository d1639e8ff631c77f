// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory object store for tests.
//!
//! Supports latency and failure injection so race-sensitive protocols
//! (window acquisition in particular) can be exercised deterministically.
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ObjectMeta, ObjectStore, PutMode, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use wr_core::{url, ErrorKind};

#[derive(Clone)]
struct Entry {
    data: Vec<u8>,
    mod_time: DateTime<Utc>,
}

/// One scripted failure, consumed by the next matching operation.
struct FailureRule {
    op: &'static str,
    url_contains: String,
    kind: ErrorKind,
}

#[derive(Default)]
struct MemState {
    objects: BTreeMap<String, Entry>,
    failures: Vec<FailureRule>,
    /// Extra delay applied to create-only puts (race windows in tests).
    create_latency: Option<Duration>,
    now_override: Option<DateTime<Utc>>,
}

/// Shared in-memory store.
#[derive(Clone, Default)]
pub struct MemStore {
    state: Arc<Mutex<MemState>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `op` touching a URL containing `url_contains`.
    pub fn fail_next(&self, op: &'static str, url_contains: impl Into<String>, kind: ErrorKind) {
        self.state.lock().failures.push(FailureRule {
            op,
            url_contains: url_contains.into(),
            kind,
        });
    }

    /// Delay every create-only put by `latency` (widens the acquire race).
    pub fn set_create_latency(&self, latency: Duration) {
        self.state.lock().create_latency = Some(latency);
    }

    /// Pin the modification time assigned to subsequent writes.
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.state.lock().now_override = Some(now);
    }

    /// Write an object directly with an explicit modification time.
    pub fn seed(&self, target: &str, data: impl Into<Vec<u8>>, mod_time: DateTime<Utc>) {
        self.state.lock().objects.insert(
            target.to_string(),
            Entry {
                data: data.into(),
                mod_time,
            },
        );
    }

    /// All stored URLs (assertions).
    pub fn urls(&self) -> Vec<String> {
        self.state.lock().objects.keys().cloned().collect()
    }

    pub fn contents(&self, target: &str) -> Option<Vec<u8>> {
        self.state.lock().objects.get(target).map(|e| e.data.clone())
    }

    fn check_failure(&self, op: &'static str, target: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if let Some(idx) = state
            .failures
            .iter()
            .position(|f| f.op == op && target.contains(&f.url_contains))
        {
            let rule = state.failures.remove(idx);
            return Err(StoreError::new(
                rule.kind,
                format!("injected {op} failure: {target}"),
            ));
        }
        Ok(())
    }

    fn now(&self) -> DateTime<Utc> {
        self.state.lock().now_override.unwrap_or_else(Utc::now)
    }

    fn meta_of(target: &str, entry: &Entry) -> ObjectMeta {
        let (_, name) = url::split(target);
        ObjectMeta {
            url: target.to_string(),
            name,
            size: entry.data.len() as u64,
            mod_time: entry.mod_time,
            is_dir: false,
        }
    }
}

#[async_trait]
impl ObjectStore for MemStore {
    async fn get(&self, target: &str) -> Result<Vec<u8>, StoreError> {
        self.check_failure("get", target)?;
        self.state
            .lock()
            .objects
            .get(target)
            .map(|e| e.data.clone())
            .ok_or_else(|| StoreError::not_found(target))
    }

    async fn put(&self, target: &str, data: Vec<u8>, mode: PutMode) -> Result<(), StoreError> {
        self.check_failure("put", target)?;
        if mode == PutMode::IfAbsent {
            let latency = self.state.lock().create_latency;
            if let Some(latency) = latency {
                // Check-then-write with an injected pause models the
                // storage backend race the conditional create must win.
                if self.state.lock().objects.contains_key(target) {
                    return Err(StoreError::precondition_failed(target));
                }
                tokio::time::sleep(latency).await;
            }
        }
        let now = self.now();
        let mut state = self.state.lock();
        if mode == PutMode::IfAbsent && state.objects.contains_key(target) {
            return Err(StoreError::precondition_failed(target));
        }
        state.objects.insert(
            target.to_string(),
            Entry {
                data,
                mod_time: now,
            },
        );
        Ok(())
    }

    async fn list(&self, target: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        self.check_failure("list", target)?;
        let prefix = format!("{}/", target.trim_end_matches('/'));
        let state = self.state.lock();
        let mut result = Vec::new();
        for (stored, entry) in state.objects.range(prefix.clone()..) {
            if !stored.starts_with(&prefix) {
                break;
            }
            // Immediate children only; deeper paths surface as directories.
            let rest = &stored[prefix.len()..];
            match rest.find('/') {
                None => result.push(Self::meta_of(stored, entry)),
                Some(idx) => {
                    let dir_url = format!("{}{}", prefix, &rest[..idx]);
                    if result.iter().all(|m: &ObjectMeta| m.url != dir_url) {
                        result.push(ObjectMeta {
                            url: dir_url.clone(),
                            name: rest[..idx].to_string(),
                            size: 0,
                            mod_time: entry.mod_time,
                            is_dir: true,
                        });
                    }
                }
            }
        }
        Ok(result)
    }

    async fn stat(&self, target: &str) -> Result<ObjectMeta, StoreError> {
        self.check_failure("stat", target)?;
        self.state
            .lock()
            .objects
            .get(target)
            .map(|e| Self::meta_of(target, e))
            .ok_or_else(|| StoreError::not_found(target))
    }

    async fn delete(&self, target: &str) -> Result<(), StoreError> {
        self.check_failure("delete", target)?;
        self.state
            .lock()
            .objects
            .remove(target)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(target))
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.check_failure("copy", from)?;
        let mut state = self.state.lock();
        let entry = state
            .objects
            .get(from)
            .cloned()
            .ok_or_else(|| StoreError::not_found(from))?;
        state.objects.insert(to.to_string(), entry);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        self.check_failure("rename", from)?;
        let mut state = self.state.lock();
        let entry = state
            .objects
            .remove(from)
            .ok_or_else(|| StoreError::not_found(from))?;
        state.objects.insert(to.to_string(), entry);
        Ok(())
    }
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
