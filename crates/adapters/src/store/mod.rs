// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Object-store abstraction.
//!
//! Every component coordinates exclusively through this interface; the
//! conditional create of [`PutMode::IfAbsent`] is the only serialization
//! primitive the pipeline relies on.

mod fs;
mod gateway;

pub use fs::LocalFsStore;
pub use gateway::{take_list_count, take_retry_counts, Gateway};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod mem;
#[cfg(any(test, feature = "test-support"))]
pub use mem::MemStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use wr_core::ErrorKind;

/// Classified store failure.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct StoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(url: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("object not found: {url}"))
    }

    pub fn precondition_failed(url: &str) -> Self {
        Self::new(
            ErrorKind::PreconditionFailed,
            format!("object already exists: {url}"),
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl From<StoreError> for wr_core::PipelineError {
    fn from(err: StoreError) -> Self {
        wr_core::PipelineError::new(err.kind, err.message)
    }
}

/// Write precondition for [`ObjectStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Unconditional write.
    Overwrite,
    /// Create-only: the store must fail with
    /// [`ErrorKind::PreconditionFailed`] when the target already exists.
    IfAbsent,
}

/// Metadata of one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub url: String,
    pub name: String,
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    pub is_dir: bool,
}

/// Uniform object-store operations.
#[async_trait]
pub trait ObjectStore: Clone + Send + Sync + 'static {
    async fn get(&self, url: &str) -> Result<Vec<u8>, StoreError>;

    async fn put(&self, url: &str, data: Vec<u8>, mode: PutMode) -> Result<(), StoreError>;

    /// List immediate children of a URL (files and directories).
    async fn list(&self, url: &str) -> Result<Vec<ObjectMeta>, StoreError>;

    async fn stat(&self, url: &str) -> Result<ObjectMeta, StoreError>;

    async fn delete(&self, url: &str) -> Result<(), StoreError>;

    async fn copy(&self, from: &str, to: &str) -> Result<(), StoreError>;

    /// Move an object; implemented as copy + delete where no rename exists.
    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError>;

    async fn exists(&self, url: &str) -> Result<bool, StoreError> {
        match self.stat(url).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
