// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy for the ingestion pipeline.
//!
//! Every store and warehouse failure is mapped to one [`ErrorKind`]; the
//! policy table in the tail service keys off the kind alone, never off
//! message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified failure kinds the pipeline reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Target object or table does not exist.
    NotFound,
    /// Conditional create lost the race (target already exists).
    PreconditionFailed,
    /// Backend asked us to slow down.
    RateLimited,
    /// Transient backend failure; safe to redeliver.
    RetryableBackend,
    /// A job with the same deterministic id already exists.
    DuplicateJob,
    /// The load failed on the data itself (missing/corrupted/invalid-schema).
    PermanentLoad,
    /// Invalid rule or service configuration.
    Config,
    /// Unexpected internal failure.
    Internal,
}

impl ErrorKind {
    /// True when redelivering the trigger may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::RetryableBackend)
    }

    /// True when the whole process plan should be replayed from scratch.
    pub fn is_replayable(self) -> bool {
        matches!(self, ErrorKind::RetryableBackend | ErrorKind::Internal)
    }
}

crate::simple_display! {
    ErrorKind {
        NotFound => "notFound",
        PreconditionFailed => "preconditionFailed",
        RateLimited => "rateLimited",
        RetryableBackend => "retryableBackend",
        DuplicateJob => "duplicateJob",
        PermanentLoad => "permanentLoad",
        Config => "configError",
        Internal => "internal",
    }
}

/// A classified pipeline failure.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RetryableBackend, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
