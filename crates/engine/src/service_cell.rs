// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warm-start service cell.
//!
//! Holds one service instance across invocations of the same process.
//! Construction is lazy and explicit; `reset` tears the instance down so
//! tests and reconfiguration never depend on module-load side effects.

use parking_lot::Mutex;
use std::sync::Arc;

/// Lazily-initialized process-wide holder for a service instance.
pub struct ServiceCell<T> {
    inner: Mutex<Option<Arc<T>>>,
}

impl<T> ServiceCell<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Get the held instance, constructing it on first use.
    ///
    /// With `run_once` set the cell is bypassed entirely and a fresh
    /// instance is returned (and not retained).
    pub fn get_or_init(&self, run_once: bool, init: impl FnOnce() -> Arc<T>) -> Arc<T> {
        if run_once {
            return init();
        }
        let mut guard = self.inner.lock();
        if let Some(existing) = guard.as_ref() {
            return Arc::clone(existing);
        }
        let fresh = init();
        *guard = Some(Arc::clone(&fresh));
        fresh
    }

    /// Drop the held instance (next `get_or_init` reconstructs).
    pub fn reset(&self) {
        *self.inner.lock() = None;
    }

    /// True when an instance is currently held.
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl<T> Default for ServiceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "service_cell_tests.rs"]
mod tests;
