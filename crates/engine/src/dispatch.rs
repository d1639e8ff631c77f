// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-job record reading.
//!
//! A dispatched action's completion trigger can race the visibility of the
//! record that was written for it: the object may briefly list as absent
//! or zero bytes. Reads retry a few times before classifying.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wr_adapters::{Gateway, ObjectStore};
use wr_core::{Action, PipelineError};

const READ_ATTEMPTS: u32 = 3;
const READ_PAUSE: Duration = Duration::from_millis(250);

/// Read and decode a dispatched action's post-job record.
///
/// After the retries: a still-absent record surfaces as not-found (the
/// caller treats that as redelivery aftermath), a still-empty one as
/// retryable.
pub(crate) async fn read_post_job_record<S: ObjectStore>(
    store: &Gateway<S>,
    record_url: &str,
    cancel: &CancellationToken,
) -> Result<Action, PipelineError> {
    let mut last: Option<PipelineError> = None;
    for attempt in 0..READ_ATTEMPTS {
        if attempt > 0 {
            tokio::select! {
                _ = tokio::time::sleep(READ_PAUSE) => {}
                _ = cancel.cancelled() => {
                    return Err(PipelineError::internal("cancelled"));
                }
            }
        }
        match store.get(record_url).await {
            Ok(data) if data.is_empty() => {
                last = Some(PipelineError::retryable(format!(
                    "post-job record not yet visible: {record_url}"
                )));
            }
            Ok(data) => {
                return serde_json::from_slice(&data).map_err(|e| {
                    PipelineError::internal(format!("invalid post-job record {record_url}: {e}"))
                });
            }
            Err(e) if e.is_not_found() => {
                last = Some(e.into());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(last.unwrap_or_else(|| {
        PipelineError::internal(format!("unreadable post-job record: {record_url}"))
    }))
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
