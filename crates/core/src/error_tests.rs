// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    rate_limited = { ErrorKind::RateLimited, true },
    backend = { ErrorKind::RetryableBackend, true },
    not_found = { ErrorKind::NotFound, false },
    precondition = { ErrorKind::PreconditionFailed, false },
    duplicate = { ErrorKind::DuplicateJob, false },
    permanent = { ErrorKind::PermanentLoad, false },
    config = { ErrorKind::Config, false },
    internal = { ErrorKind::Internal, false },
)]
fn retryable_kinds(kind: ErrorKind, expected: bool) {
    assert_eq!(kind.is_retryable(), expected);
}

#[test]
fn replayable_kinds() {
    assert!(ErrorKind::Internal.is_replayable());
    assert!(ErrorKind::RetryableBackend.is_replayable());
    assert!(!ErrorKind::PermanentLoad.is_replayable());
}

#[test]
fn error_display_includes_kind() {
    let err = PipelineError::not_found("mem://b/x.json");
    assert_eq!(err.to_string(), "notFound: mem://b/x.json");
}
