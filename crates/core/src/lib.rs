// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wr-core: Core data model for the Windrow (wr) ingestion pipeline

pub mod macros;

pub mod action;
pub mod clock;
pub mod config;
pub mod contract;
pub mod error;
pub mod id;
pub mod process;
pub mod table;
pub mod url;
pub mod window;

pub use action::{
    parse_job_id, Action, ActionKind, ActionMeta, ActionRequest, CopyRequest, DeleteRequest,
    DropRequest, ExportRequest, JobIdParts, JobRef, LoadRequest, NotifyRequest, QueryRequest,
    StepMode, WriteDisposition,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::Config;
pub use contract::{TriggerRequest, TriggerResponse, STATUS_ERROR, STATUS_NOT_FOUND, STATUS_OK};
pub use error::{ErrorKind, PipelineError};
pub use id::{short_hash, EventId};
pub use process::{Process, Source};
pub use table::{Clustering, FieldSchema, TableDef, TableRef, TableSchema, TimePartitioning};
pub use window::{BatchOutcome, Window};
