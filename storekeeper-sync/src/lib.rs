//! # storekeeper-sync
//!
//! Reconciliation engine for the storekeeper actions.
//!
//! Call [`pipeline::run`] with an [`ActionKind`] and an [`ActionContext`] to
//! fetch, diff, apply and log one action under the bounded retry loop.

pub mod actions;
pub mod apply;
pub mod audit;
pub mod availability;
pub mod diff;
pub mod error;
pub mod paginate;
pub mod pipeline;
pub mod retry;

pub use apply::UnknownItemPolicy;
pub use audit::{AuditEntry, RunLogger, RunSummary};
pub use error::SyncError;
pub use paginate::{fetch_all, Fetched, PageErrorPolicy};
pub use pipeline::{run, ActionContext, ActionKind, SyncSettings, UnknownAction};
pub use retry::{Disposition, FailureClass, RetryPolicy, RetrySettings, RunOutcome, Terminal};
