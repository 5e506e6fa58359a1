//! Bounded retry loop around whole action attempts.
//!
//! Every attempt re-runs fetch → diff → apply → log from scratch. What happens
//! after a failed attempt is decided by a [`RetryPolicy`] keyed on the
//! [`FailureClass`] the attempt reported:
//!
//! | Disposition              | Summary row              | Next step                   |
//! |--------------------------|--------------------------|-----------------------------|
//! | `Retry`                  | only on the last attempt | retry until exhausted       |
//! | `AbortAfterExhaustion`   | every attempt            | retry until exhausted       |
//! | `AbortNow`               | this attempt             | stop                        |

use std::fmt;
use std::time::Duration;

use storekeeper_core::config::RetryCount;
use storekeeper_core::types::RunStatus;

use crate::actions::Action;
use crate::audit::{RunLogger, RunSummary};
use crate::error::SyncError;

// ---------------------------------------------------------------------------
// Failures and policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// A fetch returned nothing to reconcile against.
    NoData,
    FetchFailed,
    /// Some changes were applied, others failed.
    PartialFailure,
    /// A per-item failure without structured field errors.
    UnknownItemError,
    Throttled,
    MutationFailed,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureClass::NoData => "no data",
            FailureClass::FetchFailed => "fetch failed",
            FailureClass::PartialFailure => "partial failure",
            FailureClass::UnknownItemError => "unknown item error",
            FailureClass::Throttled => "throttled",
            FailureClass::MutationFailed => "mutation failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retry,
    AbortNow,
    AbortAfterExhaustion,
}

/// Failure class → disposition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub no_data: Disposition,
    pub fetch_failed: Disposition,
    pub partial_failure: Disposition,
    pub unknown_item_error: Disposition,
    pub throttled: Disposition,
    pub mutation_failed: Disposition,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            no_data: Disposition::AbortAfterExhaustion,
            fetch_failed: Disposition::AbortAfterExhaustion,
            partial_failure: Disposition::AbortAfterExhaustion,
            unknown_item_error: Disposition::AbortAfterExhaustion,
            throttled: Disposition::Retry,
            mutation_failed: Disposition::AbortAfterExhaustion,
        }
    }
}

impl RetryPolicy {
    pub fn disposition(&self, class: FailureClass) -> Disposition {
        match class {
            FailureClass::NoData => self.no_data,
            FailureClass::FetchFailed => self.fetch_failed,
            FailureClass::PartialFailure => self.partial_failure,
            FailureClass::UnknownItemError => self.unknown_item_error,
            FailureClass::Throttled => self.throttled,
            FailureClass::MutationFailed => self.mutation_failed,
        }
    }

    /// Override the disposition of one class.
    pub fn with(mut self, class: FailureClass, disposition: Disposition) -> Self {
        let slot = match class {
            FailureClass::NoData => &mut self.no_data,
            FailureClass::FetchFailed => &mut self.fetch_failed,
            FailureClass::PartialFailure => &mut self.partial_failure,
            FailureClass::UnknownItemError => &mut self.unknown_item_error,
            FailureClass::Throttled => &mut self.throttled,
            FailureClass::MutationFailed => &mut self.mutation_failed,
        };
        *slot = disposition;
        self
    }
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub class: FailureClass,
    pub message: String,
    pub errors: Option<String>,
}

impl Failure {
    pub fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            errors: None,
        }
    }

    pub fn with_errors(mut self, errors: impl Into<String>) -> Self {
        self.errors = Some(errors.into());
        self
    }

    /// Classify a fetch error: throttling is its own class.
    pub fn fetch(err: &SyncError, what: &str) -> Self {
        let class = if err.is_throttled() {
            FailureClass::Throttled
        } else {
            FailureClass::FetchFailed
        };
        Self::new(class, format!("Failed to fetch {what}.")).with_errors(err.to_string())
    }
}

/// Result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Success { message: String, applied: usize },
    /// Nothing to change. Terminal and successful.
    Skipped { message: String },
    Failed(Failure),
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Success,
    ExhaustedFailure,
    Aborted,
}

impl Terminal {
    pub fn is_success(self) -> bool {
        matches!(self, Terminal::Success)
    }
}

/// Final state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub terminal: Terminal,
    pub attempts: u32,
    /// Status of the last summary row.
    pub status: RunStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub attempts: RetryCount,
    pub delay: Duration,
    pub policy: RetryPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: RetryCount::default(),
            delay: Duration::from_secs(2),
            policy: RetryPolicy::default(),
        }
    }
}

/// Run `action` until it succeeds, is aborted, or attempts are exhausted.
pub async fn run_with_retries<A: Action + ?Sized>(
    action: &A,
    logger: &mut RunLogger<'_>,
    settings: &RetrySettings,
) -> RunOutcome {
    let max = settings.attempts.get();
    let name = action.name();
    let mut attempt = 1;

    loop {
        tracing::info!(action = name, attempt, max, "starting attempt");
        let result = action.attempt(logger, attempt).await;

        // Anything the action left buffered still belongs to this attempt.
        logger.flush().await;
        let records = logger.take_written();
        let is_last = attempt == max;

        let failure = match result {
            AttemptResult::Success { message, applied } => {
                tracing::info!(action = name, attempt, applied, "{message}");
                let summary = summary(name, RunStatus::Success, &message, None, attempt, applied, records);
                logger.log_summary(&summary).await;
                return outcome(Terminal::Success, attempt, RunStatus::Success, message);
            }
            AttemptResult::Skipped { message } => {
                tracing::info!(action = name, attempt, "{message}");
                let summary = summary(name, RunStatus::Skipped, &message, None, attempt, 0, records);
                logger.log_summary(&summary).await;
                return outcome(Terminal::Success, attempt, RunStatus::Skipped, message);
            }
            AttemptResult::Failed(failure) => failure,
        };

        let disposition = settings.policy.disposition(failure.class);
        tracing::warn!(
            action = name,
            attempt,
            max,
            class = %failure.class,
            disposition = ?disposition,
            errors = failure.errors.as_deref().unwrap_or_default(),
            "{}",
            failure.message
        );

        let write_summary = match disposition {
            Disposition::Retry => is_last,
            Disposition::AbortNow | Disposition::AbortAfterExhaustion => true,
        };
        if write_summary {
            let summary = summary(
                name,
                RunStatus::Failed,
                &failure.message,
                failure.errors.clone(),
                attempt,
                0,
                records,
            );
            logger.log_summary(&summary).await;
        }

        if disposition == Disposition::AbortNow {
            tracing::error!(action = name, attempt, "aborting: {}", failure.message);
            return outcome(Terminal::Aborted, attempt, RunStatus::Failed, failure.message);
        }
        if is_last {
            tracing::error!(action = name, attempts = max, "retries exhausted: {}", failure.message);
            return outcome(Terminal::ExhaustedFailure, attempt, RunStatus::Failed, failure.message);
        }

        attempt += 1;
        if !settings.delay.is_zero() {
            tokio::time::sleep(settings.delay).await;
        }
    }
}

fn summary(
    action: &str,
    status: RunStatus,
    message: &str,
    errors: Option<String>,
    attempt: u32,
    applied: usize,
    records: Vec<storekeeper_core::types::RecordRef>,
) -> RunSummary {
    RunSummary {
        action: action.to_string(),
        status,
        message: message.to_string(),
        errors,
        notes: None,
        attempt,
        applied,
        records,
    }
}

fn outcome(terminal: Terminal, attempts: u32, status: RunStatus, message: String) -> RunOutcome {
    RunOutcome {
        terminal,
        attempts,
        status,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_retries_throttling_silently() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.disposition(FailureClass::Throttled), Disposition::Retry);
        assert_eq!(
            policy.disposition(FailureClass::NoData),
            Disposition::AbortAfterExhaustion
        );
    }

    #[test]
    fn with_overrides_a_single_class() {
        let policy = RetryPolicy::default().with(FailureClass::MutationFailed, Disposition::AbortNow);
        assert_eq!(policy.disposition(FailureClass::MutationFailed), Disposition::AbortNow);
        assert_eq!(
            policy.disposition(FailureClass::FetchFailed),
            Disposition::AbortAfterExhaustion
        );
    }

    #[test]
    fn throttled_fetch_errors_are_classified() {
        let err = SyncError::Platform(storekeeper_core::error::PlatformError::Throttled);
        assert_eq!(Failure::fetch(&err, "collections").class, FailureClass::Throttled);
        let err = SyncError::Platform(storekeeper_core::error::PlatformError::Request("dns".into()));
        let failure = Failure::fetch(&err, "collections");
        assert_eq!(failure.class, FailureClass::FetchFailed);
        assert_eq!(failure.message, "Failed to fetch collections.");
    }
}
