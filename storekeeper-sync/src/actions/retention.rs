//! Retention cleanup: delete run summaries older than the retention window.

use async_trait::async_trait;

use storekeeper_core::ports::AuditBackend;

use crate::actions::Action;
use crate::audit::{delete_records, RunLogger};
use crate::retry::{AttemptResult, Failure, FailureClass};

pub const TITLE: &str = "Clean Airtable";

/// Backend formula matching rows whose `Date` is older than `days`.
pub fn retention_formula(days: u32) -> String {
    format!("IS_BEFORE(Date, DATEADD(NOW(), -{days}, \"days\"))")
}

pub struct RetentionCleanup<'a> {
    backend: &'a dyn AuditBackend,
    table: &'a str,
    days: u32,
}

impl<'a> RetentionCleanup<'a> {
    pub fn new(backend: &'a dyn AuditBackend, table: &'a str, days: u32) -> Self {
        Self { backend, table, days }
    }
}

#[async_trait]
impl<'a> Action for RetentionCleanup<'a> {
    fn name(&self) -> &'static str {
        TITLE
    }

    async fn attempt(&self, _logger: &mut RunLogger<'_>, _attempt: u32) -> AttemptResult {
        let formula = retention_formula(self.days);
        let records = match self.backend.fetch_all_records(self.table, Some(&formula)).await {
            Ok(records) => records,
            Err(err) => {
                return AttemptResult::Failed(
                    Failure::new(FailureClass::FetchFailed, "Failed to fetch records.")
                        .with_errors(err.to_string()),
                )
            }
        };

        let ids: Vec<String> = records.into_iter().map(|r| r.id).collect();
        if ids.is_empty() {
            return AttemptResult::Skipped {
                message: "No records to delete.".into(),
            };
        }
        tracing::info!(table = self.table, count = ids.len(), days = self.days, "deleting expired records");

        let outcome = delete_records(self.backend, self.table, &ids).await;
        let count = outcome.completed.iter().filter(|r| r.deleted).count();
        match outcome.error {
            None => AttemptResult::Success {
                message: format!("Deleted {count} records."),
                applied: count,
            },
            Some(err) => AttemptResult::Failed(
                Failure::new(
                    FailureClass::MutationFailed,
                    format!("Failed to delete records after deleting {count}."),
                )
                .with_errors(err.to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_uses_day_window() {
        assert_eq!(
            retention_formula(10),
            "IS_BEFORE(Date, DATEADD(NOW(), -10, \"days\"))"
        );
    }
}
