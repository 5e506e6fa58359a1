//! The actions the dispatcher can run.
//!
//! An [`Action`] performs one complete attempt: fetch, diff, apply and log
//! detail entries. Retrying and summary rows belong to
//! [`crate::retry::run_with_retries`].

use async_trait::async_trait;

use crate::audit::RunLogger;
use crate::retry::AttemptResult;

pub mod inventory;
pub mod publications;
pub mod retention;

pub use inventory::InventorySync;
pub use publications::PublicationSync;
pub use retention::RetentionCleanup;

#[async_trait]
pub trait Action: Send + Sync {
    /// Title used in summary rows and log lines.
    fn name(&self) -> &'static str;

    /// Run one attempt from scratch. `attempt` starts at 1.
    async fn attempt(&self, logger: &mut RunLogger<'_>, attempt: u32) -> AttemptResult;
}
