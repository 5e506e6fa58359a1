//! Action dispatcher: resolves an action name and runs it under the retry
//! loop. This is the single entrypoint used by the CLI.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use storekeeper_core::config::{AuditTables, Config, DEFAULT_PAGE_SIZE, DEFAULT_PIM_CHUNK_LIMIT, DEFAULT_RETENTION_DAYS};
use storekeeper_core::ports::{AuditBackend, AvailabilityService, StorePlatform};
use storekeeper_core::types::{ResourceId, TriggerContext};

use crate::actions::{inventory, publications, retention, InventorySync, PublicationSync, RetentionCleanup};
use crate::apply::UnknownItemPolicy;
use crate::audit::RunLogger;
use crate::paginate::PageErrorPolicy;
use crate::retry::{run_with_retries, RetryPolicy, RetrySettings, RunOutcome};

/// Consecutive failures tolerated at one cursor before a fetch gives up.
pub const PAGE_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Action names
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    SyncCollectionsStatus,
    SyncProductsQuantity,
    CleanAirtable,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [
        ActionKind::SyncCollectionsStatus,
        ActionKind::SyncProductsQuantity,
        ActionKind::CleanAirtable,
    ];

    /// Name accepted on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SyncCollectionsStatus => "sync-collections-status",
            ActionKind::SyncProductsQuantity => "sync-products-quantity",
            ActionKind::CleanAirtable => "clean-airtable",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ActionKind::SyncCollectionsStatus => publications::TITLE,
            ActionKind::SyncProductsQuantity => inventory::TITLE,
            ActionKind::CleanAirtable => retention::TITLE,
        }
    }

    /// Summary column linking the detail rows of one attempt.
    pub fn lookup_column(&self) -> Option<&'static str> {
        match self {
            ActionKind::SyncCollectionsStatus => Some("Collection Status Operations"),
            ActionKind::SyncProductsQuantity => Some("Product Quantity Operations"),
            ActionKind::CleanAirtable => None,
        }
    }

    /// Comma-separated list of every action name.
    pub fn available() -> String {
        Self::ALL
            .iter()
            .map(ActionKind::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown action `{}`; available actions: {}",
            self.0,
            ActionKind::available()
        )
    }
}

impl std::error::Error for UnknownAction {}

impl FromStr for ActionKind {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Settings and context
// ---------------------------------------------------------------------------

/// Engine knobs derived from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub metafield_key: String,
    /// Host and path prefix of admin links, e.g. `admin.shopify.com/store/acme`.
    pub admin_domain: String,
    pub page_size: u32,
    pub collections_page_policy: PageErrorPolicy,
    pub variants_page_policy: PageErrorPolicy,
    pub availability_chunk_limit: usize,
    pub unknown_item_policy: UnknownItemPolicy,
    /// Re-read variants right before adjusting quantities.
    pub stale_read_guard: bool,
    pub fallback_location: Option<ResourceId>,
    pub tables: AuditTables,
    pub retention_days: u32,
    pub retry: RetrySettings,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            metafield_key: String::new(),
            admin_domain: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            collections_page_policy: PageErrorPolicy::RetryCursor { max: PAGE_RETRIES },
            variants_page_policy: PageErrorPolicy::RetryCursor { max: PAGE_RETRIES },
            availability_chunk_limit: DEFAULT_PIM_CHUNK_LIMIT,
            unknown_item_policy: UnknownItemPolicy::default(),
            stale_read_guard: true,
            fallback_location: None,
            tables: AuditTables {
                collection_status: "Collection Status".into(),
                product_quantity: "Product Quantity".into(),
                runs: "Runs".into(),
            },
            retention_days: DEFAULT_RETENTION_DAYS,
            retry: RetrySettings::default(),
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            metafield_key: config.shopify.collection_metafield.clone(),
            admin_domain: config.shopify.admin_domain(),
            page_size: config.shopify.page_size,
            availability_chunk_limit: config.pim.chunk_limit,
            fallback_location: config.shopify.location_id.clone().map(ResourceId::from),
            tables: config.audit.tables(),
            retention_days: config.engine.retention_days,
            unknown_item_policy: config.engine.unknown_item_policy,
            stale_read_guard: config.engine.stale_read_guard,
            retry: RetrySettings {
                attempts: config.engine.retries,
                delay: Duration::from_secs(config.engine.retry_delay_secs),
                policy: RetryPolicy::default(),
            },
            ..Self::default()
        }
    }
}

/// Everything an action needs for one invocation.
pub struct ActionContext {
    pub platform: Arc<dyn StorePlatform>,
    pub availability: Arc<dyn AvailabilityService>,
    pub backend: Arc<dyn AuditBackend>,
    pub settings: SyncSettings,
    pub trigger: TriggerContext,
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

/// Run `kind` to a terminal state.
///
/// Always ends with a summary row for the last attempt; the outcome tells
/// the caller which exit code to use.
pub async fn run(kind: ActionKind, ctx: &ActionContext) -> RunOutcome {
    let settings = &ctx.settings;
    let tables = &settings.tables;
    let retry = &settings.retry;

    let mut logger = RunLogger::new(ctx.backend.as_ref(), &ctx.trigger, tables.runs.clone());
    tracing::info!(
        action = %kind,
        backend = ctx.backend.name(),
        retries = retry.attempts.get(),
        "running action"
    );

    match kind {
        ActionKind::SyncCollectionsStatus => {
            if let Some(lookup) = kind.lookup_column() {
                logger = logger.with_entries(tables.collection_status.clone(), lookup);
            }
            let action = PublicationSync::new(ctx.platform.as_ref(), settings);
            run_with_retries(&action, &mut logger, retry).await
        }
        ActionKind::SyncProductsQuantity => {
            if let Some(lookup) = kind.lookup_column() {
                logger = logger.with_entries(tables.product_quantity.clone(), lookup);
            }
            let action = InventorySync::new(
                ctx.platform.as_ref(),
                ctx.availability.as_ref(),
                settings,
            );
            run_with_retries(&action, &mut logger, retry).await
        }
        ActionKind::CleanAirtable => {
            let action = RetentionCleanup::new(
                ctx.backend.as_ref(),
                &tables.runs,
                settings.retention_days,
            );
            run_with_retries(&action, &mut logger, retry).await
        }
    }
}
