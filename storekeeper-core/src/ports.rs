//! Collaborator interfaces the reconciliation engine depends on.
//!
//! The engine never talks HTTP itself; `storekeeper-clients` provides the real
//! implementations and tests provide in-memory fakes.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{AvailabilityError, BackendError, PlatformError};
use crate::types::{
    AdjustQuantitiesInput, AdjustmentGroup, Availability, AvailabilityQuery, DeletedRecord,
    Fields, Location, Page, PublishKind, PublishOutcome, RecordRef, ResourceId, ResourceKind,
    StoredRecord, Variant,
};

/// Store platform (Shopify Admin API or a fake).
#[async_trait]
pub trait StorePlatform: Send + Sync {
    /// Fetch one page of `kind`. Nodes must already be flattened: nested
    /// connection wrappers are replaced by plain arrays.
    async fn fetch_page(
        &self,
        kind: ResourceKind,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page<Value>, PlatformError>;

    /// Publish or unpublish a collection on the given publication channels.
    async fn mutate_publications(
        &self,
        collection_id: &ResourceId,
        kind: PublishKind,
        publication_ids: &[String],
    ) -> Result<PublishOutcome, PlatformError>;

    /// Apply all quantity deltas in a single request.
    async fn adjust_quantities(
        &self,
        input: &AdjustQuantitiesInput,
    ) -> Result<AdjustmentGroup, PlatformError>;

    /// First active location that ships inventory, if any.
    async fn fetch_primary_location(&self) -> Result<Option<Location>, PlatformError>;

    /// Re-read specific variants by id.
    async fn fetch_variants(&self, ids: &[ResourceId]) -> Result<Vec<Variant>, PlatformError>;
}

/// External source of truth for per-SKU availability.
#[async_trait]
pub trait AvailabilityService: Send + Sync {
    /// Verify a single sub-batch. Chunking and split-on-failure live in the
    /// engine (`storekeeper_sync::availability`).
    async fn verify_chunk(
        &self,
        items: &[AvailabilityQuery],
    ) -> Result<Vec<Availability>, AvailabilityError>;
}

/// Spreadsheet/database backend receiving audit rows.
#[async_trait]
pub trait AuditBackend: Send + Sync {
    /// Short name used in log lines and errors.
    fn name(&self) -> &'static str;

    /// Maximum number of records accepted by one bulk call.
    fn bulk_limit(&self) -> usize;

    /// Cell value for a link to `url` labelled `text`. Plain URL by default.
    fn hyperlink(&self, url: &str, _text: &str) -> Value {
        Value::String(url.to_owned())
    }

    /// Create at most [`AuditBackend::bulk_limit`] records in `table`.
    async fn create_batch(
        &self,
        table: &str,
        records: &[Fields],
    ) -> Result<Vec<RecordRef>, BackendError>;

    /// Fetch every record of `table` matching `filter_formula` (all pages).
    async fn fetch_all_records(
        &self,
        table: &str,
        filter_formula: Option<&str>,
    ) -> Result<Vec<StoredRecord>, BackendError>;

    /// Delete at most [`AuditBackend::bulk_limit`] records from `table`.
    async fn delete_batch(
        &self,
        table: &str,
        ids: &[String],
    ) -> Result<Vec<DeletedRecord>, BackendError>;
}
