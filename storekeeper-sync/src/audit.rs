//! Audit rows: one per attempted change, one summary per attempt.
//!
//! [`RunLogger`] buffers entries for the current batch and writes them in
//! chunks of the backend's bulk limit. Write failures are reported through
//! `tracing` and never reach the caller.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use storekeeper_core::error::BackendError;
use storekeeper_core::ports::AuditBackend;
use storekeeper_core::types::{
    DeletedRecord, Fields, PublishKind, RecordRef, ResourceId, RunStatus, TriggerContext,
};

// ---------------------------------------------------------------------------
// Chunked bulk operations
// ---------------------------------------------------------------------------

/// Result of a chunked bulk call. Chunks that went through before a failing
/// one stay in `completed`; later chunks are not sent.
#[derive(Debug)]
pub struct BulkWrite<T> {
    pub completed: Vec<T>,
    pub error: Option<BackendError>,
}

impl<T> BulkWrite<T> {
    pub fn into_result(self) -> Result<Vec<T>, BackendError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.completed),
        }
    }
}

/// Create `records` in `table`, one backend call per `bulk_limit()` chunk.
pub async fn create_records(
    backend: &dyn AuditBackend,
    table: &str,
    records: &[Fields],
) -> BulkWrite<RecordRef> {
    let mut completed = Vec::with_capacity(records.len());
    for chunk in records.chunks(backend.bulk_limit().max(1)) {
        match backend.create_batch(table, chunk).await {
            Ok(created) => completed.extend(created),
            Err(err) => {
                return BulkWrite {
                    completed,
                    error: Some(err),
                }
            }
        }
    }
    BulkWrite {
        completed,
        error: None,
    }
}

/// Delete `ids` from `table`, one backend call per `bulk_limit()` chunk.
pub async fn delete_records(
    backend: &dyn AuditBackend,
    table: &str,
    ids: &[String],
) -> BulkWrite<DeletedRecord> {
    let mut completed = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(backend.bulk_limit().max(1)) {
        match backend.delete_batch(table, chunk).await {
            Ok(deleted) => completed.extend(deleted),
            Err(err) => {
                return BulkWrite {
                    completed,
                    error: Some(err),
                }
            }
        }
    }
    BulkWrite {
        completed,
        error: None,
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A link back to the admin page of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub text: String,
}

/// Columns specific to a collection publication change.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationRow {
    pub kind: PublishKind,
    pub collection_id: ResourceId,
    pub title: String,
    pub link: Link,
    pub obsolete: bool,
    pub products_count: u64,
    pub previous_publications: usize,
    pub new_publications: usize,
}

/// Columns specific to an inventory quantity change.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantityRow {
    pub product_id: ResourceId,
    pub product_title: String,
    pub variant_id: ResourceId,
    pub sku: String,
    pub variant_name: String,
    pub link: Link,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub delta: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryDetail {
    Publication(PublicationRow),
    Quantity(QuantityRow),
}

/// One audit row for one attempted change.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub date: DateTime<Utc>,
    pub status: RunStatus,
    pub detail: EntryDetail,
    pub message: Option<String>,
}

impl AuditEntry {
    pub fn success(detail: EntryDetail) -> Self {
        Self {
            date: Utc::now(),
            status: RunStatus::Success,
            detail,
            message: None,
        }
    }

    pub fn failed(detail: EntryDetail, message: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            status: RunStatus::Failed,
            detail,
            message: Some(message.into()),
        }
    }

    pub fn at(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    /// Backend row for this entry.
    pub fn to_fields(&self, backend: &dyn AuditBackend, trigger: &TriggerContext) -> Fields {
        let mut fields = Fields::new();
        fields.insert("Date".into(), json!(timestamp(&self.date)));
        fields.insert("Status".into(), json!(self.status.to_string()));

        match &self.detail {
            EntryDetail::Publication(row) => {
                fields.insert("Action".into(), json!(row.kind.to_string()));
                fields.insert("Collection ID".into(), numeric_or_raw(&row.collection_id));
                fields.insert("Collection Title".into(), json!(row.title));
                fields.insert(
                    "Collection URL".into(),
                    backend.hyperlink(&row.link.url, &row.link.text),
                );
                fields.insert("Obsolete".into(), json!(row.obsolete));
                fields.insert("Products Count".into(), json!(row.products_count));
                fields.insert("Previous Publications".into(), json!(row.previous_publications));
                fields.insert("New Publications".into(), json!(row.new_publications));
            }
            EntryDetail::Quantity(row) => {
                fields.insert("Product ID".into(), numeric_or_raw(&row.product_id));
                fields.insert("Product Title".into(), json!(row.product_title));
                fields.insert("Variant ID".into(), numeric_or_raw(&row.variant_id));
                fields.insert("Variant SKU".into(), json!(row.sku));
                fields.insert("Variant Name".into(), json!(row.variant_name));
                fields.insert(
                    "Variant URL".into(),
                    backend.hyperlink(&row.link.url, &row.link.text),
                );
                fields.insert("Previous Quantity".into(), json!(row.previous_quantity));
                fields.insert("New Quantity".into(), json!(row.new_quantity));
                fields.insert("Delta".into(), json!(row.delta));
            }
        }

        insert_trigger(&mut fields, backend, trigger);
        fields.insert(
            "Message".into(),
            json!(self.message.clone().unwrap_or_default()),
        );
        fields
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Per-attempt run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub action: String,
    pub status: RunStatus,
    pub message: String,
    pub errors: Option<String>,
    pub notes: Option<String>,
    pub attempt: u32,
    pub applied: usize,
    /// Detail rows written during this attempt.
    pub records: Vec<RecordRef>,
}

impl RunSummary {
    /// Backend row; `lookup` names the column linking the detail rows.
    pub fn to_fields(
        &self,
        backend: &dyn AuditBackend,
        trigger: &TriggerContext,
        lookup: Option<&str>,
    ) -> Fields {
        let mut fields = Fields::new();
        fields.insert("Date".into(), json!(timestamp(&Utc::now())));
        fields.insert("Status".into(), json!(self.status.to_string()));
        fields.insert("Action".into(), json!(self.action));
        insert_trigger(&mut fields, backend, trigger);
        fields.insert("Retry".into(), json!(self.attempt));
        fields.insert("Errors".into(), json!(self.errors.clone().unwrap_or_default()));
        fields.insert("Message".into(), json!(self.message));
        fields.insert("Notes".into(), json!(self.notes.clone().unwrap_or_default()));

        if let Some(column) = lookup {
            let ids: Vec<Value> = self.records.iter().map(|r| json!(r.id)).collect();
            fields.insert(column.to_owned(), Value::Array(ids));
        }
        fields
    }
}

// ---------------------------------------------------------------------------
// Run logger
// ---------------------------------------------------------------------------

/// Buffers detail entries and writes entries and summaries to the backend.
pub struct RunLogger<'a> {
    backend: &'a dyn AuditBackend,
    trigger: &'a TriggerContext,
    entries_table: Option<String>,
    runs_table: String,
    lookup: Option<&'static str>,
    buffer: Vec<AuditEntry>,
    written: Vec<RecordRef>,
}

impl<'a> RunLogger<'a> {
    pub fn new(
        backend: &'a dyn AuditBackend,
        trigger: &'a TriggerContext,
        runs_table: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            trigger,
            entries_table: None,
            runs_table: runs_table.into(),
            lookup: None,
            buffer: Vec::new(),
            written: Vec::new(),
        }
    }

    /// Detail table plus the summary column that links its rows.
    pub fn with_entries(mut self, table: impl Into<String>, lookup: &'static str) -> Self {
        self.entries_table = Some(table.into());
        self.lookup = Some(lookup);
        self
    }

    pub fn backend(&self) -> &dyn AuditBackend {
        self.backend
    }

    /// Queue an entry for the next [`RunLogger::flush`].
    pub fn log_entry(&mut self, entry: AuditEntry) {
        match entry.status {
            RunStatus::Failed => tracing::warn!(
                status = %entry.status,
                reason = entry.message.as_deref().unwrap_or_default(),
                "change failed"
            ),
            _ => tracing::debug!(status = %entry.status, "change recorded"),
        }
        self.buffer.push(entry);
    }

    pub fn pending(&self) -> &[AuditEntry] {
        &self.buffer
    }

    /// Write buffered entries. Returns the rows created by this call.
    pub async fn flush(&mut self) -> Vec<RecordRef> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let entries = std::mem::take(&mut self.buffer);
        let Some(table) = self.entries_table.as_deref() else {
            tracing::error!(count = entries.len(), "no entries table configured, dropping audit entries");
            return Vec::new();
        };

        let rows: Vec<Fields> = entries
            .iter()
            .map(|entry| entry.to_fields(self.backend, self.trigger))
            .collect();
        let BulkWrite { completed, error } = create_records(self.backend, table, &rows).await;
        match error {
            Some(err) => tracing::error!(
                backend = self.backend.name(),
                table,
                written = completed.len(),
                dropped = rows.len() - completed.len(),
                error = %err,
                "failed to write audit entries"
            ),
            None => tracing::debug!(backend = self.backend.name(), count = completed.len(), "wrote audit entries"),
        }
        self.written.extend(completed.iter().cloned());
        completed
    }

    /// Rows written since the last call; resets the per-attempt list.
    pub fn take_written(&mut self) -> Vec<RecordRef> {
        std::mem::take(&mut self.written)
    }

    /// Write a summary row for one attempt.
    pub async fn log_summary(&self, summary: &RunSummary) {
        let row = summary.to_fields(self.backend, self.trigger, self.lookup);
        if let Err(err) = self.backend.create_batch(&self.runs_table, &[row]).await {
            tracing::error!(
                backend = self.backend.name(),
                table = %self.runs_table,
                error = %err,
                "failed to write run summary"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn timestamp(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn numeric_or_raw(id: &ResourceId) -> Value {
    match id.numeric() {
        Some(n) => json!(n),
        None => json!(id.0),
    }
}

/// Every row carries the same trigger columns; absent values are written as
/// empty strings so positional backends keep their column alignment.
fn insert_trigger(fields: &mut Fields, backend: &dyn AuditBackend, trigger: &TriggerContext) {
    fields.insert("Source".into(), json!(trigger.source.to_string()));
    let event = trigger.event.map(|event| event.title()).unwrap_or_default();
    fields.insert("Event".into(), json!(event));
    let run = match (&trigger.run_url, &trigger.run_id) {
        (Some(url), Some(run_id)) => backend.hyperlink(url, run_id),
        _ => json!(""),
    };
    fields.insert("GitHub Run".into(), run);
}

#[cfg(test)]
mod tests {
    use super::*;
    use storekeeper_core::types::{RunSource, TriggerEvent};

    struct PlainBackend;

    #[async_trait::async_trait]
    impl AuditBackend for PlainBackend {
        fn name(&self) -> &'static str {
            "plain"
        }
        fn bulk_limit(&self) -> usize {
            10
        }
        async fn create_batch(&self, _: &str, _: &[Fields]) -> Result<Vec<RecordRef>, BackendError> {
            Ok(Vec::new())
        }
        async fn fetch_all_records(
            &self,
            _: &str,
            _: Option<&str>,
        ) -> Result<Vec<storekeeper_core::types::StoredRecord>, BackendError> {
            Ok(Vec::new())
        }
        async fn delete_batch(&self, _: &str, _: &[String]) -> Result<Vec<DeletedRecord>, BackendError> {
            Ok(Vec::new())
        }
    }

    fn trigger() -> TriggerContext {
        TriggerContext {
            event: Some(TriggerEvent::WorkflowDispatch),
            run_id: Some("42".into()),
            run_url: Some("https://github.com/acme/store/actions/runs/42".into()),
            source: RunSource::GitHubActions,
        }
    }

    #[test]
    fn quantity_entry_columns() {
        let entry = AuditEntry::success(EntryDetail::Quantity(QuantityRow {
            product_id: "gid://shopify/Product/5".into(),
            product_title: "Shirt".into(),
            variant_id: "gid://shopify/ProductVariant/7".into(),
            sku: "A1".into(),
            variant_name: "Blue".into(),
            link: Link {
                url: "https://admin.shopify.com/store/acme/products/5/variants/7".into(),
                text: "Blue".into(),
            },
            previous_quantity: 5,
            new_quantity: 0,
            delta: -5,
        }));
        let fields = entry.to_fields(&PlainBackend, &trigger());
        assert_eq!(fields["Product ID"], json!(5));
        assert_eq!(fields["Variant ID"], json!(7));
        assert_eq!(fields["Previous Quantity"], json!(5));
        assert_eq!(fields["New Quantity"], json!(0));
        assert_eq!(fields["Delta"], json!(-5));
        assert_eq!(fields["Event"], json!("Workflow Dispatch"));
        assert_eq!(fields["Source"], json!("GitHub Actions"));
        assert_eq!(
            fields["GitHub Run"],
            json!("https://github.com/acme/store/actions/runs/42")
        );
        assert_eq!(fields["Message"], json!(""));
    }

    #[test]
    fn summary_links_detail_rows_through_lookup_column() {
        let summary = RunSummary {
            action: "Sync Products Quantity".into(),
            status: RunStatus::Success,
            message: "Adjusted quantity of 1 product variant.".into(),
            errors: None,
            notes: None,
            attempt: 2,
            applied: 1,
            records: vec![RecordRef {
                id: "rec1".into(),
                url: None,
            }],
        };
        let fields = summary.to_fields(&PlainBackend, &TriggerContext::default(), Some("Product Quantity Operations"));
        assert_eq!(fields["Retry"], json!(2));
        assert_eq!(fields["Source"], json!("Local"));
        assert_eq!(fields["Product Quantity Operations"], json!(["rec1"]));
        assert_eq!(fields["Event"], json!(""));
        assert_eq!(fields["GitHub Run"], json!(""));
    }

    fn publication_entry(message: Option<&str>) -> AuditEntry {
        let detail = EntryDetail::Publication(PublicationRow {
            kind: PublishKind::Publish,
            collection_id: "gid://shopify/Collection/3".into(),
            title: "Summer".into(),
            link: Link {
                url: "https://admin.shopify.com/store/acme/collections/3".into(),
                text: "Summer".into(),
            },
            obsolete: false,
            products_count: 4,
            previous_publications: 1,
            new_publications: 2,
        });
        match message {
            Some(message) => AuditEntry::failed(detail, message),
            None => AuditEntry::success(detail),
        }
    }

    fn columns(fields: &Fields) -> Vec<&str> {
        fields.keys().map(String::as_str).collect()
    }

    #[test]
    fn entry_columns_do_not_depend_on_trigger_or_outcome() {
        let ci = publication_entry(None).to_fields(&PlainBackend, &trigger());
        let local = publication_entry(Some("Collection not found"))
            .to_fields(&PlainBackend, &TriggerContext::default());

        assert_eq!(columns(&ci), columns(&local));
        assert_eq!(local["Event"], json!(""));
        assert_eq!(local["Message"], json!("Collection not found"));
    }

    #[test]
    fn summary_columns_do_not_depend_on_trigger_or_records() {
        let mut summary = RunSummary {
            action: "Sync Collections Status".into(),
            status: RunStatus::Skipped,
            message: "No changes to synchronize.".into(),
            errors: None,
            notes: None,
            attempt: 1,
            applied: 0,
            records: Vec::new(),
        };
        let lookup = Some("Collection Status Operations");
        let local = summary.to_fields(&PlainBackend, &TriggerContext::default(), lookup);
        summary.records.push(RecordRef {
            id: "rec9".into(),
            url: None,
        });
        let ci = summary.to_fields(&PlainBackend, &trigger(), lookup);

        assert_eq!(columns(&ci), columns(&local));
        assert_eq!(local["Collection Status Operations"], json!([]));
    }
}
