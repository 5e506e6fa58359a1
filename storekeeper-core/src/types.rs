//! Domain types shared by the engine and the collaborator adapters.
//!
//! Node types mirror the store platform's wire shape *after* connection
//! unwrapping: every `edges { node { … } }` wrapper has already been flattened
//! into a plain list by the adapter. Nothing in here knows about GraphQL.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque global identifier of a store resource (e.g. `gid://shopify/Collection/42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Trailing numeric segment of the id, as shown in admin URLs.
    ///
    /// `gid://shopify/ProductVariant/123` → `Some(123)`.
    pub fn numeric(&self) -> Option<u64> {
        self.0.rsplit('/').next().and_then(|tail| tail.parse().ok())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Status written to every audit row and run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "Success"),
            RunStatus::Failed => write!(f, "Failed"),
            RunStatus::Skipped => write!(f, "Skipped"),
        }
    }
}

/// What triggered the current invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    LocalDispatch,
    RepositoryDispatch,
    Schedule,
    Test,
    WorkflowDispatch,
}

impl TriggerEvent {
    pub const ALL: [TriggerEvent; 5] = [
        TriggerEvent::LocalDispatch,
        TriggerEvent::RepositoryDispatch,
        TriggerEvent::Schedule,
        TriggerEvent::Test,
        TriggerEvent::WorkflowDispatch,
    ];

    /// Machine name, as accepted on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerEvent::LocalDispatch => "local_dispatch",
            TriggerEvent::RepositoryDispatch => "repository_dispatch",
            TriggerEvent::Schedule => "schedule",
            TriggerEvent::Test => "test",
            TriggerEvent::WorkflowDispatch => "workflow_dispatch",
        }
    }

    /// Human label used in audit rows, e.g. `Workflow Dispatch`.
    pub fn title(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        TriggerEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == normalized)
            .ok_or_else(|| {
                let expected: Vec<_> = TriggerEvent::ALL.iter().map(|e| e.as_str()).collect();
                format!("unknown event '{s}'; expected: {}", expected.join(", "))
            })
    }
}

/// Where the process is running; recorded in the `Source` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunSource {
    #[serde(rename = "GitHub Actions")]
    GitHubActions,
    #[default]
    Local,
}

impl fmt::Display for RunSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunSource::GitHubActions => write!(f, "GitHub Actions"),
            RunSource::Local => write!(f, "Local"),
        }
    }
}

/// Publication mutation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublishKind {
    Publish,
    Unpublish,
}

impl fmt::Display for PublishKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishKind::Publish => write!(f, "Publish"),
            PublishKind::Unpublish => write!(f, "Unpublish"),
        }
    }
}

/// Paginated resource collections the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Collections,
    ProductVariants,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Collections => write!(f, "collections"),
            ResourceKind::ProductVariants => write!(f, "productVariants"),
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger context
// ---------------------------------------------------------------------------

/// Originating context stamped on every audit row and summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerContext {
    pub event: Option<TriggerEvent>,
    pub run_id: Option<String>,
    /// Link to the CI run, when `run_id` and a repository URL are both known.
    pub run_url: Option<String>,
    pub source: RunSource,
}

// ---------------------------------------------------------------------------
// Resource nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metafield {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePublication {
    #[serde(default)]
    pub is_published: Option<bool>,
    pub publication: PublicationRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Count {
    pub count: u64,
}

/// A store collection with the fields the publication diff needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: ResourceId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub metafields: Vec<Metafield>,
    #[serde(default, rename = "resourcePublicationsV2")]
    pub publications: Vec<ResourcePublication>,
    #[serde(default)]
    pub products_count: Count,
}

impl Collection {
    /// True when the metafield `key` carries the sentinel value `"true"`.
    pub fn is_obsolete(&self, key: &str) -> bool {
        self.metafields
            .iter()
            .find(|m| m.key == key)
            .map(|m| m.value == "true")
            .unwrap_or(false)
    }

    pub fn publication_ids(&self) -> impl Iterator<Item = &str> {
        self.publications.iter().map(|p| p.publication.id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: ResourceId,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItemRef {
    pub id: ResourceId,
}

/// A product variant with its on-hand quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: ResourceId,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub inventory_quantity: i64,
    pub inventory_item: InventoryItemRef,
    pub product: ProductRef,
}

impl Variant {
    /// Display name without the `"<product title> - "` prefix.
    pub fn short_name(&self) -> &str {
        let prefix = format!("{} - ", self.product.title);
        self.display_name
            .strip_prefix(prefix.as_str())
            .unwrap_or(&self.display_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: ResourceId,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub ships_inventory: bool,
}

/// One page of a paginated collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub nodes: Vec<T>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

// ---------------------------------------------------------------------------
// Mutation payloads
// ---------------------------------------------------------------------------

/// A field-level validation error returned by a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserError {
    #[serde(default)]
    pub field: Vec<String>,
    pub message: String,
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field.join("."), self.message)
        }
    }
}

/// Join user errors one per line; `None` when there are none.
pub fn describe_user_errors(errors: &[UserError]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }
    Some(
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedResource {
    pub id: ResourceId,
    #[serde(default)]
    pub title: String,
}

/// Result of a publish/unpublish mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    #[serde(default)]
    pub collection: Option<UpdatedResource>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityChange {
    pub delta: i64,
    pub inventory_item_id: ResourceId,
    pub location_id: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustQuantitiesInput {
    pub reason: String,
    pub name: String,
    pub changes: Vec<QuantityChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustedQuantity {
    pub name: String,
    pub delta: i64,
    #[serde(default)]
    pub quantity_after_change: Option<i64>,
    pub item: InventoryItemRef,
}

/// Per-item change list returned by a batched quantity adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentGroup {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub changes: Vec<AdjustedQuantity>,
}

// ---------------------------------------------------------------------------
// Availability service payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityQuery {
    pub variant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_availability: Option<i64>,
}

impl AvailabilityQuery {
    pub fn new(sku: impl Into<String>) -> Self {
        Self {
            variant_id: sku.into(),
            requested_availability: None,
        }
    }
}

/// Availability reported by the external source of truth, keyed by SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub variant_id: String,
    pub actual_availability: i64,
    #[serde(default)]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Audit backend payloads
// ---------------------------------------------------------------------------

/// Column name → cell value, in insertion order.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Reference to a row created in the audit backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    /// Record id (Airtable) or appended range (Sheets).
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: String,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedRecord {
    pub id: String,
    pub deleted: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_id_from_gid() {
        assert_eq!(ResourceId::from("gid://shopify/Collection/42").numeric(), Some(42));
        assert_eq!(ResourceId::from("not-a-gid").numeric(), None);
    }

    #[test]
    fn trigger_event_title_and_parse() {
        assert_eq!(TriggerEvent::WorkflowDispatch.title(), "Workflow Dispatch");
        assert_eq!(TriggerEvent::Schedule.title(), "Schedule");
        assert_eq!(
            "repository-dispatch".parse::<TriggerEvent>(),
            Ok(TriggerEvent::RepositoryDispatch)
        );
        let err = "cron".parse::<TriggerEvent>().unwrap_err();
        assert!(err.contains("local_dispatch"));
    }

    #[test]
    fn collection_obsolete_flag_reads_sentinel() {
        let c: Collection = serde_json::from_value(json!({
            "id": "gid://shopify/Collection/1",
            "title": "Old",
            "metafields": [{"key": "custom.obsolete", "value": "true"}],
            "resourcePublicationsV2": [{"publication": {"id": "p1"}}],
            "productsCount": {"count": 4}
        }))
        .expect("decode");
        assert!(c.is_obsolete("custom.obsolete"));
        assert!(!c.is_obsolete("custom.other"));
        assert_eq!(c.publication_ids().collect::<Vec<_>>(), vec!["p1"]);
        assert_eq!(c.products_count.count, 4);
    }

    #[test]
    fn variant_short_name_strips_product_prefix() {
        let v: Variant = serde_json::from_value(json!({
            "id": "gid://shopify/ProductVariant/7",
            "sku": "A1",
            "displayName": "Shirt - Blue / M",
            "inventoryQuantity": 3,
            "inventoryItem": {"id": "gid://shopify/InventoryItem/9"},
            "product": {"id": "gid://shopify/Product/5", "title": "Shirt"}
        }))
        .expect("decode");
        assert_eq!(v.short_name(), "Blue / M");
    }

    #[test]
    fn user_errors_are_joined_per_line() {
        let errors = vec![
            UserError {
                field: vec!["input".into(), "id".into()],
                message: "is invalid".into(),
            },
            UserError {
                field: vec![],
                message: "boom".into(),
            },
        ];
        assert_eq!(
            describe_user_errors(&errors).as_deref(),
            Some("input.id: is invalid\nboom")
        );
        assert!(describe_user_errors(&[]).is_none());
    }
}
