//! In-memory collaborators for engine tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use storekeeper_core::config::RetryCount;
use storekeeper_core::error::{AvailabilityError, BackendError, PlatformError};
use storekeeper_core::ports::{AuditBackend, AvailabilityService, StorePlatform};
use storekeeper_core::types::{
    AdjustQuantitiesInput, AdjustedQuantity, AdjustmentGroup, Availability, AvailabilityQuery,
    DeletedRecord, Fields, InventoryItemRef, Location, Page, PublishKind, PublishOutcome,
    RecordRef, ResourceId, ResourceKind, StoredRecord, TriggerContext, UpdatedResource, Variant,
};
use storekeeper_sync::{ActionContext, RetrySettings, SyncSettings};

pub const METAFIELD: &str = "custom.obsolete";

// ---------------------------------------------------------------------------
// Node builders
// ---------------------------------------------------------------------------

pub fn collection(id: u32, obsolete: bool, channels: &[&str]) -> Value {
    json!({
        "id": format!("gid://shopify/Collection/{id}"),
        "title": format!("Collection {id}"),
        "metafields": [{ "key": METAFIELD, "value": obsolete.to_string() }],
        "resourcePublicationsV2": channels
            .iter()
            .map(|c| json!({ "isPublished": true, "publication": { "id": c } }))
            .collect::<Vec<_>>(),
        "productsCount": { "count": 4 },
    })
}

pub fn variant(id: u32, sku: &str, quantity: i64) -> Value {
    json!({
        "id": format!("gid://shopify/ProductVariant/{id}"),
        "sku": sku,
        "displayName": format!("Shirt - {sku}"),
        "inventoryQuantity": quantity,
        "inventoryItem": { "id": format!("gid://shopify/InventoryItem/{id}") },
        "product": { "id": "gid://shopify/Product/5", "title": "Shirt" },
    })
}

// ---------------------------------------------------------------------------
// Store platform
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MutationCall {
    pub collection_id: ResourceId,
    pub kind: PublishKind,
    pub publication_ids: Vec<String>,
}

#[derive(Default)]
pub struct FakePlatform {
    pub collections: Vec<Value>,
    pub variants: Vec<Value>,
    pub location: Option<Location>,
    /// Errors returned by upcoming page requests, before any node is served.
    pub page_errors: Mutex<VecDeque<PlatformError>>,
    /// Scripted mutation results; an empty queue echoes the collection.
    pub mutation_results: Mutex<VecDeque<Result<PublishOutcome, PlatformError>>>,
    /// Scripted adjustment result; `None` echoes every requested change.
    pub adjust_result: Mutex<Option<Result<AdjustmentGroup, PlatformError>>>,
    /// Variants served by the stale-read re-fetch; `None` reuses `variants`.
    pub fresh_variants: Mutex<Option<Vec<Variant>>>,
    pub page_requests: AtomicUsize,
    pub mutations: Mutex<Vec<MutationCall>>,
    pub adjustments: Mutex<Vec<AdjustQuantitiesInput>>,
}

impl FakePlatform {
    pub fn with_collections(collections: Vec<Value>) -> Self {
        Self {
            collections,
            ..Self::default()
        }
    }

    pub fn with_variants(variants: Vec<Value>) -> Self {
        Self {
            variants,
            location: Some(Location {
                id: "gid://shopify/Location/1".into(),
                is_active: true,
                ships_inventory: true,
            }),
            ..Self::default()
        }
    }

    pub fn fail_pages(&self, errors: impl IntoIterator<Item = PlatformError>) {
        self.page_errors.lock().unwrap().extend(errors);
    }

    pub fn script_mutations(
        &self,
        results: impl IntoIterator<Item = Result<PublishOutcome, PlatformError>>,
    ) {
        self.mutation_results.lock().unwrap().extend(results);
    }

    pub fn mutations(&self) -> Vec<MutationCall> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn adjustments(&self) -> Vec<AdjustQuantitiesInput> {
        self.adjustments.lock().unwrap().clone()
    }

    fn nodes(&self, kind: ResourceKind) -> &[Value] {
        match kind {
            ResourceKind::Collections => &self.collections,
            ResourceKind::ProductVariants => &self.variants,
        }
    }

    fn title_of(&self, id: &ResourceId) -> String {
        self.collections
            .iter()
            .find(|c| c["id"] == json!(id.0))
            .and_then(|c| c["title"].as_str())
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl StorePlatform for FakePlatform {
    async fn fetch_page(
        &self,
        kind: ResourceKind,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page<Value>, PlatformError> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.page_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        let nodes = self.nodes(kind);
        let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let end = (start + page_size as usize).min(nodes.len());
        let has_next_page = end < nodes.len();
        Ok(Page {
            nodes: nodes[start..end].to_vec(),
            end_cursor: has_next_page.then(|| end.to_string()),
            has_next_page,
        })
    }

    async fn mutate_publications(
        &self,
        collection_id: &ResourceId,
        kind: PublishKind,
        publication_ids: &[String],
    ) -> Result<PublishOutcome, PlatformError> {
        self.mutations.lock().unwrap().push(MutationCall {
            collection_id: collection_id.clone(),
            kind,
            publication_ids: publication_ids.to_vec(),
        });
        if let Some(result) = self.mutation_results.lock().unwrap().pop_front() {
            return result;
        }
        Ok(PublishOutcome {
            collection: Some(UpdatedResource {
                id: collection_id.clone(),
                title: self.title_of(collection_id),
            }),
            user_errors: Vec::new(),
        })
    }

    async fn adjust_quantities(
        &self,
        input: &AdjustQuantitiesInput,
    ) -> Result<AdjustmentGroup, PlatformError> {
        self.adjustments.lock().unwrap().push(input.clone());
        if let Some(result) = self.adjust_result.lock().unwrap().take() {
            return result;
        }
        Ok(AdjustmentGroup {
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            reason: input.reason.clone(),
            changes: input
                .changes
                .iter()
                .map(|change| AdjustedQuantity {
                    name: input.name.clone(),
                    delta: change.delta,
                    quantity_after_change: None,
                    item: InventoryItemRef {
                        id: change.inventory_item_id.clone(),
                    },
                })
                .collect(),
        })
    }

    async fn fetch_primary_location(&self) -> Result<Option<Location>, PlatformError> {
        Ok(self.location.clone())
    }

    async fn fetch_variants(&self, ids: &[ResourceId]) -> Result<Vec<Variant>, PlatformError> {
        if let Some(fresh) = self.fresh_variants.lock().unwrap().clone() {
            return Ok(fresh);
        }
        let wanted: HashSet<&ResourceId> = ids.iter().collect();
        Ok(self
            .variants
            .iter()
            .map(|v| serde_json::from_value::<Variant>(v.clone()).unwrap())
            .filter(|v| wanted.contains(&v.id))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Availability service
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeAvailability {
    pub quantities: HashMap<String, i64>,
    /// A chunk containing any of these SKUs fails.
    pub failing: HashSet<String>,
    pub chunks: Mutex<Vec<usize>>,
}

impl FakeAvailability {
    pub fn new(quantities: &[(&str, i64)]) -> Self {
        Self {
            quantities: quantities
                .iter()
                .map(|(sku, qty)| (sku.to_string(), *qty))
                .collect(),
            ..Self::default()
        }
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunks.lock().unwrap().clone()
    }
}

#[async_trait]
impl AvailabilityService for FakeAvailability {
    async fn verify_chunk(
        &self,
        items: &[AvailabilityQuery],
    ) -> Result<Vec<Availability>, AvailabilityError> {
        self.chunks.lock().unwrap().push(items.len());
        if items.iter().any(|i| self.failing.contains(&i.variant_id)) {
            return Err(AvailabilityError::Http {
                status: 500,
                body: "boom".into(),
            });
        }
        Ok(items
            .iter()
            .filter_map(|item| {
                self.quantities.get(&item.variant_id).map(|qty| Availability {
                    variant_id: item.variant_id.clone(),
                    actual_availability: *qty,
                    available: *qty > 0,
                    description: None,
                })
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Audit backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateCall {
    pub table: String,
    pub records: Vec<Fields>,
}

pub struct RecordingBackend {
    pub limit: usize,
    pub stored: Vec<StoredRecord>,
    /// Create calls that succeed before every later one fails.
    pub fail_creates_after: Option<usize>,
    pub creates: Mutex<Vec<CreateCall>>,
    pub fetch_formulas: Mutex<Vec<Option<String>>>,
    pub deletes: Mutex<Vec<Vec<String>>>,
    pub next_id: AtomicUsize,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self {
            limit: 10,
            stored: Vec::new(),
            fail_creates_after: None,
            creates: Mutex::new(Vec::new()),
            fetch_formulas: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        }
    }
}

impl RecordingBackend {
    pub fn with_stored(count: usize) -> Self {
        Self {
            stored: (1..=count)
                .map(|n| StoredRecord {
                    id: format!("recOld{n}"),
                    created_time: None,
                    fields: Fields::new(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn creates(&self) -> Vec<CreateCall> {
        self.creates.lock().unwrap().clone()
    }

    /// Every row written to `table`, across calls.
    pub fn rows(&self, table: &str) -> Vec<Fields> {
        self.creates()
            .into_iter()
            .filter(|c| c.table == table)
            .flat_map(|c| c.records)
            .collect()
    }

    pub fn deletes(&self) -> Vec<Vec<String>> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn bulk_limit(&self) -> usize {
        self.limit
    }

    async fn create_batch(&self, table: &str, records: &[Fields]) -> Result<Vec<RecordRef>, BackendError> {
        assert!(records.len() <= self.limit, "batch over the bulk limit");
        let made = self.creates.lock().unwrap().len();
        if self.fail_creates_after.is_some_and(|limit| made >= limit) {
            return Err(BackendError::Http {
                status: 422,
                body: "INVALID_REQUEST".into(),
            });
        }
        self.creates.lock().unwrap().push(CreateCall {
            table: table.to_string(),
            records: records.to_vec(),
        });
        Ok(records
            .iter()
            .map(|_| RecordRef {
                id: format!("rec{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
                url: None,
            })
            .collect())
    }

    async fn fetch_all_records(
        &self,
        _table: &str,
        filter_formula: Option<&str>,
    ) -> Result<Vec<StoredRecord>, BackendError> {
        self.fetch_formulas
            .lock()
            .unwrap()
            .push(filter_formula.map(str::to_owned));
        Ok(self.stored.clone())
    }

    async fn delete_batch(&self, _table: &str, ids: &[String]) -> Result<Vec<DeletedRecord>, BackendError> {
        assert!(ids.len() <= self.limit, "batch over the bulk limit");
        self.deletes.lock().unwrap().push(ids.to_vec());
        Ok(ids
            .iter()
            .map(|id| DeletedRecord {
                id: id.clone(),
                deleted: true,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

pub fn settings(retries: u32) -> SyncSettings {
    SyncSettings {
        metafield_key: METAFIELD.into(),
        admin_domain: "admin.shopify.com/store/acme".into(),
        retry: RetrySettings {
            attempts: RetryCount::new(retries).unwrap(),
            delay: Duration::ZERO,
            ..RetrySettings::default()
        },
        ..SyncSettings::default()
    }
}

pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub availability: Arc<FakeAvailability>,
    pub backend: Arc<RecordingBackend>,
}

impl Harness {
    pub fn new(platform: FakePlatform) -> Self {
        Self {
            platform: Arc::new(platform),
            availability: Arc::new(FakeAvailability::default()),
            backend: Arc::new(RecordingBackend::default()),
        }
    }

    pub fn availability(mut self, availability: FakeAvailability) -> Self {
        self.availability = Arc::new(availability);
        self
    }

    pub fn backend(mut self, backend: RecordingBackend) -> Self {
        self.backend = Arc::new(backend);
        self
    }

    pub fn context(&self, settings: SyncSettings) -> ActionContext {
        ActionContext {
            platform: self.platform.clone(),
            availability: self.availability.clone(),
            backend: self.backend.clone(),
            settings,
            trigger: TriggerContext::default(),
        }
    }

    /// Summary rows, oldest first.
    pub fn summaries(&self) -> Vec<Fields> {
        self.backend.rows("Runs")
    }
}
