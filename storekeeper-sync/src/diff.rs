//! Change computation: which collections to (un)publish, which inventory
//! quantities to correct.
//!
//! Both diffs are pure functions of their inputs; running them twice on the
//! same snapshot yields the same plan.

use std::collections::{HashMap, HashSet};

use storekeeper_core::types::{Availability, Collection, PublishKind, ResourceId, Variant};

// ---------------------------------------------------------------------------
// Publication diff
// ---------------------------------------------------------------------------

/// Collections to publish or unpublish against one global channel set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublicationPlan {
    /// Union of channels seen on non-obsolete collections, first-seen order.
    pub publications: Vec<String>,
    pub publish: Vec<PublicationIntent>,
    pub unpublish: Vec<PublicationIntent>,
}

impl PublicationPlan {
    pub fn is_empty(&self) -> bool {
        self.publish.is_empty() && self.unpublish.is_empty()
    }

    /// Intents in execution order: publishes first, then unpublishes.
    pub fn intents(&self) -> impl Iterator<Item = &PublicationIntent> {
        self.publish.iter().chain(self.unpublish.iter())
    }
}

/// One collection scheduled for a publication mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationIntent {
    pub kind: PublishKind,
    pub collection: Collection,
    pub obsolete: bool,
}

impl PublicationIntent {
    pub fn previous_publications(&self) -> usize {
        self.collection.publications.len()
    }
}

/// Channels the non-obsolete collections should all be published on.
pub fn desired_publications(collections: &[Collection], metafield_key: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    collections
        .iter()
        .filter(|c| !c.is_obsolete(metafield_key))
        .flat_map(Collection::publication_ids)
        .filter(|id| seen.insert(*id))
        .map(str::to_owned)
        .collect()
}

/// Partition collections into publish and unpublish sets.
///
/// - publish: not obsolete and on fewer channels than the desired set
/// - unpublish: obsolete and still on at least one channel
///
/// A collection id appears at most once across both sets.
pub fn plan_publications(collections: &[Collection], metafield_key: &str) -> PublicationPlan {
    let publications = desired_publications(collections, metafield_key);
    let mut seen: HashSet<&ResourceId> = HashSet::new();
    let mut plan = PublicationPlan {
        publications,
        ..PublicationPlan::default()
    };

    for collection in collections {
        if !seen.insert(&collection.id) {
            continue;
        }
        let obsolete = collection.is_obsolete(metafield_key);
        let current = collection.publications.len();

        let kind = if !obsolete && current < plan.publications.len() {
            PublishKind::Publish
        } else if obsolete && current > 0 {
            PublishKind::Unpublish
        } else {
            continue;
        };

        let intent = PublicationIntent {
            kind,
            collection: collection.clone(),
            obsolete,
        };
        match kind {
            PublishKind::Publish => plan.publish.push(intent),
            PublishKind::Unpublish => plan.unpublish.push(intent),
        }
    }

    plan
}

// ---------------------------------------------------------------------------
// Inventory diff
// ---------------------------------------------------------------------------

/// One variant whose on-hand quantity must be lowered to the reported value.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryIntent {
    pub variant: Variant,
    pub reported: i64,
    /// `reported - current`; never positive.
    pub delta: i64,
}

impl InventoryIntent {
    /// Current quantity, clamped for logging.
    pub fn previous_quantity(&self) -> i64 {
        self.variant.inventory_quantity.max(0)
    }

    /// Reported quantity, clamped for logging.
    pub fn new_quantity(&self) -> i64 {
        self.reported.max(0)
    }

    pub fn inventory_item_id(&self) -> &ResourceId {
        &self.variant.inventory_item.id
    }
}

/// Compute quantity corrections for variants the source of truth reports as
/// unavailable.
///
/// An intent is produced only when the current quantity differs from the
/// reported one, the current quantity is at least 1, the reported one is at
/// most 0, and no earlier intent targets the same inventory item.
pub fn plan_inventory(variants: &[Variant], availabilities: &[Availability]) -> Vec<InventoryIntent> {
    let mut reported: HashMap<&str, i64> = HashMap::new();
    for availability in availabilities {
        reported
            .entry(availability.variant_id.as_str())
            .or_insert(availability.actual_availability);
    }

    let mut targeted: HashSet<&ResourceId> = HashSet::new();
    let mut intents = Vec::new();

    for variant in variants {
        let Some(sku) = variant.sku.as_deref() else {
            continue;
        };
        let Some(&available) = reported.get(sku) else {
            continue;
        };
        let current = variant.inventory_quantity;

        if current == available || current < 1 || available > 0 {
            continue;
        }
        if !targeted.insert(&variant.inventory_item.id) {
            continue;
        }

        intents.push(InventoryIntent {
            variant: variant.clone(),
            reported: available,
            delta: available - current,
        });
    }

    intents
}

/// Drop intents whose variant quantity changed since the plan was computed.
///
/// `fresh` is a re-read of the targeted variants; intents whose variant is
/// missing from it are dropped too.
pub fn retain_unchanged(intents: Vec<InventoryIntent>, fresh: &[Variant]) -> Vec<InventoryIntent> {
    let current: HashMap<&ResourceId, i64> = fresh
        .iter()
        .map(|v| (&v.id, v.inventory_quantity))
        .collect();

    intents
        .into_iter()
        .filter(|intent| {
            let unchanged = current.get(&intent.variant.id) == Some(&intent.variant.inventory_quantity);
            if !unchanged {
                tracing::debug!(variant = %intent.variant.id, "quantity changed since fetch, dropping intent");
            }
            unchanged
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
