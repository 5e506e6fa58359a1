//! Mutation applier: issues planned changes and records one audit entry per
//! change.
//!
//! Publications are mutated one collection at a time; a failing collection
//! does not stop its siblings unless the failure is unstructured and the
//! [`UnknownItemPolicy`] says to abort. Inventory corrections go out as one
//! combined request.

use std::collections::HashMap;

use storekeeper_core::error::PlatformError;
use storekeeper_core::ports::StorePlatform;
use storekeeper_core::types::{
    describe_user_errors, AdjustQuantitiesInput, AdjustedQuantity, PublishKind, PublishOutcome,
    QuantityChange, ResourceId,
};

use crate::audit::{AuditEntry, EntryDetail, Link, PublicationRow, QuantityRow, RunLogger};
use crate::diff::{InventoryIntent, PublicationIntent, PublicationPlan};
use crate::retry::{Failure, FailureClass};

pub use storekeeper_core::config::UnknownItemPolicy;

pub const ADJUST_REASON: &str = "correction";
pub const QUANTITY_NAME: &str = "available";

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

fn numeric_segment(id: &ResourceId) -> String {
    id.numeric()
        .map(|n| n.to_string())
        .unwrap_or_else(|| id.0.clone())
}

/// `https://<admin domain>/collections/<id>`
pub fn collection_url(admin_domain: &str, id: &ResourceId) -> String {
    format!("https://{admin_domain}/collections/{}", numeric_segment(id))
}

/// `https://<admin domain>/products/<product id>/variants/<variant id>`
pub fn variant_url(admin_domain: &str, product_id: &ResourceId, variant_id: &ResourceId) -> String {
    format!(
        "https://{admin_domain}/products/{}/variants/{}",
        numeric_segment(product_id),
        numeric_segment(variant_id)
    )
}

// ---------------------------------------------------------------------------
// Publications
// ---------------------------------------------------------------------------

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PublicationReport {
    pub published: usize,
    pub unpublished: usize,
    pub failed: usize,
    /// Set when the batch stopped before every intent was tried.
    pub aborted: Option<Failure>,
}

impl PublicationReport {
    pub fn succeeded(&self) -> usize {
        self.published + self.unpublished
    }
}

fn publication_row(
    intent: &PublicationIntent,
    publications: &[String],
    admin_domain: &str,
    title: &str,
) -> EntryDetail {
    let collection = &intent.collection;
    EntryDetail::Publication(PublicationRow {
        kind: intent.kind,
        collection_id: collection.id.clone(),
        title: title.to_string(),
        link: Link {
            url: collection_url(admin_domain, &collection.id),
            text: title.to_string(),
        },
        obsolete: intent.obsolete,
        products_count: collection.products_count.count,
        previous_publications: intent.previous_publications(),
        new_publications: match intent.kind {
            PublishKind::Publish => publications.len(),
            PublishKind::Unpublish => 0,
        },
    })
}

/// Publications sent for one intent. Unpublishing also withdraws the
/// collection from channels no live collection uses.
fn target_publications(intent: &PublicationIntent, publications: &[String]) -> Vec<String> {
    let mut targets = publications.to_vec();
    if intent.kind == PublishKind::Unpublish {
        for id in intent.collection.publication_ids() {
            if !targets.iter().any(|known| known == id) {
                targets.push(id.to_string());
            }
        }
    }
    targets
}

/// Apply every publication intent of `plan`, publishes first.
///
/// Entries are flushed after each kind's batch, and immediately when the
/// batch stops early.
pub async fn apply_publications(
    platform: &dyn StorePlatform,
    plan: &PublicationPlan,
    admin_domain: &str,
    policy: UnknownItemPolicy,
    logger: &mut RunLogger<'_>,
) -> PublicationReport {
    let mut report = PublicationReport::default();

    for batch in [&plan.publish, &plan.unpublish] {
        if batch.is_empty() {
            continue;
        }
        tracing::info!(kind = %batch[0].kind, count = batch.len(), "updating collections");

        for intent in batch {
            let collection = &intent.collection;
            let targets = target_publications(intent, &plan.publications);
            let result = platform
                .mutate_publications(&collection.id, intent.kind, &targets)
                .await;

            let unknown = match result {
                Ok(PublishOutcome {
                    collection: Some(updated),
                    ..
                }) => {
                    tracing::info!(kind = %intent.kind, id = %updated.id, title = %updated.title, "collection updated");
                    let title = if updated.title.is_empty() {
                        &collection.title
                    } else {
                        &updated.title
                    };
                    logger.log_entry(AuditEntry::success(publication_row(
                        intent,
                        &plan.publications,
                        admin_domain,
                        title,
                    )));
                    match intent.kind {
                        PublishKind::Publish => report.published += 1,
                        PublishKind::Unpublish => report.unpublished += 1,
                    }
                    continue;
                }
                Ok(outcome) => match describe_user_errors(&outcome.user_errors) {
                    Some(errors) => {
                        report.failed += 1;
                        logger.log_entry(AuditEntry::failed(
                            publication_row(intent, &plan.publications, admin_domain, &collection.title),
                            errors,
                        ));
                        continue;
                    }
                    None => "Unknown error".to_string(),
                },
                Err(PlatformError::Throttled) => {
                    logger.flush().await;
                    report.aborted = Some(Failure::new(
                        FailureClass::Throttled,
                        "Throttled while updating collections.",
                    ));
                    return report;
                }
                Err(err) => err.to_string(),
            };

            report.failed += 1;
            logger.log_entry(AuditEntry::failed(
                publication_row(intent, &plan.publications, admin_domain, &collection.title),
                unknown.clone(),
            ));

            if policy == UnknownItemPolicy::AbortBatch {
                logger.flush().await;
                report.aborted = Some(
                    Failure::new(
                        FailureClass::UnknownItemError,
                        format!("Unknown error while updating {}; batch aborted.", collection.title),
                    )
                    .with_errors(unknown),
                );
                return report;
            }
        }

        logger.flush().await;
    }

    report
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Default, PartialEq, Eq)]
pub struct InventoryReport {
    pub adjusted: usize,
    pub failed: usize,
    /// Set when the request itself failed.
    pub failure: Option<Failure>,
}

fn quantity_row(intent: &InventoryIntent, admin_domain: &str, delta: i64) -> EntryDetail {
    let variant = &intent.variant;
    let name = variant.short_name().to_string();
    EntryDetail::Quantity(QuantityRow {
        product_id: variant.product.id.clone(),
        product_title: variant.product.title.clone(),
        variant_id: variant.id.clone(),
        sku: variant.sku.clone().unwrap_or_default(),
        link: Link {
            url: variant_url(admin_domain, &variant.product.id, &variant.id),
            text: name.clone(),
        },
        variant_name: name,
        previous_quantity: intent.previous_quantity(),
        new_quantity: intent.new_quantity(),
        delta,
    })
}

/// Submit all intents in one adjustment and record one entry per intent.
///
/// Throttling produces no entries. Any other request error fails every
/// intent.
pub async fn apply_inventory(
    platform: &dyn StorePlatform,
    intents: &[InventoryIntent],
    location_id: &ResourceId,
    admin_domain: &str,
    logger: &mut RunLogger<'_>,
) -> InventoryReport {
    let mut report = InventoryReport::default();
    if intents.is_empty() {
        return report;
    }

    let input = AdjustQuantitiesInput {
        reason: ADJUST_REASON.to_string(),
        name: QUANTITY_NAME.to_string(),
        changes: intents
            .iter()
            .map(|intent| QuantityChange {
                delta: intent.delta,
                inventory_item_id: intent.inventory_item_id().clone(),
                location_id: location_id.clone(),
            })
            .collect(),
    };

    let group = match platform.adjust_quantities(&input).await {
        Ok(group) => group,
        Err(PlatformError::Throttled) => {
            report.failure = Some(Failure::new(
                FailureClass::Throttled,
                "Throttled while adjusting quantities.",
            ));
            return report;
        }
        Err(err) => {
            let message = err.to_string();
            for intent in intents {
                logger.log_entry(AuditEntry::failed(
                    quantity_row(intent, admin_domain, intent.delta),
                    message.clone(),
                ));
            }
            report.failed = intents.len();
            logger.flush().await;
            report.failure = Some(
                Failure::new(FailureClass::MutationFailed, "No data returned from Shopify.")
                    .with_errors(message),
            );
            return report;
        }
    };

    let reported: HashMap<&ResourceId, &AdjustedQuantity> = group
        .changes
        .iter()
        .filter(|change| change.name == QUANTITY_NAME)
        .map(|change| (&change.item.id, change))
        .collect();

    for intent in intents {
        match reported.get(intent.inventory_item_id()) {
            Some(change) => {
                tracing::info!(
                    sku = intent.variant.sku.as_deref().unwrap_or_default(),
                    from = intent.previous_quantity(),
                    to = intent.new_quantity(),
                    "quantity adjusted"
                );
                logger.log_entry(
                    AuditEntry::success(quantity_row(intent, admin_domain, change.delta))
                        .at(group.created_at),
                );
                report.adjusted += 1;
            }
            None => {
                logger.log_entry(
                    AuditEntry::failed(
                        quantity_row(intent, admin_domain, intent.delta),
                        "Change not reported by the platform.",
                    )
                    .at(group.created_at),
                );
                report.failed += 1;
            }
        }
    }

    logger.flush().await;
    report
}
