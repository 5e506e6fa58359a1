//! Product quantity sync: lower on-hand quantities to what the PIM reports
//! as available.

use std::collections::HashSet;

use async_trait::async_trait;

use storekeeper_core::ports::{AvailabilityService, StorePlatform};
use storekeeper_core::types::{AvailabilityQuery, ResourceId, ResourceKind, Variant};

use crate::actions::Action;
use crate::apply::apply_inventory;
use crate::audit::RunLogger;
use crate::availability::verify_availability;
use crate::diff::{plan_inventory, retain_unchanged};
use crate::error::SyncError;
use crate::paginate::fetch_all;
use crate::pipeline::SyncSettings;
use crate::retry::{AttemptResult, Failure, FailureClass};

pub const TITLE: &str = "Sync Products Quantity";

pub struct InventorySync<'a> {
    platform: &'a dyn StorePlatform,
    availability: &'a dyn AvailabilityService,
    settings: &'a SyncSettings,
}

impl<'a> InventorySync<'a> {
    pub fn new(
        platform: &'a dyn StorePlatform,
        availability: &'a dyn AvailabilityService,
        settings: &'a SyncSettings,
    ) -> Self {
        Self {
            platform,
            availability,
            settings,
        }
    }

    /// Primary location, else the configured fallback.
    async fn location(&self) -> Result<Option<ResourceId>, Failure> {
        match self.platform.fetch_primary_location().await {
            Ok(Some(location)) => Ok(Some(location.id)),
            Ok(None) => Ok(self.settings.fallback_location.clone()),
            Err(err) if err.is_throttled() => Err(Failure::fetch(&SyncError::Platform(err), "locations")),
            Err(err) => {
                tracing::warn!(error = %err, "could not resolve primary location, using fallback");
                Ok(self.settings.fallback_location.clone())
            }
        }
    }
}

fn queries(variants: &[Variant]) -> Vec<AvailabilityQuery> {
    let mut seen = HashSet::new();
    variants
        .iter()
        .filter_map(|v| v.sku.as_deref())
        .filter(|sku| !sku.is_empty() && seen.insert(*sku))
        .map(AvailabilityQuery::new)
        .collect()
}

#[async_trait]
impl<'a> Action for InventorySync<'a> {
    fn name(&self) -> &'static str {
        TITLE
    }

    async fn attempt(&self, logger: &mut RunLogger<'_>, _attempt: u32) -> AttemptResult {
        let settings = self.settings;

        let location_id = match self.location().await {
            Ok(Some(id)) => id,
            Ok(None) => {
                return AttemptResult::Failed(Failure::new(
                    FailureClass::FetchFailed,
                    "No inventory location available.",
                ))
            }
            Err(failure) => return AttemptResult::Failed(failure),
        };

        let variants = match fetch_all::<Variant>(
            self.platform,
            ResourceKind::ProductVariants,
            settings.page_size,
            settings.variants_page_policy,
        )
        .await
        {
            Ok(fetched) => fetched.nodes,
            Err(err) => return AttemptResult::Failed(Failure::fetch(&err, "product variants")),
        };
        if variants.is_empty() {
            return AttemptResult::Failed(Failure::new(
                FailureClass::NoData,
                "No product variants found.",
            ));
        }

        let verified = verify_availability(
            self.availability,
            &queries(&variants),
            settings.availability_chunk_limit,
        )
        .await;
        if !verified.dropped.is_empty() {
            tracing::warn!(count = verified.dropped.len(), "some SKUs could not be verified");
        }

        let mut intents = plan_inventory(&variants, &verified.found);
        if intents.is_empty() {
            return AttemptResult::Skipped {
                message: "No changes to synchronize.".into(),
            };
        }

        if settings.stale_read_guard {
            let ids: Vec<ResourceId> = intents.iter().map(|i| i.variant.id.clone()).collect();
            let fresh = match self.platform.fetch_variants(&ids).await {
                Ok(fresh) => fresh,
                Err(err) => {
                    return AttemptResult::Failed(Failure::fetch(
                        &SyncError::Platform(err),
                        "product variants",
                    ))
                }
            };
            let planned = intents.len();
            intents = retain_unchanged(intents, &fresh);
            if intents.len() < planned {
                tracing::info!(dropped = planned - intents.len(), "dropped stale quantity changes");
            }
            if intents.is_empty() {
                return AttemptResult::Skipped {
                    message: "No changes to synchronize.".into(),
                };
            }
        }

        tracing::info!(variants = variants.len(), changes = intents.len(), "inventory plan computed");
        let report = apply_inventory(
            self.platform,
            &intents,
            &location_id,
            &settings.admin_domain,
            logger,
        )
        .await;

        if let Some(failure) = report.failure {
            return AttemptResult::Failed(failure);
        }

        let plural = if report.adjusted == 1 { "variant" } else { "variants" };
        let message = format!("Adjusted quantity of {} product {plural}.", report.adjusted);
        if report.failed > 0 {
            return AttemptResult::Failed(
                Failure::new(FailureClass::PartialFailure, message).with_errors(format!(
                    "{} change(s) not reported by the platform.",
                    report.failed
                )),
            );
        }
        AttemptResult::Success {
            message,
            applied: report.adjusted,
        }
    }
}
