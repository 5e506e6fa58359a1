//! Collection publication sync: every non-obsolete collection is published
//! on the full channel set, obsolete collections are taken off all channels.

use async_trait::async_trait;

use storekeeper_core::ports::StorePlatform;
use storekeeper_core::types::{Collection, ResourceKind};

use crate::actions::Action;
use crate::apply::{apply_publications, PublicationReport};
use crate::audit::RunLogger;
use crate::diff::{plan_publications, PublicationPlan};
use crate::paginate::fetch_all;
use crate::pipeline::SyncSettings;
use crate::retry::{AttemptResult, Failure, FailureClass};

pub const TITLE: &str = "Sync Collections Status";

pub struct PublicationSync<'a> {
    platform: &'a dyn StorePlatform,
    settings: &'a SyncSettings,
}

impl<'a> PublicationSync<'a> {
    pub fn new(platform: &'a dyn StorePlatform, settings: &'a SyncSettings) -> Self {
        Self { platform, settings }
    }
}

#[async_trait]
impl<'a> Action for PublicationSync<'a> {
    fn name(&self) -> &'static str {
        TITLE
    }

    async fn attempt(&self, logger: &mut RunLogger<'_>, _attempt: u32) -> AttemptResult {
        let settings = self.settings;

        let fetched = match fetch_all::<Collection>(
            self.platform,
            ResourceKind::Collections,
            settings.page_size,
            settings.collections_page_policy,
        )
        .await
        {
            Ok(fetched) => fetched,
            Err(err) => return AttemptResult::Failed(Failure::fetch(&err, "collections")),
        };
        let collections = fetched.nodes;
        if collections.is_empty() {
            return AttemptResult::Failed(Failure::new(FailureClass::NoData, "No collections found."));
        }

        let plan = plan_publications(&collections, &settings.metafield_key);
        if plan.publications.is_empty() {
            return AttemptResult::Failed(Failure::new(FailureClass::NoData, "No publications found."));
        }
        if plan.is_empty() {
            return AttemptResult::Skipped {
                message: "No changes to synchronize.".into(),
            };
        }
        tracing::info!(
            collections = collections.len(),
            publications = plan.publications.len(),
            publish = plan.publish.len(),
            unpublish = plan.unpublish.len(),
            "publication plan computed"
        );

        let mut report = apply_publications(
            self.platform,
            &plan,
            &settings.admin_domain,
            settings.unknown_item_policy,
            logger,
        )
        .await;

        if let Some(failure) = report.aborted.take() {
            return AttemptResult::Failed(failure);
        }

        let message = summarize(&plan, &report);
        if report.failed > 0 {
            return AttemptResult::Failed(
                Failure::new(FailureClass::PartialFailure, message)
                    .with_errors(format!("{} collection(s) failed to update.", report.failed)),
            );
        }
        AttemptResult::Success {
            message,
            applied: report.succeeded(),
        }
    }
}

fn summarize(plan: &PublicationPlan, report: &PublicationReport) -> String {
    let mut parts = Vec::new();
    if !plan.publish.is_empty() {
        parts.push(format!(
            "Published {} out of {} collections.",
            report.published,
            plan.publish.len()
        ));
    }
    if !plan.unpublish.is_empty() {
        parts.push(format!(
            "Unpublished {} out of {} collections.",
            report.unpublished,
            plan.unpublish.len()
        ));
    }
    parts.join(" ")
}
