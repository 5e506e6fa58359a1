//! Cursor pagination over a [`StorePlatform`] resource collection.
//!
//! [`fetch_all`] requests pages one after another, following the cursor of
//! the previous page until the platform reports no further page, and decodes
//! every flat node into `T`. An empty collection is a valid result.

use serde::de::DeserializeOwned;

use storekeeper_core::error::PlatformError;
use storekeeper_core::ports::StorePlatform;
use storekeeper_core::types::ResourceKind;

use crate::error::SyncError;

/// What to do when a single page request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageErrorPolicy {
    /// Fail the whole fetch on the first page error.
    #[default]
    Abort,
    /// Re-request the same cursor, at most `max` times in a row.
    RetryCursor { max: u32 },
}

/// Every node of a collection plus the page errors seen along the way.
#[derive(Debug)]
pub struct Fetched<T> {
    pub nodes: Vec<T>,
    pub errors: Vec<PlatformError>,
    pub pages: usize,
}

/// Fetch all pages of `kind`.
pub async fn fetch_all<T: DeserializeOwned>(
    platform: &dyn StorePlatform,
    kind: ResourceKind,
    page_size: u32,
    policy: PageErrorPolicy,
) -> Result<Fetched<T>, SyncError> {
    let mut fetched = Fetched {
        nodes: Vec::new(),
        errors: Vec::new(),
        pages: 0,
    };
    let mut cursor: Option<String> = None;
    let mut failures_at_cursor = 0u32;

    loop {
        let result = platform.fetch_page(kind, cursor.as_deref(), page_size).await;
        let page = match result {
            Ok(page) => page,
            Err(err) => match policy {
                PageErrorPolicy::Abort => return Err(SyncError::Platform(err)),
                PageErrorPolicy::RetryCursor { max } => {
                    failures_at_cursor += 1;
                    if failures_at_cursor > max {
                        return Err(SyncError::PageRetriesExhausted {
                            kind,
                            cursor,
                            attempts: failures_at_cursor,
                            source: err,
                        });
                    }
                    tracing::warn!(%kind, cursor = ?cursor, error = %err, "page request failed, retrying cursor");
                    fetched.errors.push(err);
                    continue;
                }
            },
        };
        failures_at_cursor = 0;
        fetched.pages += 1;

        for node in page.nodes {
            let node = serde_json::from_value(node).map_err(|source| SyncError::Decode { kind, source })?;
            fetched.nodes.push(node);
        }

        if !page.has_next_page {
            break;
        }
        match page.end_cursor {
            Some(next) => cursor = Some(next),
            None => {
                tracing::warn!(%kind, "platform reported another page without a cursor");
                break;
            }
        }
    }

    tracing::info!(%kind, count = fetched.nodes.len(), pages = fetched.pages, "fetched all");
    Ok(fetched)
}
