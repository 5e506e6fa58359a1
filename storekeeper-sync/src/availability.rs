//! Chunked availability verification with split-on-failure.

use storekeeper_core::ports::AvailabilityService;
use storekeeper_core::types::{Availability, AvailabilityQuery};

/// Availabilities returned by the service plus the SKUs it never answered for.
#[derive(Debug, Default)]
pub struct Verified {
    pub found: Vec<Availability>,
    pub dropped: Vec<String>,
}

/// Verify `items` in chunks of at most `limit`.
///
/// A failing chunk is split in half and each half retried, down to single
/// items; a single item that still fails is dropped. Result order follows
/// input order.
pub async fn verify_availability(
    service: &dyn AvailabilityService,
    items: &[AvailabilityQuery],
    limit: usize,
) -> Verified {
    let mut verified = Verified::default();
    let limit = limit.max(1);

    // Depth-first over sub-batches; chunks are pushed in reverse so the
    // first one is popped first.
    let mut stack: Vec<&[AvailabilityQuery]> = items.chunks(limit).rev().collect();

    while let Some(batch) = stack.pop() {
        match service.verify_chunk(batch).await {
            Ok(found) => verified.found.extend(found),
            Err(err) if batch.len() == 1 => {
                tracing::warn!(sku = %batch[0].variant_id, error = %err, "dropping unverifiable item");
                verified.dropped.push(batch[0].variant_id.clone());
            }
            Err(err) => {
                let half = (batch.len() / 2).max(1);
                tracing::warn!(size = batch.len(), half, error = %err, "availability chunk failed, splitting");
                stack.extend(batch.chunks(half).rev());
            }
        }
    }

    verified
}
