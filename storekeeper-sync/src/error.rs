//! Error types for storekeeper-sync.

use thiserror::Error;

use storekeeper_core::error::{BackendError, PlatformError};
use storekeeper_core::types::ResourceKind;

/// All errors that can arise while fetching and reconciling.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the store platform.
    #[error("store platform error: {0}")]
    Platform(#[from] PlatformError),

    /// An error from the audit backend.
    #[error("audit backend error: {0}")]
    Backend(#[from] BackendError),

    /// A page kept failing at the same cursor.
    #[error("fetching {kind} failed {attempts} times at cursor {cursor:?}: {source}")]
    PageRetriesExhausted {
        kind: ResourceKind,
        cursor: Option<String>,
        attempts: u32,
        #[source]
        source: PlatformError,
    },

    /// A fetched node did not have the expected shape.
    #[error("could not decode {kind} node: {source}")]
    Decode {
        kind: ResourceKind,
        #[source]
        source: serde_json::Error,
    },
}

impl SyncError {
    /// True when the root cause is platform rate limiting.
    pub fn is_throttled(&self) -> bool {
        match self {
            SyncError::Platform(err) => err.is_throttled(),
            SyncError::PageRetriesExhausted { source, .. } => source.is_throttled(),
            _ => false,
        }
    }
}
