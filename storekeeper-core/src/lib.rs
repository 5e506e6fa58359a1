//! storekeeper core library: domain types, configuration, collaborator ports, errors.
//!
//! - [`types`]: ids, enums and the node/payload structs shared by every crate
//! - [`config`]: [`Config`], built once from the environment or a YAML file
//! - [`ports`]: the traits the reconciliation engine talks to
//! - [`error`]: one error enum per concern

pub mod config;
pub mod error;
pub mod ports;
pub mod types;

pub use config::{AuditConfig, AuditTables, Config, RetryCount};
pub use error::{AvailabilityError, BackendError, ConfigError, PlatformError};
pub use ports::{AuditBackend, AvailabilityService, StorePlatform};
pub use types::{
    Collection, Fields, PublishKind, ResourceId, ResourceKind, RunSource, RunStatus,
    TriggerContext, TriggerEvent, Variant,
};
