//! HTTP adapters implementing the `storekeeper-core` ports.
//!
//! - [`shopify`]: [`ShopifyClient`], Admin GraphQL API
//! - [`pim`]: [`PimClient`], availability verification
//! - [`airtable`]: [`AirtableClient`], audit rows over the REST API
//! - [`sheets`]: [`SheetsClient`], audit rows appended to a spreadsheet
//! - [`graphql`]: envelope decoding and connection flattening

pub mod airtable;
pub mod graphql;
pub mod pim;
pub mod sheets;
pub mod shopify;

use std::sync::Arc;
use std::time::Duration;

use storekeeper_core::{AuditBackend, AuditConfig};

pub use airtable::AirtableClient;
pub use pim::PimClient;
pub use sheets::SheetsClient;
pub use shopify::ShopifyClient;

/// Shared `reqwest` client with the configured request timeout.
pub fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|err| {
            tracing::warn!(error = %err, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Build the audit backend selected in configuration.
pub fn audit_backend(client: reqwest::Client, config: &AuditConfig) -> Arc<dyn AuditBackend> {
    match config {
        AuditConfig::Airtable(airtable) => Arc::new(AirtableClient::new(client, airtable)),
        AuditConfig::Sheets(sheets) => Arc::new(SheetsClient::new(client, sheets)),
    }
}
