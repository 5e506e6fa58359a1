//! [`AuditBackend`] over the Airtable REST API.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use storekeeper_core::config::AirtableConfig;
use storekeeper_core::error::BackendError;
use storekeeper_core::ports::AuditBackend;
use storekeeper_core::types::{DeletedRecord, Fields, RecordRef, StoredRecord};

/// Records accepted per create/delete call.
pub const AIRTABLE_BULK_LIMIT: usize = 10;

const WEB_URL: &str = "https://airtable.com";

#[derive(Debug, Serialize)]
struct NewRecord<'a> {
    fields: &'a Fields,
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    records: Vec<NewRecord<'a>>,
    typecast: bool,
}

#[derive(Debug, Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    records: Vec<StoredRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    records: Vec<DeletedRecord>,
}

/// Airtable client bound to one base.
pub struct AirtableClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    base_id: String,
}

impl AirtableClient {
    pub fn new(client: reqwest::Client, config: &AirtableConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            base_id: config.base_id.clone(),
        }
    }

    /// Web URL of a record: `https://airtable.com/<base>/<table>/<record>`.
    pub fn record_url(&self, table: &str, record_id: &str) -> String {
        format!("{WEB_URL}/{}/{table}/{record_id}", self.base_id)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}/{table}", self.api_url, self.base_id)
    }

    // ---- private helpers ----

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(match status.as_u16() {
                401 | 403 => BackendError::Auth(body),
                code => BackendError::Http { status: code, body },
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

fn request_err(err: reqwest::Error) -> BackendError {
    BackendError::Request(err.to_string())
}

#[async_trait]
impl AuditBackend for AirtableClient {
    fn name(&self) -> &'static str {
        "airtable"
    }

    fn bulk_limit(&self) -> usize {
        AIRTABLE_BULK_LIMIT
    }

    async fn create_batch(
        &self,
        table: &str,
        records: &[Fields],
    ) -> Result<Vec<RecordRef>, BackendError> {
        let body = CreateRequest {
            records: records.iter().map(|fields| NewRecord { fields }).collect(),
            typecast: true,
        };
        let response = self
            .client
            .post(self.table_url(table))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(request_err)?;

        let created: RecordsResponse = Self::parse_response(response).await?;
        Ok(created
            .records
            .into_iter()
            .map(|record| RecordRef {
                url: Some(self.record_url(table, &record.id)),
                id: record.id,
            })
            .collect())
    }

    async fn fetch_all_records(
        &self,
        table: &str,
        filter_formula: Option<&str>,
    ) -> Result<Vec<StoredRecord>, BackendError> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = Vec::new();
            if let Some(formula) = filter_formula {
                query.push(("filterByFormula", formula));
            }
            if let Some(offset) = offset.as_deref() {
                query.push(("offset", offset));
            }

            let response = self
                .client
                .get(self.table_url(table))
                .bearer_auth(&self.api_key)
                .query(&query)
                .send()
                .await
                .map_err(request_err)?;
            let page: RecordsResponse = Self::parse_response(response).await?;

            if page.records.is_empty() {
                break;
            }
            records.extend(page.records);
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        tracing::debug!(table, count = records.len(), "fetched airtable records");
        Ok(records)
    }

    async fn delete_batch(
        &self,
        table: &str,
        ids: &[String],
    ) -> Result<Vec<DeletedRecord>, BackendError> {
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("records[]", id.as_str())).collect();
        let response = self
            .client
            .delete(self.table_url(table))
            .bearer_auth(&self.api_key)
            .query(&query)
            .send()
            .await
            .map_err(request_err)?;

        let deleted: DeleteResponse = Self::parse_response(response).await?;
        Ok(deleted.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AirtableClient {
        AirtableClient::new(
            reqwest::Client::new(),
            &AirtableConfig {
                api_key: "key".into(),
                base_id: "app123".into(),
                collection_status_table: "tblA".into(),
                product_quantity_table: "tblB".into(),
                runs_table: "tblRuns".into(),
                api_url: "https://api.airtable.com/v0/".into(),
            },
        )
    }

    #[test]
    fn record_url_uses_web_host() {
        assert_eq!(
            client().record_url("tblRuns", "rec1"),
            "https://airtable.com/app123/tblRuns/rec1"
        );
    }

    #[test]
    fn table_url_trims_trailing_slash() {
        assert_eq!(
            client().table_url("tblRuns"),
            "https://api.airtable.com/v0/app123/tblRuns"
        );
    }
}
