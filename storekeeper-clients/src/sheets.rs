//! [`AuditBackend`] appending rows to a Google Sheets spreadsheet.
//!
//! Authentication uses a service account: an RS256-signed JWT is exchanged
//! for an access token at the OAuth token endpoint and cached until shortly
//! before it expires. Only `create_batch` is supported; the values API has no
//! notion of record ids to fetch or delete by.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use storekeeper_core::config::SheetsConfig;
use storekeeper_core::error::BackendError;
use storekeeper_core::ports::AuditBackend;
use storekeeper_core::types::{DeletedRecord, Fields, RecordRef, StoredRecord};

pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const SPREADSHEET_BASE_URL: &str = "https://docs.google.com/spreadsheets/d";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_RANGE: &str = "A1";
const SHEETS_BULK_LIMIT: usize = 100;
const TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    TOKEN_LIFETIME_SECS as u64
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_range: Option<String>,
    #[serde(default)]
    updated_rows: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    #[serde(default)]
    updates: AppendUpdates,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Sheets client bound to one spreadsheet.
pub struct SheetsClient {
    client: reqwest::Client,
    client_email: String,
    private_key: String,
    spreadsheet_id: String,
    token_url: String,
    api_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl SheetsClient {
    pub fn new(client: reqwest::Client, config: &SheetsConfig) -> Self {
        Self {
            client,
            client_email: config.client_email.clone(),
            private_key: config.private_key.clone(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            token_url: TOKEN_URL.to_string(),
            api_url: SHEETS_API_URL.to_string(),
            token: Mutex::new(None),
        }
    }

    /// Override the token and values endpoints.
    pub fn with_endpoints(mut self, token_url: String, api_url: String) -> Self {
        self.token_url = token_url;
        self.api_url = api_url;
        self
    }

    pub fn spreadsheet_url(&self) -> String {
        format!("{SPREADSHEET_BASE_URL}/{}", self.spreadsheet_id)
    }

    fn signed_assertion(&self) -> Result<String, BackendError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.client_email,
            scope: SCOPE,
            aud: &self.token_url,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| BackendError::Auth(format!("invalid private key: {e}")))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| BackendError::Auth(e.to_string()))
    }

    async fn access_token(&self) -> Result<String, BackendError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.signed_assertion()?;
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BackendError::Auth(format!("token exchange returned {status}: {body}")));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        // Refresh a minute early.
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

/// Sheets cells are scalars: arrays are joined, objects serialised.
pub fn cell(value: &Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        Value::Array(items) => Value::String(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => Value::String(value.to_string()),
        scalar => scalar.clone(),
    }
}

/// `=HYPERLINK("url", "text")`, or the bare URL when `text` is empty.
pub fn hyperlink_formula(url: &str, text: &str) -> String {
    if text.is_empty() {
        return url.to_string();
    }
    format!(
        "=HYPERLINK(\"{}\", \"{}\")",
        url.replace('"', "\"\""),
        text.replace('"', "\"\"")
    )
}

#[async_trait]
impl AuditBackend for SheetsClient {
    fn name(&self) -> &'static str {
        "sheets"
    }

    fn bulk_limit(&self) -> usize {
        SHEETS_BULK_LIMIT
    }

    fn hyperlink(&self, url: &str, text: &str) -> Value {
        Value::String(hyperlink_formula(url, text))
    }

    async fn create_batch(
        &self,
        table: &str,
        records: &[Fields],
    ) -> Result<Vec<RecordRef>, BackendError> {
        let range = format!("{table}!{DEFAULT_RANGE}");
        let values: Vec<Vec<Value>> = records
            .iter()
            .map(|fields| fields.values().map(cell).collect())
            .collect();

        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/{}/values/{range}:append",
                self.api_url, self.spreadsheet_id
            ))
            .bearer_auth(token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&json!({ "range": range, "values": values }))
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BackendError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let appended: AppendResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        tracing::debug!(
            sheet = table,
            rows = appended.updates.updated_rows.unwrap_or_default(),
            "appended rows"
        );
        let range = appended.updates.updated_range.unwrap_or(range);
        Ok(vec![RecordRef {
            id: range,
            url: Some(self.spreadsheet_url()),
        }])
    }

    async fn fetch_all_records(
        &self,
        _table: &str,
        _filter_formula: Option<&str>,
    ) -> Result<Vec<StoredRecord>, BackendError> {
        Err(BackendError::Unsupported {
            backend: "sheets",
            operation: "fetch_all_records",
        })
    }

    async fn delete_batch(
        &self,
        _table: &str,
        _ids: &[String],
    ) -> Result<Vec<DeletedRecord>, BackendError> {
        Err(BackendError::Unsupported {
            backend: "sheets",
            operation: "delete_batch",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyperlink_formula_quotes_arguments() {
        assert_eq!(
            hyperlink_formula("https://x/1", "Shirt"),
            "=HYPERLINK(\"https://x/1\", \"Shirt\")"
        );
        assert_eq!(hyperlink_formula("https://x/1", ""), "https://x/1");
        assert_eq!(
            hyperlink_formula("u", "say \"hi\""),
            "=HYPERLINK(\"u\", \"say \"\"hi\"\"\")"
        );
    }

    #[test]
    fn cells_are_scalars() {
        assert_eq!(cell(&json!(["a", "b"])), json!("a, b"));
        assert_eq!(cell(&Value::Null), json!(""));
        assert_eq!(cell(&json!(3)), json!(3));
        assert_eq!(cell(&json!(true)), json!(true));
    }

    #[test]
    fn invalid_private_key_is_an_auth_error() {
        let client = SheetsClient::new(
            reqwest::Client::new(),
            &SheetsConfig {
                client_email: "bot@example.com".into(),
                private_key: "not a pem".into(),
                spreadsheet_id: "sheet-1".into(),
                collection_status_sheet: "A".into(),
                product_quantity_sheet: "B".into(),
                runs_sheet: "Runs".into(),
            },
        );
        assert!(matches!(client.signed_assertion(), Err(BackendError::Auth(_))));
        assert_eq!(
            client.spreadsheet_url(),
            "https://docs.google.com/spreadsheets/d/sheet-1"
        );
    }
}
