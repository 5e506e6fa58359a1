//! Process configuration.
//!
//! A [`Config`] is built exactly once at process start and passed by reference
//! to every component. Nothing below the CLI reads the environment.
//!
//! # Sources
//!
//! - `from_env()`: environment variables, after loading `.env` via `dotenvy`.
//! - `from_lookup(f)`: same keys, resolved through `f`; used in tests.
//! - `load_at(path)`: a YAML document with the same structure as [`Config`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{RunSource, TriggerContext, TriggerEvent};

pub const DEFAULT_API_VERSION: &str = "2024-04";
pub const DEFAULT_PAGE_SIZE: u32 = 250;
pub const DEFAULT_PIM_CHUNK_LIMIT: usize = 50;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RETENTION_DAYS: u32 = 10;
pub const DEFAULT_AIRTABLE_API_URL: &str = "https://api.airtable.com/v0";

// ---------------------------------------------------------------------------
// 1. Retry count
// ---------------------------------------------------------------------------

/// Number of attempts for one action, always within `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct RetryCount(u32);

impl RetryCount {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 10;

    pub fn new(attempts: u32) -> Result<Self, ConfigError> {
        if (Self::MIN..=Self::MAX).contains(&attempts) {
            Ok(Self(attempts))
        } else {
            Err(ConfigError::InvalidValue {
                key: "RETRIES".to_string(),
                value: attempts.to_string(),
                reason: format!("must be between {} and {}", Self::MIN, Self::MAX),
            })
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for RetryCount {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u32> for RetryCount {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RetryCount> for u32 {
    fn from(value: RetryCount) -> Self {
        value.0
    }
}

impl fmt::Display for RetryCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// 2. Unknown item policy
// ---------------------------------------------------------------------------

/// What to do with a per-item failure that carries no field errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownItemPolicy {
    /// Record a failed entry and continue with the next item.
    #[default]
    SkipItem,
    /// Record a failed entry and stop the batch.
    AbortBatch,
}

impl UnknownItemPolicy {
    pub const ALL: [UnknownItemPolicy; 2] = [UnknownItemPolicy::SkipItem, UnknownItemPolicy::AbortBatch];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnknownItemPolicy::SkipItem => "skip-item",
            UnknownItemPolicy::AbortBatch => "abort-batch",
        }
    }
}

impl fmt::Display for UnknownItemPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnknownItemPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == normalized)
            .ok_or_else(|| {
                let expected: Vec<_> = Self::ALL.iter().map(|p| p.as_str()).collect();
                format!("expected: {}", expected.join(", "))
            })
    }
}

// ---------------------------------------------------------------------------
// 3. Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopifyConfig {
    pub store_id: String,
    pub access_token: String,
    /// Metafield key whose value `"true"` marks a collection obsolete.
    pub collection_metafield: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Used when no primary location can be resolved.
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl ShopifyConfig {
    /// `admin.shopify.com/store/<store_id>`
    pub fn admin_domain(&self) -> String {
        format!("admin.shopify.com/store/{}", self.store_id)
    }

    /// `<store_id>.myshopify.com`
    pub fn store_domain(&self) -> String {
        format!("{}.myshopify.com", self.store_id)
    }

    pub fn graphql_url(&self) -> String {
        format!(
            "https://{}/admin/api/{}/graphql.json",
            self.store_domain(),
            self.api_version
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PimConfig {
    pub api_url: String,
    pub token: String,
    pub verify_endpoint: String,
    #[serde(default = "default_pim_chunk_limit")]
    pub chunk_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirtableConfig {
    pub api_key: String,
    pub base_id: String,
    pub collection_status_table: String,
    pub product_quantity_table: String,
    pub runs_table: String,
    #[serde(default = "default_airtable_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetsConfig {
    pub client_email: String,
    pub private_key: String,
    pub spreadsheet_id: String,
    #[serde(default = "default_collection_status_sheet")]
    pub collection_status_sheet: String,
    #[serde(default = "default_product_quantity_sheet")]
    pub product_quantity_sheet: String,
    #[serde(default = "default_runs_sheet")]
    pub runs_sheet: String,
}

/// Which audit backend receives log rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum AuditConfig {
    Airtable(AirtableConfig),
    Sheets(SheetsConfig),
}

/// Table (Airtable) or sheet (Sheets) names, independent of the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditTables {
    pub collection_status: String,
    pub product_quantity: String,
    pub runs: String,
}

impl AuditConfig {
    pub fn tables(&self) -> AuditTables {
        match self {
            AuditConfig::Airtable(c) => AuditTables {
                collection_status: c.collection_status_table.clone(),
                product_quantity: c.product_quantity_table.clone(),
                runs: c.runs_table.clone(),
            },
            AuditConfig::Sheets(c) => AuditTables {
                collection_status: c.collection_status_sheet.clone(),
                product_quantity: c.product_quantity_sheet.clone(),
                runs: c.runs_sheet.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub retries: RetryCount,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default)]
    pub unknown_item_policy: UnknownItemPolicy,
    /// Re-read variants right before adjusting quantities.
    #[serde(default = "default_stale_read_guard")]
    pub stale_read_guard: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retries: RetryCount::default(),
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            retention_days: DEFAULT_RETENTION_DAYS,
            unknown_item_policy: UnknownItemPolicy::default(),
            stale_read_guard: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiConfig {
    #[serde(default)]
    pub github_actions: bool,
    /// e.g. `https://github.com/acme/storekeeper`
    #[serde(default)]
    pub repository_url: Option<String>,
}

impl CiConfig {
    /// `<repository>/actions/runs/<run_id>`
    pub fn run_url(&self, run_id: &str) -> Option<String> {
        self.repository_url
            .as_ref()
            .map(|repo| format!("{}/actions/runs/{run_id}", repo.trim_end_matches('/')))
    }

    /// Trigger context stamped on audit rows for this invocation.
    pub fn trigger(&self, event: Option<TriggerEvent>, run_id: Option<String>) -> TriggerContext {
        let run_url = run_id.as_deref().and_then(|id| self.run_url(id));
        TriggerContext {
            event,
            run_id,
            run_url,
            source: if self.github_actions {
                RunSource::GitHubActions
            } else {
                RunSource::Local
            },
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub shopify: ShopifyConfig,
    pub pim: PimConfig,
    pub audit: AuditConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub ci: CiConfig,
}

// ---------------------------------------------------------------------------
// 4. Load
// ---------------------------------------------------------------------------

impl Config {
    /// Build from process environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let shopify = ShopifyConfig {
            store_id: vars.required("SHOPIFY_STORE_ID")?,
            access_token: vars.required("SHOPIFY_ACCESS_TOKEN")?,
            collection_metafield: vars.required("SHOPIFY_COLLECTION_METAFIELD")?,
            api_version: vars
                .optional("SHOPIFY_API_VERSION")
                .unwrap_or_else(default_api_version),
            location_id: vars.optional("SHOPIFY_LOCATION_ID"),
            page_size: vars.parsed("SHOPIFY_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
        };

        let pim = PimConfig {
            api_url: vars.required("PIM_API_URL")?,
            token: vars.required("PIM_TOKEN")?,
            verify_endpoint: vars.required("PIM_VERIFY_ENDPOINT")?,
            chunk_limit: vars.parsed("PIM_CHUNK_LIMIT", DEFAULT_PIM_CHUNK_LIMIT)?,
        };

        let backend = vars
            .optional("AUDIT_BACKEND")
            .unwrap_or_else(|| "airtable".to_string());
        let audit = match backend.to_ascii_lowercase().as_str() {
            "airtable" => AuditConfig::Airtable(AirtableConfig {
                api_key: vars.required("AIRTABLE_API_KEY")?,
                base_id: vars.required("AIRTABLE_BASE_ID")?,
                collection_status_table: vars.required("AIRTABLE_COLLECTION_STATUS_TABLE_ID")?,
                product_quantity_table: vars.required("AIRTABLE_PRODUCT_QUANTITY_TABLE_ID")?,
                runs_table: vars.required("AIRTABLE_RUNS_TABLE_ID")?,
                api_url: vars
                    .optional("AIRTABLE_API_URL")
                    .unwrap_or_else(default_airtable_api_url),
            }),
            "sheets" => AuditConfig::Sheets(SheetsConfig {
                client_email: vars.required("GOOGLE_SHEETS_CLIENT_EMAIL")?,
                // Keys pasted into CI secrets usually carry literal `\n`.
                private_key: vars
                    .required("GOOGLE_SHEETS_PRIVATE_KEY")?
                    .replace("\\n", "\n"),
                spreadsheet_id: vars.required("GOOGLE_SHEETS_SPREADSHEET_ID")?,
                collection_status_sheet: vars
                    .optional("GOOGLE_SHEETS_SYNC_COLLECTIONS_STATUS_SHEET_NAME")
                    .unwrap_or_else(default_collection_status_sheet),
                product_quantity_sheet: vars
                    .optional("GOOGLE_SHEETS_SYNC_PRODUCTS_QUANTITY_SHEET_NAME")
                    .unwrap_or_else(default_product_quantity_sheet),
                runs_sheet: vars
                    .optional("GOOGLE_SHEETS_RUNS_SHEET_NAME")
                    .unwrap_or_else(default_runs_sheet),
            }),
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "AUDIT_BACKEND".to_string(),
                    value: other.to_string(),
                    reason: "expected 'airtable' or 'sheets'".to_string(),
                })
            }
        };

        let engine = EngineConfig {
            retries: RetryCount::new(vars.parsed("RETRIES", 1u32)?)?,
            retry_delay_secs: vars.parsed("RETRY_DELAY_SECS", DEFAULT_RETRY_DELAY_SECS)?,
            http_timeout_secs: vars.parsed("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
            retention_days: vars.parsed("RETENTION_DAYS", DEFAULT_RETENTION_DAYS)?,
            unknown_item_policy: vars.parsed("UNKNOWN_ITEM_POLICY", UnknownItemPolicy::default())?,
            stale_read_guard: vars.parsed("STALE_READ_GUARD", true)?,
        };

        let ci = CiConfig {
            github_actions: vars.optional("GITHUB_ACTIONS").as_deref() == Some("true"),
            repository_url: vars.optional("GITHUB_REPOSITORY_URL").or_else(|| {
                let server = vars.optional("GITHUB_SERVER_URL")?;
                let repo = vars.optional("GITHUB_REPOSITORY")?;
                Some(format!("{server}/{repo}"))
            }),
        };

        Ok(Config {
            shopify,
            pim,
            audit,
            engine,
            ci,
        })
    }
}

/// Load a YAML config document from `path`.
///
/// Returns `ConfigError::Io` if the file cannot be read and
/// `ConfigError::Parse` (with path + line context) if malformed.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}
fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}
fn default_pim_chunk_limit() -> usize {
    DEFAULT_PIM_CHUNK_LIMIT
}
fn default_airtable_api_url() -> String {
    DEFAULT_AIRTABLE_API_URL.to_string()
}
fn default_collection_status_sheet() -> String {
    "Collection Status Operations".to_string()
}
fn default_product_quantity_sheet() -> String {
    "Product Quantity Operations".to_string()
}
fn default_runs_sheet() -> String {
    "Runs".to_string()
}
fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}
fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}
fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}
fn default_stale_read_guard() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use rstest::rstest;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SHOPIFY_STORE_ID", "acme"),
            ("SHOPIFY_ACCESS_TOKEN", "shpat_x"),
            ("SHOPIFY_COLLECTION_METAFIELD", "custom.obsolete"),
            ("PIM_API_URL", "https://pim.example.com"),
            ("PIM_TOKEN", "pim-token"),
            ("PIM_VERIFY_ENDPOINT", "/verify"),
            ("AIRTABLE_API_KEY", "key"),
            ("AIRTABLE_BASE_ID", "app123"),
            ("AIRTABLE_COLLECTION_STATUS_TABLE_ID", "tblCollections"),
            ("AIRTABLE_PRODUCT_QUANTITY_TABLE_ID", "tblQuantities"),
            ("AIRTABLE_RUNS_TABLE_ID", "tblRuns"),
        ])
    }

    fn build(env: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|k| env.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn trigger_links_the_ci_run() {
        let ci = CiConfig {
            github_actions: true,
            repository_url: Some("https://github.com/acme/shop/".into()),
        };
        let trigger = ci.trigger(Some(TriggerEvent::Schedule), Some("42".into()));
        assert_eq!(trigger.source, RunSource::GitHubActions);
        assert_eq!(
            trigger.run_url.as_deref(),
            Some("https://github.com/acme/shop/actions/runs/42")
        );

        let local = CiConfig::default().trigger(None, None);
        assert_eq!(local.source, RunSource::Local);
        assert!(local.run_url.is_none());
    }

    #[test]
    fn defaults_apply_when_optional_keys_absent() {
        let config = build(&base_env()).expect("config");
        assert_eq!(config.shopify.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.shopify.page_size, 250);
        assert_eq!(config.pim.chunk_limit, 50);
        assert_eq!(config.engine.retries.get(), 1);
        assert_eq!(config.engine.unknown_item_policy, UnknownItemPolicy::SkipItem);
        assert!(config.engine.stale_read_guard);
        assert!(!config.ci.github_actions);
        assert!(matches!(config.audit, AuditConfig::Airtable(_)));
        assert_eq!(config.audit.tables().runs, "tblRuns");
    }

    #[test]
    fn missing_required_key_is_reported_by_name() {
        let mut env = base_env();
        env.remove("SHOPIFY_ACCESS_TOKEN");
        let err = build(&env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref k) if k == "SHOPIFY_ACCESS_TOKEN"));
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let mut env = base_env();
        env.insert("PIM_TOKEN", "  ");
        assert!(matches!(build(&env), Err(ConfigError::MissingVar(_))));
    }

    #[rstest]
    #[case("0", false)]
    #[case("1", true)]
    #[case("10", true)]
    #[case("11", false)]
    #[case("three", false)]
    fn retries_are_bounded(#[case] raw: &'static str, #[case] ok: bool) {
        let mut env = base_env();
        env.insert("RETRIES", raw);
        assert_eq!(build(&env).is_ok(), ok, "RETRIES={raw}");
    }

    #[test]
    fn engine_policies_are_read_from_env() {
        let mut env = base_env();
        env.insert("UNKNOWN_ITEM_POLICY", "abort-batch");
        env.insert("STALE_READ_GUARD", "false");
        let config = build(&env).expect("config");
        assert_eq!(config.engine.unknown_item_policy, UnknownItemPolicy::AbortBatch);
        assert!(!config.engine.stale_read_guard);
    }

    #[rstest]
    #[case("UNKNOWN_ITEM_POLICY", "give-up")]
    #[case("STALE_READ_GUARD", "sometimes")]
    fn invalid_engine_policy_is_rejected(#[case] key: &'static str, #[case] raw: &'static str) {
        let mut env = base_env();
        env.insert(key, raw);
        assert!(matches!(
            build(&env),
            Err(ConfigError::InvalidValue { key: ref k, .. }) if k == key
        ));
    }

    #[test]
    fn sheets_backend_unescapes_private_key() {
        let mut env = base_env();
        env.insert("AUDIT_BACKEND", "sheets");
        env.insert("GOOGLE_SHEETS_CLIENT_EMAIL", "bot@example.iam.gserviceaccount.com");
        env.insert("GOOGLE_SHEETS_PRIVATE_KEY", "-----BEGIN-----\\nabc\\n-----END-----");
        env.insert("GOOGLE_SHEETS_SPREADSHEET_ID", "sheet-1");
        let config = build(&env).expect("config");
        let AuditConfig::Sheets(sheets) = config.audit else {
            panic!("expected sheets backend");
        };
        assert!(sheets.private_key.contains('\n'));
        assert_eq!(sheets.runs_sheet, "Runs");
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut env = base_env();
        env.insert("AUDIT_BACKEND", "postgres");
        assert!(matches!(build(&env), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn run_url_from_github_server_and_repository() {
        let mut env = base_env();
        env.insert("GITHUB_ACTIONS", "true");
        env.insert("GITHUB_SERVER_URL", "https://github.com");
        env.insert("GITHUB_REPOSITORY", "acme/storekeeper");
        let config = build(&env).expect("config");
        assert!(config.ci.github_actions);
        assert_eq!(
            config.ci.run_url("42").as_deref(),
            Some("https://github.com/acme/storekeeper/actions/runs/42")
        );
    }

    #[test]
    fn shopify_urls() {
        let config = build(&base_env()).expect("config");
        assert_eq!(config.shopify.admin_domain(), "admin.shopify.com/store/acme");
        assert_eq!(
            config.shopify.graphql_url(),
            "https://acme.myshopify.com/admin/api/2024-04/graphql.json"
        );
    }
}
