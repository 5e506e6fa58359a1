//! [`AvailabilityService`] over the PIM verification endpoint.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use storekeeper_core::config::PimConfig;
use storekeeper_core::error::AvailabilityError;
use storekeeper_core::ports::AvailabilityService;
use storekeeper_core::types::{Availability, AvailabilityQuery};

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    items: &'a [AvailabilityQuery],
}

/// HTTP client for the PIM availability API.
pub struct PimClient {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl PimClient {
    pub fn new(client: reqwest::Client, config: &PimConfig) -> Self {
        let endpoint = &config.verify_endpoint;
        let path = if endpoint.starts_with('/') {
            endpoint.clone()
        } else {
            format!("/{endpoint}")
        };
        Self {
            client,
            url: format!("{}{path}", config.api_url.trim_end_matches('/')),
            token: config.token.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AvailabilityService for PimClient {
    async fn verify_chunk(
        &self,
        items: &[AvailabilityQuery],
    ) -> Result<Vec<Availability>, AvailabilityError> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", &self.token)
            .json(&VerifyRequest { items })
            .send()
            .await
            .map_err(|e| AvailabilityError::Request(e.to_string()))?;

        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(err) if status.is_success() => return Err(AvailabilityError::Decode(err.to_string())),
            Err(_) => {
                return Err(AvailabilityError::Http {
                    status: status.as_u16(),
                    body: "<unreadable body>".to_string(),
                })
            }
        };

        // Errors come back as an object carrying `message`, sometimes with 200.
        if let Some(message) = body.get("message").and_then(Value::as_str) {
            return Err(AvailabilityError::Service(message.to_string()));
        }
        if !status.is_success() {
            return Err(AvailabilityError::Http {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        serde_json::from_value(body).map_err(|e| AvailabilityError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://pim.example.com", "/verify", "https://pim.example.com/verify")]
    #[case("https://pim.example.com/", "verify", "https://pim.example.com/verify")]
    fn url_joins_base_and_endpoint(#[case] base: &str, #[case] endpoint: &str, #[case] want: &str) {
        let config = PimConfig {
            api_url: base.to_string(),
            token: "t".to_string(),
            verify_endpoint: endpoint.to_string(),
            chunk_limit: 50,
        };
        assert_eq!(PimClient::new(reqwest::Client::new(), &config).url(), want);
    }
}
