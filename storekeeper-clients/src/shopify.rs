//! [`StorePlatform`] over the Shopify Admin GraphQL API.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use storekeeper_core::config::ShopifyConfig;
use storekeeper_core::error::PlatformError;
use storekeeper_core::ports::StorePlatform;
use storekeeper_core::types::{
    describe_user_errors, AdjustQuantitiesInput, AdjustmentGroup, Location, Page, PublishKind,
    PublishOutcome, ResourceId, ResourceKind, UserError, Variant,
};

use crate::graphql::{self, GraphQlRequest};

/// Upper bound on nested connections (publications, locations).
pub const RESOURCES_LIMIT: u32 = 250;

const COLLECTIONS_QUERY: &str = r#"
query Collections($first: Int!, $after: String, $metafieldKeys: [String!]) {
  collections(first: $first, after: $after) {
    edges {
      node {
        id
        title
        metafields(first: 1, keys: $metafieldKeys) {
          edges { node { key value } }
        }
        resourcePublicationsV2(first: 250) {
          edges { node { isPublished publication { id } } }
        }
        productsCount { count }
      }
    }
    pageInfo { endCursor hasNextPage }
  }
}
"#;

const VARIANT_FIELDS: &str = r#"
  id
  sku
  displayName
  inventoryQuantity
  inventoryItem { id }
  product { id title }
"#;

const LOCATIONS_QUERY: &str = r#"
query Locations($first: Int!) {
  locations(first: $first) {
    edges { node { id isActive shipsInventory } }
  }
}
"#;

const ADJUST_QUANTITIES_MUTATION: &str = r#"
mutation inventoryAdjustQuantities($input: InventoryAdjustQuantitiesInput!) {
  inventoryAdjustQuantities(input: $input) {
    inventoryAdjustmentGroup {
      createdAt
      reason
      changes { name delta quantityAfterChange item { id } }
    }
    userErrors { field message }
  }
}
"#;

fn variants_query() -> String {
    format!(
        r#"
query ProductVariants($first: Int!, $after: String) {{
  productVariants(first: $first, after: $after, query: "published_status:published") {{
    edges {{ node {{ {VARIANT_FIELDS} }} }}
    pageInfo {{ endCursor hasNextPage }}
  }}
}}
"#
    )
}

fn variants_by_id_query() -> String {
    format!(
        r#"
query VariantsById($ids: [ID!]!) {{
  nodes(ids: $ids) {{
    ... on ProductVariant {{ {VARIANT_FIELDS} }}
  }}
}}
"#
    )
}

fn publish_mutation(kind: PublishKind) -> String {
    format!(
        r#"
mutation collection{kind}($input: Collection{kind}Input!) {{
  collection{kind}(input: $input) {{
    collection {{ id title }}
    userErrors {{ field message }}
  }}
}}
"#
    )
}

/// Admin API client for a single store.
pub struct ShopifyClient {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
    metafield_key: String,
}

impl ShopifyClient {
    pub fn new(client: reqwest::Client, config: &ShopifyConfig) -> Self {
        Self::with_endpoint(
            client,
            config.graphql_url(),
            config.access_token.clone(),
            config.collection_metafield.clone(),
        )
    }

    /// Point the client at an arbitrary GraphQL endpoint.
    pub fn with_endpoint(
        client: reqwest::Client,
        endpoint: String,
        access_token: String,
        metafield_key: String,
    ) -> Self {
        Self {
            client,
            endpoint,
            access_token,
            metafield_key,
        }
    }

    /// Post one operation and return its `data` member.
    pub async fn execute(&self, query: &str, variables: Value) -> Result<Value, PlatformError> {
        let body = GraphQlRequest { query, variables };
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Shopify-Access-Token", &self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PlatformError::Throttled);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PlatformError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))?;
        graphql::into_data(envelope)
    }

    // ---- private helpers ----

    async fn execute_field<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        field: &str,
    ) -> Result<T, PlatformError> {
        let mut data = self.execute(query, variables).await?;
        let value = data
            .get_mut(field)
            .map(Value::take)
            .ok_or_else(|| PlatformError::Decode(format!("missing field '{field}'")))?;
        serde_json::from_value(value).map_err(|e| PlatformError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustPayload {
    #[serde(default)]
    inventory_adjustment_group: Option<AdjustmentGroup>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[async_trait]
impl StorePlatform for ShopifyClient {
    async fn fetch_page(
        &self,
        kind: ResourceKind,
        cursor: Option<&str>,
        page_size: u32,
    ) -> Result<Page<Value>, PlatformError> {
        let (query, variables, root) = match kind {
            ResourceKind::Collections => (
                COLLECTIONS_QUERY.to_string(),
                json!({
                    "first": page_size,
                    "after": cursor,
                    "metafieldKeys": [self.metafield_key],
                }),
                "collections",
            ),
            ResourceKind::ProductVariants => (
                variants_query(),
                json!({ "first": page_size, "after": cursor }),
                "productVariants",
            ),
        };

        let mut data = self.execute(&query, variables).await?;
        let connection = data
            .get_mut(root)
            .map(Value::take)
            .ok_or_else(|| PlatformError::Decode(format!("missing field '{root}'")))?;
        let page = graphql::split_connection(connection)?;
        tracing::debug!(%kind, nodes = page.nodes.len(), has_next = page.has_next_page, "fetched page");
        Ok(page)
    }

    async fn mutate_publications(
        &self,
        collection_id: &ResourceId,
        kind: PublishKind,
        publication_ids: &[String],
    ) -> Result<PublishOutcome, PlatformError> {
        let publications: Vec<Value> = publication_ids
            .iter()
            .map(|id| json!({ "publicationId": id }))
            .collect();
        let variables = json!({
            "input": { "id": collection_id, "collectionPublications": publications }
        });
        self.execute_field(
            &publish_mutation(kind),
            variables,
            &format!("collection{kind}"),
        )
        .await
    }

    async fn adjust_quantities(
        &self,
        input: &AdjustQuantitiesInput,
    ) -> Result<AdjustmentGroup, PlatformError> {
        let variables = json!({ "input": input });
        let payload: AdjustPayload = self
            .execute_field(ADJUST_QUANTITIES_MUTATION, variables, "inventoryAdjustQuantities")
            .await?;

        match payload.inventory_adjustment_group {
            Some(group) => Ok(group),
            None => Err(PlatformError::GraphQl(vec![describe_user_errors(
                &payload.user_errors,
            )
            .unwrap_or_else(|| "no adjustment group returned".to_string())])),
        }
    }

    async fn fetch_primary_location(&self) -> Result<Option<Location>, PlatformError> {
        let data = self
            .execute(LOCATIONS_QUERY, json!({ "first": RESOURCES_LIMIT }))
            .await?;
        let locations = match graphql::unwrap_connections(data) {
            Value::Object(mut map) => map.remove("locations").unwrap_or(Value::Null),
            _ => Value::Null,
        };
        let locations: Vec<Location> = serde_json::from_value(locations)
            .map_err(|e| PlatformError::Decode(e.to_string()))?;
        Ok(locations
            .into_iter()
            .find(|location| location.is_active && location.ships_inventory))
    }

    async fn fetch_variants(&self, ids: &[ResourceId]) -> Result<Vec<Variant>, PlatformError> {
        let query = variants_by_id_query();
        let mut variants = Vec::with_capacity(ids.len());

        // `nodes(ids:)` accepts at most RESOURCES_LIMIT ids per request.
        for chunk in ids.chunks(RESOURCES_LIMIT as usize) {
            let nodes: Vec<Option<Value>> = self
                .execute_field(&query, json!({ "ids": chunk }), "nodes")
                .await?;

            // Deleted ids come back as null; non-variant ids as empty objects.
            for node in nodes.into_iter().flatten() {
                if node.get("id").is_none() {
                    continue;
                }
                let variant = serde_json::from_value(graphql::unwrap_connections(node))
                    .map_err(|e| PlatformError::Decode(e.to_string()))?;
                variants.push(variant);
            }
        }
        Ok(variants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_mutation_names_follow_kind() {
        let publish = publish_mutation(PublishKind::Publish);
        assert!(publish.contains("collectionPublish(input: $input)"));
        assert!(publish.contains("CollectionPublishInput!"));
        let unpublish = publish_mutation(PublishKind::Unpublish);
        assert!(unpublish.contains("collectionUnpublish(input: $input)"));
    }

    #[test]
    fn variants_query_filters_published() {
        let query = variants_query();
        assert!(query.contains(r#"query: "published_status:published""#));
        assert!(query.contains("inventoryItem { id }"));
    }
}
