//! GraphQL envelope handling shared by the Shopify adapter.
//!
//! Responses arrive as `{ "data": …, "errors": … }`. [`into_data`] turns the
//! envelope into either the `data` value or a classified [`PlatformError`];
//! [`unwrap_connections`] and [`split_connection`] flatten relay-style
//! `edges { node }` wrappers so nothing past this module sees them.

use serde::Serialize;
use serde_json::{Map, Value};

use storekeeper_core::error::PlatformError;
use storekeeper_core::types::Page;

/// Request body posted to a GraphQL endpoint.
#[derive(Debug, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: Value,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Extract `data` from a response envelope.
///
/// Any non-empty `errors` member wins over `data`: a partial response is
/// treated as a failed request.
pub fn into_data(envelope: Value) -> Result<Value, PlatformError> {
    let Value::Object(mut map) = envelope else {
        return Err(PlatformError::Decode("response is not a JSON object".into()));
    };

    if let Some(errors) = map.remove("errors") {
        if has_errors(&errors) {
            return Err(classify_errors(&errors));
        }
    }

    match map.remove("data") {
        Some(Value::Null) | None => Err(PlatformError::Decode("response has no data".into())),
        Some(data) => Ok(data),
    }
}

fn has_errors(errors: &Value) -> bool {
    match errors {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Map an `errors` member to a [`PlatformError`].
///
/// Throttling is recognised by `extensions.code == "THROTTLED"` or a message
/// mentioning `Throttled`.
pub fn classify_errors(errors: &Value) -> PlatformError {
    let items: Vec<&Value> = match errors {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let throttled = items.iter().any(|item| {
        let code = item
            .pointer("/extensions/code")
            .and_then(Value::as_str)
            .unwrap_or_default();
        code.eq_ignore_ascii_case("THROTTLED") || error_message(item).contains("Throttled")
    });
    if throttled {
        return PlatformError::Throttled;
    }

    PlatformError::GraphQl(items.into_iter().map(error_message).collect())
}

fn error_message(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| item.to_string()),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// Recursively replace every `{ "edges": [{ "node": x }] }` object with `[x]`.
///
/// Other members of a connection object (e.g. a nested `pageInfo`) are
/// dropped along with the wrapper.
pub fn unwrap_connections(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            match map.remove("edges") {
                Some(Value::Array(edges)) => {
                    return Value::Array(edges.into_iter().map(unwrap_edge).collect());
                }
                Some(other) => {
                    map.insert("edges".to_owned(), other);
                }
                None => {}
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, unwrap_connections(value)))
                    .collect::<Map<_, _>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(unwrap_connections).collect()),
        other => other,
    }
}

fn unwrap_edge(edge: Value) -> Value {
    match edge {
        Value::Object(mut map) => match map.remove("node") {
            Some(node) => unwrap_connections(node),
            None => unwrap_connections(Value::Object(map)),
        },
        other => unwrap_connections(other),
    }
}

/// Split a top-level connection into flat nodes plus page info.
pub fn split_connection(connection: Value) -> Result<Page<Value>, PlatformError> {
    let Value::Object(mut map) = connection else {
        return Err(PlatformError::Decode("connection is not an object".into()));
    };

    let page_info = map.remove("pageInfo").unwrap_or(Value::Null);
    let has_next_page = page_info
        .get("hasNextPage")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let end_cursor = page_info
        .get("endCursor")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let nodes = match unwrap_connections(Value::Object(map)) {
        Value::Array(nodes) => nodes,
        Value::Object(mut rest) => match rest.remove("nodes") {
            Some(Value::Array(nodes)) => nodes.into_iter().map(unwrap_connections).collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    Ok(Page {
        nodes,
        end_cursor,
        has_next_page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwrap_connections_flattens_nested_edges() {
        let raw = json!({
            "id": "c1",
            "metafields": {"edges": [{"node": {"key": "k", "value": "true"}}]},
            "resourcePublicationsV2": {"edges": [
                {"node": {"publication": {"id": "p1"}}},
                {"node": {"publication": {"id": "p2"}}}
            ]}
        });
        let flat = unwrap_connections(raw);
        assert_eq!(flat["metafields"], json!([{"key": "k", "value": "true"}]));
        assert_eq!(flat["resourcePublicationsV2"][1]["publication"]["id"], "p2");
    }

    #[test]
    fn split_connection_reads_page_info() {
        let page = split_connection(json!({
            "edges": [{"node": {"id": "a"}}, {"node": {"id": "b"}}],
            "pageInfo": {"endCursor": "cur", "hasNextPage": true}
        }))
        .expect("page");
        assert_eq!(page.nodes.len(), 2);
        assert_eq!(page.end_cursor.as_deref(), Some("cur"));
        assert!(page.has_next_page);
    }

    #[test]
    fn split_connection_accepts_plain_nodes() {
        let page = split_connection(json!({
            "nodes": [{"id": "a"}],
            "pageInfo": {"endCursor": null, "hasNextPage": false}
        }))
        .expect("page");
        assert_eq!(page.nodes, vec![json!({"id": "a"})]);
        assert!(!page.has_next_page);
    }

    #[test]
    fn throttled_extension_code_is_classified() {
        let err = classify_errors(&json!([
            {"message": "Throttled", "extensions": {"code": "THROTTLED"}}
        ]));
        assert!(err.is_throttled());
    }

    #[test]
    fn other_errors_keep_their_messages() {
        let err = into_data(json!({"errors": [{"message": "Field 'x' doesn't exist"}]}))
            .unwrap_err();
        assert!(matches!(err, PlatformError::GraphQl(ref m) if m[0].contains("doesn't exist")));
    }

    #[test]
    fn empty_errors_array_is_ignored() {
        let data = into_data(json!({"data": {"ok": true}, "errors": []})).expect("data");
        assert_eq!(data, json!({"ok": true}));
    }

    #[test]
    fn string_errors_are_supported() {
        let err = into_data(json!({"errors": "[API] Invalid API key"})).unwrap_err();
        assert_eq!(err.to_string(), "GraphQL error: [API] Invalid API key");
    }
}
