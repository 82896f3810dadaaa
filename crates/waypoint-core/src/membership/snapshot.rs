//! Directory snapshot parsing.
//!
//! The directory service answers with an etcd v2 style document:
//!
//! ```text
//! { "node": { "key": "/.../orders", "dir": true, "nodes": [
//!     { "key": "/.../orders/10.0.0.1:8050", "value": "{\"IP\":\"10.0.0.1\",\"Port\":8050,...}" }
//! ] } }
//! ```
//!
//! Every child's `value` is itself a JSON document describing one endpoint.

use serde::Deserialize;

use super::endpoint::{Endpoint, MembershipSet};
use crate::error::{Result, WaypointError};

/// Raw directory response as returned by a transport.
pub type RawSnapshot = serde_json::Value;

#[derive(Debug, Deserialize)]
struct DirectoryResponse {
    node: Option<DirectoryNode>,
}

#[derive(Debug, Deserialize)]
struct DirectoryNode {
    #[serde(default)]
    key: String,
    value: Option<String>,
    nodes: Option<Vec<DirectoryNode>>,
}

/// Registration record stored in a child node's value.
#[derive(Debug, Deserialize)]
struct EndpointRecord {
    #[serde(rename = "IP")]
    ip: String,
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "Namespace")]
    namespace: String,
    #[serde(rename = "SrvName")]
    service_name: String,
    #[serde(rename = "Protocol")]
    protocol: String,
    #[serde(rename = "Status")]
    status: i64,
    #[serde(rename = "Weight")]
    weight: i64,
}

impl From<EndpointRecord> for Endpoint {
    fn from(record: EndpointRecord) -> Self {
        Endpoint {
            host: record.ip,
            port: record.port,
            protocol: record.protocol,
            namespace: record.namespace,
            service_name: record.service_name,
            status: record.status,
            weight: record.weight,
        }
    }
}

/// Parse a directory response into a membership set.
///
/// Fails on an empty response, on a directory without children, and on any
/// child whose registration cannot be decoded.
pub fn parse_snapshot(raw: &RawSnapshot) -> Result<MembershipSet> {
    if is_empty_response(raw) {
        return Err(WaypointError::MalformedDirectory(
            "empty directory response".to_string(),
        ));
    }

    let response = DirectoryResponse::deserialize(raw).map_err(|e| {
        WaypointError::MalformedDirectory(format!("unexpected response shape: {}", e))
    })?;

    let children = response
        .node
        .and_then(|node| node.nodes)
        .filter(|nodes| !nodes.is_empty())
        .ok_or_else(|| {
            WaypointError::MalformedDirectory("directory has no registered endpoints".to_string())
        })?;

    let mut set = MembershipSet::new();
    for child in children {
        set.insert(decode_child(&child)?);
    }

    Ok(set)
}

fn decode_child(node: &DirectoryNode) -> Result<Endpoint> {
    let value = node.value.as_deref().ok_or_else(|| {
        WaypointError::MalformedDirectory(format!("node {:?} has no value", node.key))
    })?;

    let record: EndpointRecord = serde_json::from_str(value).map_err(|e| {
        WaypointError::MalformedDirectory(format!("node {:?} has a bad registration: {}", node.key, e))
    })?;

    Ok(record.into())
}

fn is_empty_response(raw: &RawSnapshot) -> bool {
    match raw {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn child(ip: &str, port: u16) -> serde_json::Value {
        let value = json!({
            "IP": ip,
            "Port": port,
            "Namespace": "com.example",
            "SrvName": "orders",
            "Protocol": "nova",
            "Status": 1,
            "Weight": 100,
            "ExtData": "{\"zone\":\"a\"}",
        });
        json!({
            "key": format!("/v2/keys/services/nova:com.example/orders/{}:{}", ip, port),
            "value": value.to_string(),
        })
    }

    fn directory(children: Vec<serde_json::Value>) -> serde_json::Value {
        json!({
            "action": "get",
            "node": { "key": "/services/nova:com.example/orders", "dir": true, "nodes": children }
        })
    }

    #[test]
    fn test_parse_valid_directory() {
        let raw = directory(vec![
            child("10.0.0.1", 8050),
            child("10.0.0.2", 8050),
            child("10.0.0.3", 8051),
        ]);

        let set = parse_snapshot(&raw).unwrap();
        assert_eq!(set.len(), 3);

        let endpoint = set.get("10.0.0.3:8051").unwrap();
        assert_eq!(endpoint.host, "10.0.0.3");
        assert_eq!(endpoint.namespace, "com.example");
        assert_eq!(endpoint.service_name, "orders");
        assert_eq!(endpoint.weight, 100);
    }

    #[test]
    fn test_zero_children_is_malformed() {
        let err = parse_snapshot(&directory(vec![])).unwrap_err();
        assert!(matches!(err, WaypointError::MalformedDirectory(_)));
    }

    #[test]
    fn test_missing_node_list_is_malformed() {
        let raw = json!({ "node": { "key": "/services/orders", "dir": true } });
        assert!(matches!(
            parse_snapshot(&raw),
            Err(WaypointError::MalformedDirectory(_))
        ));

        let raw = json!({ "action": "get" });
        assert!(parse_snapshot(&raw).is_err());
    }

    #[test]
    fn test_empty_responses_are_malformed() {
        for raw in [json!(null), json!({}), json!([]), json!("")] {
            assert!(
                matches!(parse_snapshot(&raw), Err(WaypointError::MalformedDirectory(_))),
                "expected {} to be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_bad_child_fails_whole_parse() {
        let mut broken = child("10.0.0.2", 8050);
        broken["value"] = json!("{\"IP\":\"10.0.0.2\"}");

        let raw = directory(vec![child("10.0.0.1", 8050), broken]);
        let err = parse_snapshot(&raw).unwrap_err();
        assert!(err.to_string().contains("10.0.0.2:8050"));
    }

    #[test]
    fn test_child_without_value_fails() {
        let raw = directory(vec![json!({ "key": "/services/orders/x" })]);
        assert!(parse_snapshot(&raw).is_err());
    }
}
