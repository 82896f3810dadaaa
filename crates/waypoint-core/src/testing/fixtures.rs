//! Builders for endpoints and directory documents.

use serde_json::json;

use crate::membership::{Endpoint, RawSnapshot};

/// An endpoint of the `orders` test service.
pub fn endpoint(host: &str, port: u16) -> Endpoint {
    Endpoint {
        host: host.to_string(),
        port,
        protocol: "nova".to_string(),
        namespace: "default".to_string(),
        service_name: "orders".to_string(),
        status: 1,
        weight: 100,
    }
}

/// A directory document listing the given endpoints as child nodes.
pub fn directory_snapshot(service: &str, endpoints: &[Endpoint]) -> RawSnapshot {
    let nodes: Vec<_> = endpoints
        .iter()
        .map(|e| {
            let registration = json!({
                "IP": e.host,
                "Port": e.port,
                "Namespace": e.namespace,
                "SrvName": e.service_name,
                "Protocol": e.protocol,
                "Status": e.status,
                "Weight": e.weight,
            });
            json!({
                "key": format!("/services/{}:{}/{}/{}", e.protocol, e.namespace, service, e.key()),
                "value": registration.to_string(),
            })
        })
        .collect();

    json!({
        "action": "get",
        "node": {
            "key": format!("/services/{}", service),
            "dir": true,
            "nodes": nodes,
        }
    })
}
