//! Route-backed existence probes.
//!
//! List probes look the resource up by name in a listing; per-resource
//! probes treat HTTP 404 as a clean "not there".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ProbeKind;
use crate::error::TransportError;
use crate::oracle::Probe;
use crate::routes::BackendRoutes;
use crate::transport::{request_with_deadline, Transport, TransportRequest};

pub struct StatusAggregateProbe {
    transport: Arc<dyn Transport>,
    path: String,
}

pub struct ClusterListProbe {
    transport: Arc<dyn Transport>,
    path: String,
}

pub struct NodesProbe {
    transport: Arc<dyn Transport>,
    routes: BackendRoutes,
}

pub struct DetailsProbe {
    transport: Arc<dyn Transport>,
    routes: BackendRoutes,
}

impl StatusAggregateProbe {
    pub fn new(transport: Arc<dyn Transport>, routes: &BackendRoutes) -> Self {
        Self {
            transport,
            path: routes.cluster_status.clone(),
        }
    }
}

impl ClusterListProbe {
    pub fn new(transport: Arc<dyn Transport>, routes: &BackendRoutes) -> Self {
        Self {
            transport,
            path: routes.cluster_list.clone(),
        }
    }
}

impl NodesProbe {
    pub fn new(transport: Arc<dyn Transport>, routes: &BackendRoutes) -> Self {
        Self {
            transport,
            routes: routes.clone(),
        }
    }
}

impl DetailsProbe {
    pub fn new(transport: Arc<dyn Transport>, routes: &BackendRoutes) -> Self {
        Self {
            transport,
            routes: routes.clone(),
        }
    }
}

#[async_trait]
impl Probe for StatusAggregateProbe {
    fn name(&self) -> &str {
        ProbeKind::StatusAggregate.as_str()
    }

    async fn exists(&self, resource: &str, timeout: Duration) -> Result<bool, TransportError> {
        let payload = fetch(self.transport.as_ref(), &self.path, timeout).await?;
        Ok(listing_contains(&payload, resource))
    }
}

#[async_trait]
impl Probe for ClusterListProbe {
    fn name(&self) -> &str {
        ProbeKind::ClusterList.as_str()
    }

    async fn exists(&self, resource: &str, timeout: Duration) -> Result<bool, TransportError> {
        let payload = fetch(self.transport.as_ref(), &self.path, timeout).await?;
        Ok(listing_contains(&payload, resource))
    }
}

#[async_trait]
impl Probe for NodesProbe {
    fn name(&self) -> &str {
        ProbeKind::Nodes.as_str()
    }

    async fn exists(&self, resource: &str, timeout: Duration) -> Result<bool, TransportError> {
        let path = self.routes.cluster_nodes_path(resource);
        match fetch(self.transport.as_ref(), &path, timeout).await {
            Ok(payload) => Ok(has_nodes(&payload)),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Probe for DetailsProbe {
    fn name(&self) -> &str {
        ProbeKind::Details.as_str()
    }

    async fn exists(&self, resource: &str, timeout: Duration) -> Result<bool, TransportError> {
        let path = self.routes.cluster_details_path(resource);
        match fetch(self.transport.as_ref(), &path, timeout).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Builds probes in the configured priority order. Duplicates are kept;
/// the order is the caller's decision.
pub fn build_probes(
    order: &[ProbeKind],
    transport: Arc<dyn Transport>,
    routes: &BackendRoutes,
) -> Vec<Arc<dyn Probe>> {
    order
        .iter()
        .map(|kind| -> Arc<dyn Probe> {
            match kind {
                ProbeKind::StatusAggregate => {
                    Arc::new(StatusAggregateProbe::new(transport.clone(), routes))
                }
                ProbeKind::ClusterList => {
                    Arc::new(ClusterListProbe::new(transport.clone(), routes))
                }
                ProbeKind::Nodes => Arc::new(NodesProbe::new(transport.clone(), routes)),
                ProbeKind::Details => Arc::new(DetailsProbe::new(transport.clone(), routes)),
            }
        })
        .collect()
}

async fn fetch(
    transport: &dyn Transport,
    path: &str,
    timeout: Duration,
) -> Result<Value, TransportError> {
    let payload = request_with_deadline(transport, TransportRequest::get(path, timeout)).await?;
    // The list endpoint answers 200 with `status: error` when it could not
    // ask the cluster runtime; an empty list there proves nothing.
    if payload.get("status").and_then(Value::as_str) == Some("error") {
        let message = payload
            .get("error")
            .and_then(Value::as_str)
            .or_else(|| payload.get("message").and_then(Value::as_str))
            .unwrap_or("backend reported an error");
        return Err(TransportError::Decode {
            url: path.to_string(),
            message: message.to_string(),
        });
    }
    Ok(payload)
}

fn listing_contains(payload: &Value, resource: &str) -> bool {
    let clusters = payload
        .get("data")
        .and_then(|data| data.get("clusters"))
        .or_else(|| payload.get("clusters"));
    match clusters {
        Some(Value::Array(items)) => items.iter().any(|item| entry_name(item) == Some(resource)),
        Some(Value::Object(map)) => map.contains_key(resource),
        _ => false,
    }
}

fn entry_name(item: &Value) -> Option<&str> {
    match item {
        Value::String(name) => Some(name.as_str()),
        Value::Object(map) => map
            .get("name")
            .or_else(|| map.get("cluster_name"))
            .and_then(Value::as_str),
        _ => None,
    }
}

fn has_nodes(payload: &Value) -> bool {
    let data = payload.get("data").unwrap_or(payload);
    match data {
        Value::Array(nodes) => !nodes.is_empty(),
        Value::Object(map) => match map.get("nodes") {
            Some(Value::Array(nodes)) => !nodes.is_empty(),
            // A 200 for a named cluster is already evidence it exists.
            _ => true,
        },
        _ => true,
    }
}
