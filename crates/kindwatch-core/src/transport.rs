use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    /// Path relative to the backend base URL, starting with `/`.
    pub path: String,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl TransportRequest {
    pub fn get(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            timeout,
        }
    }

    pub fn post(path: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            timeout,
        }
    }
}

/// One request/response exchange with the cluster backend.
///
/// Implementations must honour `TransportRequest::timeout`; callers still
/// wrap each call in their own deadline.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: TransportRequest) -> Result<Value, TransportError>;
}

/// Runs one request under a hard deadline, so a transport that ignores its
/// timeout still cannot stall the caller.
pub async fn request_with_deadline(
    transport: &dyn Transport,
    request: TransportRequest,
) -> Result<Value, TransportError> {
    let timeout = request.timeout;
    let path = request.path.clone();
    match tokio::time::timeout(timeout, transport.request(request)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            url: path,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
