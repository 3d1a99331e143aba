use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use kindwatch_core::{
    interpret_submit_response, normalize_task_status, request_with_deadline, submit_body,
    validate_operation, ExistenceOracle, KindwatchConfig, PeriodicWatcher, Reconciler,
    SubmitReply, Transport, TransportRequest,
};
use kindwatch_types::{Operation, TaskStatus};

use crate::error::{ClientError, Result};
use crate::http::HttpTransport;

/// Everything a front end needs to talk to one cluster backend.
#[derive(Clone)]
pub struct BackendClient {
    transport: Arc<HttpTransport>,
    reconciler: Reconciler,
}

impl BackendClient {
    pub fn connect(config: KindwatchConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        let transport = Arc::new(HttpTransport::new(&config.backend)?);
        let reconciler = Reconciler::new(transport.clone() as Arc<dyn Transport>, config);
        Ok(Self {
            transport,
            reconciler,
        })
    }

    pub fn transport(&self) -> Arc<HttpTransport> {
        self.transport.clone()
    }

    /// Shared reconciler; sessions started through clones of it see the
    /// same idempotency guard and event bus.
    pub fn reconciler(&self) -> Reconciler {
        self.reconciler.clone()
    }

    pub fn oracle(&self) -> Arc<ExistenceOracle> {
        self.reconciler.oracle()
    }

    pub fn watcher(&self) -> PeriodicWatcher {
        self.reconciler.watcher()
    }

    pub fn config(&self) -> &KindwatchConfig {
        self.reconciler.config()
    }

    /// One raw submission, without tracking.
    pub async fn submit(&self, operation: &Operation) -> Result<SubmitReply> {
        validate_operation(operation)?;
        let backend = &self.config().backend;
        let request = TransportRequest::post(
            backend.routes.submit_path(operation.kind, &operation.target),
            submit_body(operation),
            Duration::from_millis(backend.submit_timeout_ms.max(1)),
        );
        let payload = request_with_deadline(self.transport.as_ref(), request).await?;
        Ok(interpret_submit_response(&payload))
    }

    pub async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        let path = self.config().backend.routes.task_status_path(task_id);
        let payload = self.get(path).await?;
        Ok(normalize_task_status(&payload))
    }

    pub async fn health(&self) -> Result<Value> {
        let path = self.config().backend.routes.health.clone();
        self.get(path).await
    }

    pub async fn cluster_health(&self, name: &str) -> Result<Value> {
        let path = self.config().backend.routes.cluster_health_path(name);
        self.get(path).await
    }

    async fn get(&self, path: String) -> Result<Value> {
        let timeout = self.config().poller.lifecycle.attempt_timeout();
        let request = TransportRequest::get(path, timeout);
        Ok(request_with_deadline(self.transport.as_ref(), request).await?)
    }
}
