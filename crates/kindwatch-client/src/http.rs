use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde_json::Value;

use kindwatch_core::{BackendSettings, Method, Transport, TransportError, TransportRequest};

use crate::breaker::{CircuitBreaker, CircuitState};
use crate::error::ClientError;

const TOKEN_HEADER: &str = "x-kindwatch-token";

fn build_http_client(api_token: Option<&str>) -> Result<Client, ClientError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = api_token.map(str::trim).filter(|t| !t.is_empty()) {
        if let Ok(value) = HeaderValue::from_str(token) {
            headers.insert(TOKEN_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            headers.insert(AUTHORIZATION, value);
        }
    }
    Ok(Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(5))
        .build()?)
}

/// [`Transport`] over HTTP with one circuit breaker per endpoint path, so a
/// failing task-status route never blocks the existence probes.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    max_failures: u32,
    cooldown: Duration,
}

impl HttpTransport {
    pub fn new(settings: &BackendSettings) -> Result<Self, ClientError> {
        let base_url = settings.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "backend URL must be http(s), got `{base_url}`"
            )));
        }
        Ok(Self {
            client: build_http_client(settings.api_token.as_deref())?,
            base_url,
            breakers: Mutex::new(HashMap::new()),
            max_failures: settings.breaker_max_failures,
            cooldown: Duration::from_millis(settings.breaker_cooldown_ms),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn circuit_state(&self, path: &str) -> CircuitState {
        self.breakers
            .lock()
            .get(path)
            .map_or(CircuitState::Closed, CircuitBreaker::state)
    }

    fn can_execute(&self, path: &str) -> bool {
        self.breakers
            .lock()
            .get_mut(path)
            .map_or(true, CircuitBreaker::can_execute)
    }

    fn record_failure(&self, path: &str) {
        let (max_failures, cooldown) = (self.max_failures, self.cooldown);
        self.breakers
            .lock()
            .entry(path.to_string())
            .or_insert_with(|| CircuitBreaker::new(max_failures, cooldown))
            .record_failure();
    }

    // A healthy endpoint needs no bookkeeping.
    fn record_success(&self, path: &str) {
        self.breakers.lock().remove(path);
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn handle_response(
        &self,
        path: &str,
        url: &str,
        response: reqwest::Response,
    ) -> Result<Value, TransportError> {
        let status = response.status();
        if status.is_server_error() {
            self.record_failure(path);
        } else {
            self.record_success(path);
        }

        let body = response.text().await.map_err(|e| TransportError::Network {
            url: url.to_string(),
            message: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            tracing::debug!("Request to {} failed ({}): {}", url, status, truncate(&body, 500));
            return Err(TransportError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate(&body, 1000).to_string(),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            tracing::warn!("Failed to parse response from {}: {}", url, e);
            TransportError::Decode {
                url: url.to_string(),
                message: format!("{e}. Body: {}", truncate(&body, 200)),
            }
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: TransportRequest) -> Result<Value, TransportError> {
        if !self.can_execute(&request.path) {
            return Err(TransportError::CircuitOpen);
        }

        let url = self.url_for(&request.path);
        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        tracing::debug!(method = request.method.as_str(), %url, "backend request");
        let response = match builder.timeout(request.timeout).send().await {
            Ok(response) => response,
            Err(err) => {
                self.record_failure(&request.path);
                return Err(map_send_error(&url, request.timeout, err));
            }
        };
        self.handle_response(&request.path, &url, response).await
    }
}

fn map_send_error(url: &str, timeout: Duration, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        TransportError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

fn truncate(body: &str, max: usize) -> &str {
    if body.len() <= max {
        return body;
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
