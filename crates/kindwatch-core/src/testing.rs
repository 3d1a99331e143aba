//! Scripted in-memory transport shared by the unit and integration tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::TransportError;
use crate::transport::{Method, Transport, TransportRequest};

#[derive(Debug, Clone)]
pub enum Step {
    Respond(Value),
    Fail(TransportError),
    Hang,
}

/// Answers each path from its own queue; the last step of a queue repeats
/// forever. Unscripted paths answer HTTP 404.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(Method, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, path: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .insert(path.to_string(), steps.into_iter().collect());
        self
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|(_, p)| p == path).count()
    }

    pub fn calls_to_any(&self, paths: &[&str]) -> usize {
        paths.iter().map(|path| self.calls_to(path)).sum()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    fn next_step(&self, path: &str) -> Option<Step> {
        let mut scripts = self.scripts.lock();
        let queue = scripts.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

pub fn http_error(path: &str, status: u16) -> TransportError {
    TransportError::Http {
        url: path.to_string(),
        status,
        body: String::new(),
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, request: TransportRequest) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .push((request.method, request.path.clone()));
        match self.next_step(&request.path) {
            Some(Step::Respond(value)) => Ok(value),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Hang) => {
                std::future::pending::<()>().await;
                Err(http_error(&request.path, 599))
            }
            None => Err(http_error(&request.path, 404)),
        }
    }
}
