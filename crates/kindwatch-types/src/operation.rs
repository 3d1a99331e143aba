use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Delete,
    UpdateLimits,
}

/// Polling profiles are chosen per class: cluster lifecycle changes take
/// minutes, limit updates finish much sooner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    Lifecycle,
    Update,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Delete => "delete",
            OperationKind::UpdateLimits => "update_limits",
        }
    }

    pub fn class(self) -> OperationClass {
        match self {
            OperationKind::Create | OperationKind::Delete => OperationClass::Lifecycle,
            OperationKind::UpdateLimits => OperationClass::Update,
        }
    }

    /// Whether the target resource should exist once the operation took effect.
    pub fn expected_presence(self) -> bool {
        !matches!(self, OperationKind::Delete)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub target: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Operation {
    pub fn new(kind: OperationKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            parameters: Map::new(),
        }
    }

    pub fn create(target: impl Into<String>) -> Self {
        Self::new(OperationKind::Create, target)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, target)
    }

    pub fn update_limits(target: impl Into<String>) -> Self {
        Self::new(OperationKind::UpdateLimits, target)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// Key used to detect two sessions racing on the same change.
    pub fn dedupe_key(&self) -> (OperationKind, String) {
        (self.kind, self.target.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: String,
    pub operation: Operation,
    pub submitted_at: DateTime<Utc>,
}

impl TaskHandle {
    pub fn new(id: impl Into<String>, operation: Operation) -> Self {
        Self {
            id: id.into(),
            operation,
            submitted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_expects_absence() {
        assert!(OperationKind::Create.expected_presence());
        assert!(OperationKind::UpdateLimits.expected_presence());
        assert!(!OperationKind::Delete.expected_presence());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let raw = serde_json::to_string(&OperationKind::UpdateLimits).unwrap();
        assert_eq!(raw, "\"update_limits\"");
        assert_eq!(OperationKind::UpdateLimits.class(), OperationClass::Update);
    }

    #[test]
    fn builder_collects_parameters() {
        let op = Operation::create("demo").with_param("worker_nodes", 2);
        assert_eq!(op.param("worker_nodes"), Some(&Value::from(2)));
        assert_eq!(op.dedupe_key(), (OperationKind::Create, "demo".to_string()));
    }
}
