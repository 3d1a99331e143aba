use serde_json::Value;

use kindwatch_types::{Operation, OperationKind};

use crate::error::ReconcileError;

const MAX_NAME_LEN: usize = 63;
const MAX_WORKER_NODES: u64 = 20;

/// Checks an operation before any network activity.
pub fn validate_operation(operation: &Operation) -> Result<(), ReconcileError> {
    validate_resource_name(&operation.target)?;
    match operation.kind {
        OperationKind::Create => {
            let workers = operation
                .param("worker_nodes")
                .ok_or_else(|| invalid("create requires `worker_nodes`"))?;
            match workers.as_u64() {
                Some(n) if n <= MAX_WORKER_NODES => {}
                _ => {
                    return Err(invalid(format!(
                        "`worker_nodes` must be an integer between 0 and {MAX_WORKER_NODES}"
                    )))
                }
            }
            for key in ["worker_config", "control_plane_config"] {
                if let Some(config) = operation.param(key) {
                    validate_node_config(key, config)?;
                }
            }
        }
        OperationKind::UpdateLimits => {
            for key in ["worker_config", "control_plane_config"] {
                let config = operation
                    .param(key)
                    .ok_or_else(|| invalid(format!("update_limits requires `{key}`")))?;
                validate_node_config(key, config)?;
            }
        }
        OperationKind::Delete => {}
    }
    Ok(())
}

/// Cluster names follow DNS label rules: lowercase alphanumerics and `-`,
/// not starting or ending with `-`.
pub fn validate_resource_name(name: &str) -> Result<(), ReconcileError> {
    if name.is_empty() {
        return Err(invalid("resource name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid(format!(
            "resource name `{name}` is longer than {MAX_NAME_LEN} characters"
        )));
    }
    let allowed = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if !allowed || name.starts_with('-') || name.ends_with('-') {
        return Err(invalid(format!(
            "resource name `{name}` must be lowercase alphanumerics and `-`"
        )));
    }
    Ok(())
}

fn validate_node_config(key: &str, config: &Value) -> Result<(), ReconcileError> {
    let cpu_ok = config
        .get("cpu")
        .and_then(Value::as_u64)
        .is_some_and(|cpu| cpu > 0);
    if !cpu_ok {
        return Err(invalid(format!("`{key}.cpu` must be a positive integer")));
    }
    let memory_ok = config
        .get("memory")
        .and_then(Value::as_str)
        .is_some_and(|m| !m.trim().is_empty());
    if !memory_ok {
        return Err(invalid(format!("`{key}.memory` must be a non-empty string")));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ReconcileError {
    ReconcileError::InvalidOperation(message.into())
}
