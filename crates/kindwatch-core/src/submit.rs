use serde_json::{Map, Value};

use kindwatch_types::{Operation, OperationKind};

use crate::normalize::{classify_status_text, StatusText};

/// What a submission response told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitReply {
    /// Accepted for asynchronous execution under this task id.
    Task(String),
    /// The backend finished (or refused) the work inline.
    Immediate { success: bool, message: String },
    /// Accepted without any way to track it.
    Acknowledged { message: String },
}

/// Request body for an operation. The target name travels in the body for
/// lifecycle operations and in the path for limit updates.
pub fn submit_body(operation: &Operation) -> Value {
    let mut body: Map<String, Value> = operation.parameters.clone();
    if operation.kind != OperationKind::UpdateLimits {
        body.insert("name".to_string(), Value::String(operation.target.clone()));
    }
    Value::Object(body)
}

/// Looks for a task id at `task_id`, then `data.task_id`, then under any
/// first-level object property.
pub fn extract_task_id(payload: &Value) -> Option<String> {
    if let Some(id) = task_id_of(payload) {
        return Some(id);
    }
    if let Some(id) = payload.get("data").and_then(task_id_of) {
        return Some(id);
    }
    payload
        .as_object()?
        .values()
        .filter(|value| value.is_object())
        .find_map(task_id_of)
}

pub fn interpret_submit_response(payload: &Value) -> SubmitReply {
    if let Some(id) = extract_task_id(payload) {
        return SubmitReply::Task(id);
    }
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.get("error").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    let explicit_success = payload.get("success").and_then(Value::as_bool);
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .map(classify_status_text);

    match (explicit_success, status) {
        (Some(false), _) | (_, Some(StatusText::Failed)) => SubmitReply::Immediate {
            success: false,
            message,
        },
        (Some(true), _) | (_, Some(StatusText::Succeeded)) => SubmitReply::Immediate {
            success: true,
            message,
        },
        _ => SubmitReply::Acknowledged { message },
    }
}

fn task_id_of(value: &Value) -> Option<String> {
    match value.get("task_id")? {
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_id_locations_in_priority_order() {
        assert_eq!(
            extract_task_id(&json!({"task_id": "top", "data": {"task_id": "nested"}})),
            Some("top".to_string())
        );
        assert_eq!(
            extract_task_id(&json!({"status": "accepted", "data": {"task_id": "abc123"}})),
            Some("abc123".to_string())
        );
        assert_eq!(
            extract_task_id(&json!({"result": {"task_id": 42}})),
            Some("42".to_string())
        );
        assert_eq!(extract_task_id(&json!({"task_id": ""})), None);
        assert_eq!(extract_task_id(&json!({"data": "task_id"})), None);
    }

    #[test]
    fn inline_results_are_recognised() {
        assert_eq!(
            interpret_submit_response(&json!({"status": "success", "message": "done"})),
            SubmitReply::Immediate {
                success: true,
                message: "done".to_string()
            }
        );
        assert_eq!(
            interpret_submit_response(&json!({"status": "error", "error": "no docker"})),
            SubmitReply::Immediate {
                success: false,
                message: "no docker".to_string()
            }
        );
        assert_eq!(
            interpret_submit_response(&json!({"status": "accepted", "message": "queued"})),
            SubmitReply::Acknowledged {
                message: "queued".to_string()
            }
        );
    }

    #[test]
    fn body_carries_name_except_for_limit_updates() {
        let create = Operation::create("demo").with_param("worker_nodes", 1);
        assert_eq!(
            submit_body(&create),
            json!({"name": "demo", "worker_nodes": 1})
        );
        let limits = Operation::update_limits("demo").with_param("worker_config", json!({}));
        assert_eq!(submit_body(&limits), json!({"worker_config": {}}));
    }
}
