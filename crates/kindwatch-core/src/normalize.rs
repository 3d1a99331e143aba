//! Task-status normalization.
//!
//! The backend does not agree with itself on where a task's state lives, so
//! every payload goes through [`normalize_task_status`] exactly once, at the
//! poller boundary. Precedence, highest first:
//!
//! | Signal                                  | Result                                      |
//! |-----------------------------------------|---------------------------------------------|
//! | `success: true`                         | `completed`, success                        |
//! | `completed: true`                       | `failed` on a failure signal, else `completed` |
//! | `completed: false`                      | `pending`/`running`; end-state text ignored |
//! | `status` / `state` / `task_status` text | mapped through the synonym table            |
//! | `result.status` text                    | mapped through the synonym table            |
//! | non-empty `error` field                 | `failed`                                    |
//! | nothing recognisable                    | `unknown`                                   |

use serde_json::Value;

use kindwatch_types::{TaskPhase, TaskStatus};

const STATUS_FIELDS: [&str; 3] = ["status", "state", "task_status"];

/// Classification of a backend status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusText {
    Pending,
    Running,
    Succeeded,
    Failed,
    NotFound,
    Unknown,
}

pub fn classify_status_text(text: &str) -> StatusText {
    match text.trim().to_ascii_lowercase().as_str() {
        "pending" | "queued" | "accepted" | "submitted" => StatusText::Pending,
        "running" | "started" | "processing" | "in_progress" | "in-progress" | "creating"
        | "deleting" => StatusText::Running,
        "completed" | "complete" | "succeeded" | "success" | "successful" | "done" => {
            StatusText::Succeeded
        }
        "failed" | "failure" | "error" | "errored" => StatusText::Failed,
        "not_found" | "not-found" | "notfound" => StatusText::NotFound,
        _ => StatusText::Unknown,
    }
}

pub fn normalize_task_status(raw: &Value) -> TaskStatus {
    let body = unwrap_envelope(raw);

    let completed_flag = body.get("completed").and_then(Value::as_bool);
    let success_flag = body.get("success").and_then(Value::as_bool);
    let state_text = status_text(body);
    let text_class = state_text.as_deref().map(classify_status_text);
    let error_text = error_field(body);
    let failure_signal = text_class == Some(StatusText::Failed) || error_text.is_some();

    let (phase, success) = match (success_flag, completed_flag) {
        (Some(true), _) => (TaskPhase::Completed, true),
        (_, Some(true)) => {
            if failure_signal {
                (TaskPhase::Failed, false)
            } else {
                (TaskPhase::Completed, success_flag.unwrap_or(true))
            }
        }
        (_, Some(false)) => match text_class {
            Some(StatusText::Pending) => (TaskPhase::Pending, false),
            Some(StatusText::NotFound) | None | Some(StatusText::Unknown) => {
                (TaskPhase::Unknown, false)
            }
            _ => (TaskPhase::Running, false),
        },
        _ => match text_class {
            Some(StatusText::Succeeded) if error_text.is_none() => (TaskPhase::Completed, true),
            Some(StatusText::Succeeded) | Some(StatusText::Failed) => (TaskPhase::Failed, false),
            Some(StatusText::Pending) => (TaskPhase::Pending, false),
            Some(StatusText::Running) => (TaskPhase::Running, false),
            _ if error_text.is_some() => (TaskPhase::Failed, false),
            _ => (TaskPhase::Unknown, false),
        },
    };

    let message = string_field(body, "message")
        .or_else(|| error_text.clone())
        .or_else(|| body.get("result").and_then(|r| string_field(r, "message")))
        .unwrap_or_default();

    TaskStatus {
        phase,
        progress: progress_field(body),
        message,
        success,
        backend_state: state_text.map(|s| s.trim().to_ascii_lowercase()),
        raw: raw.clone(),
    }
}

/// Some endpoints answer with `{status, message, data: {...task...}}`.
fn unwrap_envelope(raw: &Value) -> &Value {
    let has_task_fields = raw.get("completed").is_some()
        || raw.get("task_id").is_some()
        || raw.get("progress").is_some();
    if has_task_fields {
        return raw;
    }
    match raw.get("data") {
        Some(inner @ Value::Object(map)) if map.contains_key("task_id") => inner,
        _ => raw,
    }
}

fn status_text(body: &Value) -> Option<String> {
    STATUS_FIELDS
        .iter()
        .find_map(|field| string_field(body, field))
        .or_else(|| {
            body.get("result")
                .and_then(|result| string_field(result, "status"))
        })
}

fn error_field(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn progress_field(body: &Value) -> Option<u8> {
    let raw = body
        .get("progress")
        .or_else(|| body.get("details").and_then(|d| d.get("progress")))?;
    let value = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    if !value.is_finite() {
        return None;
    }
    Some(value.clamp(0.0, 100.0).round() as u8)
}
