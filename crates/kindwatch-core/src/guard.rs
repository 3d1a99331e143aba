use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use kindwatch_types::{Operation, OperationKind};

use crate::error::ReconcileError;

type SessionKey = (OperationKind, String);

/// Process-wide idempotency guard: at most one live session per
/// (kind, target). Clones share the same registry.
#[derive(Clone, Default)]
pub struct SessionGuard {
    enabled: bool,
    active: Arc<Mutex<HashSet<SessionKey>>>,
}

/// Held for the lifetime of a session; dropping it frees the key.
#[must_use = "the session key is released as soon as the permit is dropped"]
pub struct SessionPermit {
    key: Option<SessionKey>,
    active: Arc<Mutex<HashSet<SessionKey>>>,
}

impl SessionGuard {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            active: Arc::default(),
        }
    }

    pub fn acquire(&self, operation: &Operation) -> Result<SessionPermit, ReconcileError> {
        if !self.enabled {
            return Ok(SessionPermit {
                key: None,
                active: self.active.clone(),
            });
        }
        let key = operation.dedupe_key();
        let mut active = self.active.lock();
        if !active.insert(key.clone()) {
            return Err(ReconcileError::DuplicateSession {
                kind: key.0,
                resource: key.1,
            });
        }
        Ok(SessionPermit {
            key: Some(key),
            active: self.active.clone(),
        })
    }

    pub fn active_sessions(&self) -> usize {
        self.active.lock().len()
    }
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.active.lock().remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_session_for_same_target_is_rejected() {
        let guard = SessionGuard::new(true);
        let permit = guard.acquire(&Operation::create("demo")).expect("first");
        let err = guard.acquire(&Operation::create("demo")).err().expect("dup");
        assert_eq!(err.code(), "DUPLICATE_SESSION");

        // different kind or target is fine
        let _delete = guard.acquire(&Operation::delete("demo")).expect("delete");
        let _other = guard.acquire(&Operation::create("other")).expect("other");

        drop(permit);
        assert!(guard.acquire(&Operation::create("demo")).is_ok());
    }

    #[test]
    fn disabled_guard_allows_races() {
        let guard = SessionGuard::new(false);
        let _a = guard.acquire(&Operation::create("demo")).expect("a");
        let _b = guard.acquire(&Operation::create("demo")).expect("b");
        assert_eq!(guard.active_sessions(), 0);
    }
}
