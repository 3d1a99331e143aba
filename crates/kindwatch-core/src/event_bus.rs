use tokio::sync::broadcast;

use kindwatch_types::KindwatchEvent;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<KindwatchEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KindwatchEvent> {
        self.tx.subscribe()
    }

    /// Fire and forget; having no subscribers is not an error.
    pub fn publish(&self, event: KindwatchEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(KindwatchEvent::ResourceRemoved {
            session_id: "s1".to_string(),
            resource: "demo".to_string(),
        });
        let mut late = bus.subscribe();
        assert!(matches!(
            late.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(KindwatchEvent::ResourceRemoved {
            session_id: "s1".to_string(),
            resource: "demo".to_string(),
        });
        let event = rx.recv().await.expect("event");
        assert_eq!(event.event_type(), "resource.removed");
    }
}
