//! Change notifications shared by both stores
//!
//! The Directory publishes on every insert and remove. The StatusStore
//! publishes only when a write changes the stored snapshot.

use avr_core::{DeviceDescriptor, DeviceId, Status};
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// Directory entry added or overwritten
    DeviceInserted { id: DeviceId, device: DeviceDescriptor },
    /// Directory entry removed
    DeviceDeleted { id: DeviceId },
    /// Status snapshot changed; carries the full new snapshot
    StatusUpdated { id: DeviceId, status: Status },
}

impl ChangeEvent {
    pub fn id(&self) -> &DeviceId {
        match self {
            ChangeEvent::DeviceInserted { id, .. }
            | ChangeEvent::DeviceDeleted { id }
            | ChangeEvent::StatusUpdated { id, .. } => id,
        }
    }

    /// Topic suffix the event is published under
    pub fn topic(&self) -> &'static str {
        match self {
            ChangeEvent::DeviceInserted { .. } => "device.insert",
            ChangeEvent::DeviceDeleted { .. } => "device.delete",
            ChangeEvent::StatusUpdated { .. } => "device.update",
        }
    }
}

/// Publish side of the change stream
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publish one event; having no subscribers is not an error
    pub fn publish(&self, event: ChangeEvent) {
        trace!(device = %event.id(), topic = event.topic(), "Publishing change");
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = Notifier::new(4);
        notifier.publish(ChangeEvent::DeviceDeleted { id: DeviceId::from("x") });
    }

    #[test]
    fn test_subscriber_receives_in_order() {
        let notifier = Notifier::new(4);
        let mut rx = notifier.subscribe();

        notifier.publish(ChangeEvent::DeviceDeleted { id: DeviceId::from("a") });
        notifier.publish(ChangeEvent::DeviceDeleted { id: DeviceId::from("b") });

        assert_eq!(rx.try_recv().unwrap().id().as_str(), "a");
        let second = rx.try_recv().unwrap();
        assert_eq!(second.id().as_str(), "b");
        assert_eq!(second.topic(), "device.delete");
    }
}
