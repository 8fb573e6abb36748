//! Outbound change bus
//!
//! Renders store change events as `{module, id, value}` messages under
//! `<prefix>.device.{insert,delete,update}` and fans them out to live
//! subscribers (WebSocket clients).

use anyhow::{bail, Result};
use avr_core::DeviceId;
use avr_state::ChangeEvent;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::BusConfig;

/// One published bus message
#[derive(Debug, Clone, Serialize)]
pub struct BusMessage {
    #[serde(skip)]
    pub topic: String,
    pub module: String,
    pub id: DeviceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

pub struct Bus {
    module: String,
    prefix: String,
    tx: broadcast::Sender<BusMessage>,
}

impl Bus {
    pub fn new(config: &BusConfig) -> Self {
        let (tx, _) = broadcast::channel(config.capacity.max(1));
        Self {
            module: config.module.clone(),
            prefix: config.topic_prefix.clone(),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    /// Render a change event as a bus message
    pub fn render(&self, event: &ChangeEvent) -> Result<BusMessage> {
        let value = match event {
            ChangeEvent::DeviceInserted { device, .. } => Some(serde_json::to_value(device)?),
            ChangeEvent::DeviceDeleted { .. } => None,
            ChangeEvent::StatusUpdated { status, .. } => Some(serde_json::to_value(status)?),
        };
        Ok(BusMessage {
            topic: format!("{}.{}", self.prefix, event.topic()),
            module: self.module.clone(),
            id: event.id().clone(),
            value,
        })
    }

    /// Publish every change event until the change stream ends
    ///
    /// Returns an error when the stream closes; losing the bus stops the daemon.
    pub async fn forward(&self, mut events: broadcast::Receiver<ChangeEvent>) -> Result<()> {
        info!(prefix = %self.prefix, module = %self.module, "Change bus started");
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Change bus lagged, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => bail!("change stream closed"),
            };

            let message = match self.render(&event) {
                Ok(message) => message,
                Err(e) => {
                    warn!(device = %event.id(), error = %e, "Failed to render bus message");
                    continue;
                }
            };
            let payload = serde_json::to_string(&message)?;
            match event {
                ChangeEvent::StatusUpdated { .. } => debug!("{} => {}", message.topic, payload),
                _ => info!("{} => {}", message.topic, payload),
            }

            // No subscribers is fine
            let _ = self.tx.send(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avr_core::{DeviceDescriptor, Status};
    use avr_state::Notifier;

    fn bus() -> Bus {
        Bus::new(&BusConfig {
            module: "onkyo".to_string(),
            topic_prefix: "sentinel".to_string(),
            capacity: 16,
        })
    }

    fn status() -> Status {
        Status {
            on: true,
            volume: 25,
            mute: false,
            source: "TV".to_string(),
            sound_mode: "stereo".to_string(),
        }
    }

    #[test]
    fn test_render_update() {
        let message = bus()
            .render(&ChangeEvent::StatusUpdated { id: DeviceId::from("d1"), status: status() })
            .unwrap();
        assert_eq!(message.topic, "sentinel.device.update");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({
                "module": "onkyo",
                "id": "d1",
                "value": {
                    "on": true,
                    "volume": 25,
                    "mute": false,
                    "source": "TV",
                    "soundMode": "stereo"
                }
            })
        );
    }

    #[test]
    fn test_render_insert_and_delete() {
        let bus = bus();
        let descriptor = DeviceDescriptor::new(DeviceId::from("d1"), "Living Room".to_string());
        let insert = bus
            .render(&ChangeEvent::DeviceInserted { id: DeviceId::from("d1"), device: descriptor })
            .unwrap();
        assert_eq!(insert.topic, "sentinel.device.insert");
        let json = serde_json::to_value(&insert).unwrap();
        assert_eq!(json["value"]["name"], "Living Room");
        assert_eq!(json["value"]["type"], "multimedia.avr");

        let delete = bus
            .render(&ChangeEvent::DeviceDeleted { id: DeviceId::from("d1") })
            .unwrap();
        assert_eq!(delete.topic, "sentinel.device.delete");
        assert_eq!(
            serde_json::to_value(&delete).unwrap(),
            serde_json::json!({ "module": "onkyo", "id": "d1" })
        );
    }

    #[tokio::test]
    async fn test_forward_fans_out_then_fails_on_close() {
        let bus = bus();
        let mut out = bus.subscribe();
        let notifier = Notifier::new(16);
        let events = notifier.subscribe();

        notifier.publish(ChangeEvent::DeviceDeleted { id: DeviceId::from("d1") });
        drop(notifier);

        let result = bus.forward(events).await;
        assert!(result.is_err());
        assert_eq!(out.try_recv().unwrap().topic, "sentinel.device.delete");
    }
}
