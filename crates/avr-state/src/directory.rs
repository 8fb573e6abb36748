//! Device directory: id -> descriptor with live driver handle

use avr_core::{Device, DeviceId, DriverHandle};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use crate::notify::{ChangeEvent, Notifier};

pub struct Directory {
    devices: RwLock<HashMap<DeviceId, Device>>,
    notifier: Notifier,
}

impl Directory {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            notifier,
        }
    }

    /// Add or overwrite an entry; always publishes an insert event
    ///
    /// Returns the entry that was replaced, if any.
    pub async fn insert(&self, device: Device) -> Option<Device> {
        let id = device.id().clone();
        let descriptor = device.descriptor.clone();

        let mut devices = self.devices.write().await;
        let previous = devices.insert(id.clone(), device);
        self.notifier
            .publish(ChangeEvent::DeviceInserted { id: id.clone(), device: descriptor });

        info!(device = %id, replaced = previous.is_some(), "Device inserted into directory");
        previous
    }

    /// Remove an entry; publishes a delete event only if it existed
    pub async fn remove(&self, id: &DeviceId) -> Option<Device> {
        let mut devices = self.devices.write().await;
        let removed = devices.remove(id);
        if removed.is_some() {
            self.notifier
                .publish(ChangeEvent::DeviceDeleted { id: id.clone() });
            info!(device = %id, "Device removed from directory");
        }
        removed
    }

    /// Remove an entry only while it still holds the given driver handle
    ///
    /// A re-detected device gets a new handle; the old handle's teardown
    /// must not evict the new entry.
    pub async fn remove_if_handle(&self, id: &DeviceId, handle: &DriverHandle) -> Option<Device> {
        let mut devices = self.devices.write().await;
        let matches = devices
            .get(id)
            .map(|d| d.driver.same_driver(handle))
            .unwrap_or(false);
        if !matches {
            return None;
        }

        let removed = devices.remove(id);
        self.notifier
            .publish(ChangeEvent::DeviceDeleted { id: id.clone() });
        info!(device = %id, "Device with closed driver removed from directory");
        removed
    }

    pub async fn get(&self, id: &DeviceId) -> Option<Device> {
        self.devices.read().await.get(id).cloned()
    }

    /// All known ids, sorted
    pub async fn keys(&self) -> Vec<DeviceId> {
        let mut keys: Vec<DeviceId> = self.devices.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// All entries, sorted by id
    pub async fn list(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.id().cmp(b.id()));
        devices
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{descriptor, MockDriver};

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<ChangeEvent>) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_insert_twice_overwrites_and_notifies_twice() {
        let notifier = Notifier::new(16);
        let mut rx = notifier.subscribe();
        let directory = Directory::new(notifier);

        let first = descriptor("x", "First");
        let second = descriptor("x", "Second");
        directory
            .insert(Device::new(first, MockDriver::arc()))
            .await;
        let replaced = directory
            .insert(Device::new(second.clone(), MockDriver::arc()))
            .await;

        assert!(replaced.is_some());
        assert_eq!(directory.get(&DeviceId::from("x")).await.unwrap().descriptor, second);
        assert_eq!(directory.len().await, 1);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, ChangeEvent::DeviceInserted { .. })));
    }

    #[tokio::test]
    async fn test_remove_notifies_once_and_ignores_absent() {
        let notifier = Notifier::new(16);
        let directory = Directory::new(notifier.clone());
        directory
            .insert(Device::new(descriptor("x", "X"), MockDriver::arc()))
            .await;

        let mut rx = notifier.subscribe();
        assert!(directory.remove(&DeviceId::from("x")).await.is_some());
        assert!(directory.remove(&DeviceId::from("x")).await.is_none());

        assert_eq!(
            drain(&mut rx),
            vec![ChangeEvent::DeviceDeleted { id: DeviceId::from("x") }]
        );
    }

    #[tokio::test]
    async fn test_remove_if_handle_spares_newer_entry() {
        let directory = Directory::new(Notifier::new(16));
        let old = Device::new(descriptor("x", "X"), MockDriver::arc());
        let old_handle = old.driver.clone();
        directory.insert(old).await;

        let new = Device::new(descriptor("x", "X"), MockDriver::arc());
        let new_handle = new.driver.clone();
        directory.insert(new).await;

        assert!(directory
            .remove_if_handle(&DeviceId::from("x"), &old_handle)
            .await
            .is_none());
        assert!(directory.get(&DeviceId::from("x")).await.is_some());

        assert!(directory
            .remove_if_handle(&DeviceId::from("x"), &new_handle)
            .await
            .is_some());
        assert!(directory.get(&DeviceId::from("x")).await.is_none());
    }

    #[tokio::test]
    async fn test_keys_sorted() {
        let directory = Directory::new(Notifier::new(16));
        for id in ["c", "a", "b"] {
            directory
                .insert(Device::new(descriptor(id, id), MockDriver::arc()))
                .await;
        }
        let keys: Vec<String> = directory.keys().await.into_iter().map(|k| k.0).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
