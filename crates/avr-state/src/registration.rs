//! Registration of newly detected devices

use avr_core::{Device, DeviceDescriptor, DeviceDriver, DeviceId, Status};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::directory::Directory;
use crate::error::StateError;
use crate::merge::Merger;
use crate::query::query_status;
use crate::status::{StatusStore, WriteOutcome};

/// Push-dispatch task of one registration
struct Subscription {
    generation: u64,
    task: JoinHandle<()>,
}

type Subscriptions = Arc<Mutex<HashMap<DeviceId, Subscription>>>;

pub struct Registrar {
    directory: Arc<Directory>,
    status: Arc<StatusStore>,
    merger: Merger,
    query_timeout: Duration,
    /// Current subscription per device. Holding this lock also serializes
    /// directory insertion against eviction of a closed driver.
    subscriptions: Subscriptions,
    generations: AtomicU64,
}

impl Registrar {
    pub fn new(directory: Arc<Directory>, status: Arc<StatusStore>, query_timeout: Duration) -> Self {
        Self {
            merger: Merger::new(status.clone()),
            directory,
            status,
            query_timeout,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            generations: AtomicU64::new(0),
        }
    }

    /// Register a detected device and load its first snapshot
    ///
    /// The device stays in the directory when the initial query fails; it
    /// is listed as ready once a later reconciliation pass succeeds.
    pub async fn register(
        &self,
        descriptor: DeviceDescriptor,
        driver: Arc<dyn DeviceDriver>,
    ) -> Result<Status, StateError> {
        let id = descriptor.id.clone();
        let device = Device::new(descriptor, driver.clone());
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);

        {
            let mut subscriptions = self.subscriptions.lock().await;
            let task = self.spawn_dispatch(&device, generation);
            self.directory.insert(device).await;
            if let Some(previous) = subscriptions.insert(id.clone(), Subscription { generation, task }) {
                debug!(device = %id, "Replacing previous push subscription");
                previous.task.abort();
            }
        }

        let version = self.status.version(&id).await;
        let fresh = match query_status(driver.as_ref(), self.query_timeout).await {
            Ok(status) => status,
            Err(e) => {
                warn!(device = %id, error = %e, "Initial status query failed");
                return Err(StateError::Driver { id, source: e });
            }
        };

        match self.status.set_if_unchanged(&id, version, fresh.clone()).await {
            WriteOutcome::Conflict => {
                debug!(device = %id, "Newer snapshot stored during initial query");
                Ok(self.status.get(&id).await.unwrap_or(fresh))
            }
            _ => {
                info!(device = %id, "Device ready");
                Ok(fresh)
            }
        }
    }

    /// Merge pushed changes until the driver's stream ends, then evict the
    /// device if this registration is still the current one
    fn spawn_dispatch(&self, device: &Device, generation: u64) -> JoinHandle<()> {
        let events = device.driver.subscribe();
        let handle = device.driver.clone();
        let id = device.id().clone();
        let merger = self.merger.clone();
        let directory = self.directory.clone();
        let status = self.status.clone();
        let subscriptions = self.subscriptions.clone();

        tokio::spawn(async move {
            merger.dispatch(id.clone(), events).await;

            let mut subscriptions = subscriptions.lock().await;
            if subscriptions.get(&id).map(|s| s.generation) != Some(generation) {
                return;
            }
            subscriptions.remove(&id);
            if directory.remove_if_handle(&id, &handle).await.is_some() {
                status.remove(&id).await;
                info!(device = %id, "Device connection lost");
            }
        })
    }

    /// Forget a device: stop its push subscription and drop both entries
    pub async fn unregister(&self, id: &DeviceId) -> Result<(), StateError> {
        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(subscription) = subscriptions.remove(id) {
            subscription.task.abort();
        }
        self.status.remove(id).await;
        match self.directory.remove(id).await {
            Some(_) => Ok(()),
            None => Err(StateError::NotFound(id.clone())),
        }
    }

    #[cfg(test)]
    async fn subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }
}

impl Drop for Registrar {
    fn drop(&mut self) {
        if let Ok(subscriptions) = self.subscriptions.try_lock() {
            for subscription in subscriptions.values() {
                subscription.task.abort();
            }
        }
    }
}
