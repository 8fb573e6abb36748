//! Read side of the engine: device listings joined with their status

use avr_core::{DeviceDescriptor, DeviceId, Status};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::directory::Directory;
use crate::error::StateError;
use crate::gateway::CommandGateway;
use crate::notify::{ChangeEvent, Notifier};
use crate::reconcile::{ReconcileConfig, Reconciler};
use crate::registration::Registrar;
use crate::status::StatusStore;

/// A descriptor joined with its current snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    #[serde(flatten)]
    pub descriptor: DeviceDescriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Status>,
}

impl DeviceView {
    /// A device is ready once it has a status snapshot
    pub fn is_ready(&self) -> bool {
        self.current.is_some()
    }
}

/// Both stores behind one change stream
pub struct DeviceCache {
    notifier: Notifier,
    directory: Arc<Directory>,
    status: Arc<StatusStore>,
}

impl DeviceCache {
    pub fn new(capacity: usize) -> Self {
        let notifier = Notifier::new(capacity);
        Self {
            directory: Arc::new(Directory::new(notifier.clone())),
            status: Arc::new(StatusStore::new(notifier.clone())),
            notifier,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    pub fn status(&self) -> &Arc<StatusStore> {
        &self.status
    }

    pub fn registrar(&self, query_timeout: Duration) -> Registrar {
        Registrar::new(self.directory.clone(), self.status.clone(), query_timeout)
    }

    pub fn reconciler(&self, config: ReconcileConfig) -> Reconciler {
        Reconciler::new(self.directory.clone(), self.status.clone(), config)
    }

    pub fn gateway(&self, timeout: Duration) -> CommandGateway {
        CommandGateway::new(self.directory.clone(), timeout)
    }

    /// Every ready device with its current status, sorted by id
    pub async fn devices(&self) -> Vec<DeviceView> {
        let mut views = Vec::new();
        for device in self.directory.list().await {
            if let Some(current) = self.status.get(device.id()).await {
                views.push(DeviceView {
                    descriptor: device.descriptor,
                    current: Some(current),
                });
            }
        }
        views
    }

    /// One device, ready or not
    pub async fn device(&self, id: &DeviceId) -> Result<DeviceView, StateError> {
        let device = self
            .directory
            .get(id)
            .await
            .ok_or_else(|| StateError::NotFound(id.clone()))?;
        Ok(DeviceView {
            descriptor: device.descriptor,
            current: self.status.get(id).await,
        })
    }

    pub async fn device_status(&self, id: &DeviceId) -> Result<Status, StateError> {
        self.status
            .get(id)
            .await
            .ok_or_else(|| StateError::NotFound(id.clone()))
    }
}
