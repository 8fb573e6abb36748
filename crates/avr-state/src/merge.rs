//! Push-event merging
//!
//! Drivers push single field changes. Each one is merged over the stored
//! snapshot; a change that arrives before the first snapshot has nothing
//! to merge onto and is dropped.

use avr_core::{DeviceId, DriverEvent, StatusUpdate};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

use crate::error::StateError;
use crate::status::{StatusStore, WriteOutcome};

#[derive(Clone)]
pub struct Merger {
    status: Arc<StatusStore>,
}

impl Merger {
    pub fn new(status: Arc<StatusStore>) -> Self {
        Self { status }
    }

    /// Merge one sparse update for `id`
    pub async fn apply(&self, id: &DeviceId, update: StatusUpdate) -> Option<WriteOutcome> {
        if update.is_empty() {
            return None;
        }
        match self.status.merge(id, &update).await {
            Ok(outcome) => Some(outcome),
            Err(StateError::NotFound(_)) => {
                debug!(device = %id, update = ?update, "No snapshot yet, dropping pushed change");
                None
            }
            Err(e) => {
                error!(device = %id, error = %e, "Failed to merge pushed change");
                None
            }
        }
    }

    /// Merge every event from a driver's push stream until it closes
    pub async fn dispatch(&self, id: DeviceId, mut events: broadcast::Receiver<DriverEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!(device = %id, field = event.field(), "Pushed change");
                    self.apply(&id, StatusUpdate::from(event)).await;
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(device = %id, skipped = n, "Push stream lagged, changes dropped");
                }
                Err(RecvError::Closed) => {
                    debug!(device = %id, "Push stream closed");
                    break;
                }
            }
        }
    }
}
