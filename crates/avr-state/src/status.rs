//! Status store: id -> last complete status snapshot
//!
//! Every write that changes a snapshot publishes exactly one
//! `StatusUpdated` event; writes that leave the snapshot equal are silent.
//! Each entry carries a version that advances on every change, so a writer
//! holding an older read can detect that someone else got there first.
//! Versions come from one store-wide counter and are never reused, even
//! after an entry is removed and written again.

use avr_core::{DeviceId, Status, StatusUpdate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StateError;
use crate::notify::{ChangeEvent, Notifier};

/// Result of a write attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Snapshot changed and a notification was published
    Changed,
    /// Snapshot already held this value; nothing published
    Unchanged,
    /// Snapshot moved on since the caller's read; nothing written
    Conflict,
}

#[derive(Debug, Clone)]
struct Entry {
    status: Status,
    version: u64,
}

pub struct StatusStore {
    entries: RwLock<HashMap<DeviceId, Entry>>,
    /// Last version handed out; only advanced under the entries write lock
    versions: AtomicU64,
    notifier: Notifier,
}

impl StatusStore {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            versions: AtomicU64::new(0),
            notifier,
        }
    }

    /// Replace the snapshot for `id`
    pub async fn set(&self, id: &DeviceId, status: Status) -> WriteOutcome {
        let mut entries = self.entries.write().await;
        self.write_locked(&mut entries, id, status)
    }

    /// Replace the snapshot only if its version is still `expected`
    ///
    /// Version 0 means "no snapshot yet".
    pub async fn set_if_unchanged(
        &self,
        id: &DeviceId,
        expected: u64,
        status: Status,
    ) -> WriteOutcome {
        let mut entries = self.entries.write().await;
        let current = entries.get(id).map(|e| e.version).unwrap_or(0);
        if current != expected {
            debug!(device = %id, expected, current, "Snapshot changed during query, skipping write");
            return WriteOutcome::Conflict;
        }
        self.write_locked(&mut entries, id, status)
    }

    /// Merge a sparse update over the current snapshot and store the result
    ///
    /// The read, merge and write happen under one lock, so no other writer
    /// can interleave. Fails with `NotFound` when no snapshot exists yet.
    pub async fn merge(&self, id: &DeviceId, update: &StatusUpdate) -> Result<WriteOutcome, StateError> {
        let mut entries = self.entries.write().await;
        let merged = match entries.get(id) {
            Some(entry) => update.apply(&entry.status),
            None => return Err(StateError::NotFound(id.clone())),
        };
        Ok(self.write_locked(&mut entries, id, merged))
    }

    fn write_locked(
        &self,
        entries: &mut HashMap<DeviceId, Entry>,
        id: &DeviceId,
        status: Status,
    ) -> WriteOutcome {
        match entries.get_mut(id) {
            Some(entry) if entry.status == status => WriteOutcome::Unchanged,
            Some(entry) => {
                entry.status = status.clone();
                entry.version = self.next_version();
                self.publish(id, status);
                WriteOutcome::Changed
            }
            None => {
                entries.insert(
                    id.clone(),
                    Entry {
                        status: status.clone(),
                        version: self.next_version(),
                    },
                );
                self.publish(id, status);
                WriteOutcome::Changed
            }
        }
    }

    fn next_version(&self) -> u64 {
        self.versions.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn publish(&self, id: &DeviceId, status: Status) {
        debug!(device = %id, status = ?status, "Status changed");
        self.notifier.publish(ChangeEvent::StatusUpdated {
            id: id.clone(),
            status,
        });
    }

    pub async fn get(&self, id: &DeviceId) -> Option<Status> {
        self.entries.read().await.get(id).map(|e| e.status.clone())
    }

    /// Current version of a snapshot, 0 if there is none
    pub async fn version(&self, id: &DeviceId) -> u64 {
        self.entries.read().await.get(id).map(|e| e.version).unwrap_or(0)
    }

    /// All snapshots, sorted by id
    pub async fn list(&self) -> Vec<(DeviceId, Status)> {
        let mut all: Vec<(DeviceId, Status)> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, e)| (id.clone(), e.status.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Drop a snapshot without publishing
    pub async fn remove(&self, id: &DeviceId) -> Option<Status> {
        self.entries.write().await.remove(id).map(|e| e.status)
    }
}
