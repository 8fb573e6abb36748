//! AVR State - Device directory, status cache and reconciliation
//!
//! Two keyed stores share one id space:
//! - `Directory` holds device descriptors with their live driver handles
//! - `StatusStore` holds the last complete status snapshot per device
//!
//! Both publish `ChangeEvent`s through a shared `Notifier`. Status reaches
//! the store along two paths: pushed field changes merged by the `Merger`,
//! and full snapshots re-queried by the `Reconciler`.

pub mod cache;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod merge;
pub mod notify;
pub mod query;
pub mod reconcile;
pub mod registration;
pub mod status;

#[cfg(test)]
pub(crate) mod mock;

pub use cache::{DeviceCache, DeviceView};
pub use directory::Directory;
pub use error::StateError;
pub use gateway::CommandGateway;
pub use merge::Merger;
pub use notify::{ChangeEvent, Notifier};
pub use query::query_status;
pub use reconcile::{PassReport, ReconcileConfig, Reconciler};
pub use registration::Registrar;
pub use status::{StatusStore, WriteOutcome};
