//! In-memory driver used by the state engine tests

use async_trait::async_trait;
use avr_core::{DeviceDescriptor, DeviceDriver, DeviceId, DriverError, DriverEvent, PowerState, Status, StatusUpdate};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub fn descriptor(id: &str, name: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(DeviceId::from(id), name.to_string())
}

pub fn snapshot() -> Status {
    Status {
        on: false,
        volume: 20,
        mute: false,
        source: "TV".to_string(),
        sound_mode: "stereo".to_string(),
    }
}

pub struct MockDriver {
    status: Mutex<Status>,
    failure: Mutex<Option<DriverError>>,
    delay: Mutex<Option<Duration>>,
    events: Mutex<Option<broadcast::Sender<DriverEvent>>>,
    power_calls: Mutex<Vec<PowerState>>,
    power_queries: AtomicUsize,
}

impl MockDriver {
    pub fn new(status: Status) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            status: Mutex::new(status),
            failure: Mutex::new(None),
            delay: Mutex::new(None),
            events: Mutex::new(Some(tx)),
            power_calls: Mutex::new(Vec::new()),
            power_queries: AtomicUsize::new(0),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new(snapshot()))
    }

    pub fn with_status(status: Status) -> Arc<Self> {
        Arc::new(Self::new(status))
    }

    /// Change what the device reports without pushing an event
    pub fn set_status(&self, status: Status) {
        *self.status.lock().unwrap() = status;
    }

    /// Make every query and command fail with `error`
    pub fn fail_with(&self, error: DriverError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn set_failure(&self, error: Option<DriverError>) {
        *self.failure.lock().unwrap() = error;
    }

    /// Make every query and command take `delay` before answering
    pub fn stall(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Apply a field change and push it to subscribers
    pub fn push(&self, event: DriverEvent) {
        {
            let mut status = self.status.lock().unwrap();
            *status = StatusUpdate::from(event.clone()).apply(&status);
        }
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Drop the event sender so every subscription ends
    pub fn close(&self) {
        self.events.lock().unwrap().take();
    }

    pub fn power_calls(&self) -> Vec<PowerState> {
        self.power_calls.lock().unwrap().clone()
    }

    /// Number of power queries seen; one per full status query
    pub fn power_queries(&self) -> usize {
        self.power_queries.load(Ordering::SeqCst)
    }

    async fn answer<T>(&self, read: impl FnOnce(&Status) -> T) -> Result<T, DriverError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(read(&self.status.lock().unwrap()))
    }

    async fn command(&self, state: PowerState) -> Result<(), DriverError> {
        self.power_calls.lock().unwrap().push(state);
        self.answer(|_| ()).await?;
        self.status.lock().unwrap().on = state == PowerState::On;
        Ok(())
    }
}

#[async_trait]
impl DeviceDriver for MockDriver {
    async fn is_on(&self) -> Result<bool, DriverError> {
        self.power_queries.fetch_add(1, Ordering::SeqCst);
        self.answer(|s| s.on).await
    }

    async fn volume(&self) -> Result<u32, DriverError> {
        self.answer(|s| s.volume).await
    }

    async fn mute(&self) -> Result<bool, DriverError> {
        self.answer(|s| s.mute).await
    }

    async fn source(&self) -> Result<String, DriverError> {
        self.answer(|s| s.source.clone()).await
    }

    async fn sound_mode(&self) -> Result<String, DriverError> {
        self.answer(|s| s.sound_mode.clone()).await
    }

    async fn power_on(&self) -> Result<(), DriverError> {
        self.command(PowerState::On).await
    }

    async fn power_off(&self) -> Result<(), DriverError> {
        self.command(PowerState::Off).await
    }

    fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        match self.events.lock().unwrap().as_ref() {
            Some(tx) => tx.subscribe(),
            None => broadcast::channel(1).1,
        }
    }
}
