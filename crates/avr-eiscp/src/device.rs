//! A connected eISCP receiver exposed as a `DeviceDriver`
//!
//! One TCP connection per receiver. A background reader task owns the read
//! half: every message it receives is handed to queries waiting on that
//! command and also published as a push event, since receivers announce
//! state changes with the same messages they use to answer queries.

use async_trait::async_trait;
use avr_core::{DeviceDriver, DriverError, DriverEvent};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::codes;
use crate::packet::Message;
use crate::transport::{read_message, write_message};

type Waiters = Arc<Mutex<HashMap<String, Vec<oneshot::Sender<String>>>>>;
type EventSender = Arc<Mutex<Option<broadcast::Sender<DriverEvent>>>>;

/// Push event channel depth per receiver
const EVENT_CAPACITY: usize = 64;

pub struct EiscpDevice {
    address: SocketAddr,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    waiters: Waiters,
    events: EventSender,
    closed: Arc<AtomicBool>,
    timeout: Duration,
    reader: JoinHandle<()>,
}

impl EiscpDevice {
    /// Connect to a receiver
    ///
    /// `request_timeout` bounds both the connect and every later request.
    pub async fn connect(
        address: SocketAddr,
        request_timeout: Duration,
    ) -> Result<Arc<Self>, DriverError> {
        let stream = timeout(request_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| DriverError::Timeout {
                command: "connect".to_string(),
                timeout: request_timeout,
            })??;
        stream.set_nodelay(true)?;

        info!(address = %address, "Connected to receiver");
        Ok(Arc::new(Self::from_stream(address, stream, request_timeout)))
    }

    fn from_stream(address: SocketAddr, stream: TcpStream, request_timeout: Duration) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let waiters: Waiters = Arc::new(Mutex::new(HashMap::new()));
        let events: EventSender = Arc::new(Mutex::new(Some(event_tx)));
        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_loop(
            address,
            read_half,
            waiters.clone(),
            events.clone(),
            closed.clone(),
        ));

        Self {
            address,
            writer: tokio::sync::Mutex::new(write_half),
            waiters,
            events,
            closed,
            timeout: request_timeout,
            reader,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// True once the connection to the receiver is gone
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a message and wait for the receiver's reply to the same command
    async fn request(&self, command: &str, parameter: &str) -> Result<String, DriverError> {
        if self.is_closed() {
            return Err(DriverError::Disconnected);
        }

        let (tx, rx) = oneshot::channel();
        lock(&self.waiters)
            .entry(command.to_string())
            .or_default()
            .push(tx);

        let written = {
            let mut writer = self.writer.lock().await;
            write_message(&mut *writer, &Message::new(command, parameter)).await
        };
        if let Err(e) = written {
            drop(rx);
            self.prune_waiters(command);
            return Err(e);
        }

        let reply = timeout(self.timeout, rx).await;
        let value = match reply {
            Ok(Ok(value)) => value,
            Ok(Err(_)) => return Err(DriverError::Disconnected),
            Err(_) => {
                self.prune_waiters(command);
                return Err(DriverError::Timeout {
                    command: command.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        if value == codes::NOT_AVAILABLE {
            return Err(DriverError::Unavailable(command.to_string()));
        }
        Ok(value)
    }

    /// Drop waiters whose request gave up
    fn prune_waiters(&self, command: &str) {
        let mut waiters = lock(&self.waiters);
        if let Some(pending) = waiters.get_mut(command) {
            pending.retain(|tx| !tx.is_closed());
            if pending.is_empty() {
                waiters.remove(command);
            }
        }
    }

    #[cfg(test)]
    fn pending_waiters(&self, command: &str) -> usize {
        lock(&self.waiters).get(command).map(Vec::len).unwrap_or(0)
    }

    async fn query(&self, command: &str) -> Result<String, DriverError> {
        self.request(command, codes::QUERY).await
    }
}

impl Drop for EiscpDevice {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl DeviceDriver for EiscpDevice {
    async fn is_on(&self) -> Result<bool, DriverError> {
        let value = self.query(codes::POWER).await?;
        codes::parse_bool(codes::POWER, &value)
    }

    async fn volume(&self) -> Result<u32, DriverError> {
        let value = self.query(codes::VOLUME).await?;
        codes::parse_volume(&value)
    }

    async fn mute(&self) -> Result<bool, DriverError> {
        let value = self.query(codes::MUTE).await?;
        codes::parse_bool(codes::MUTE, &value)
    }

    async fn source(&self) -> Result<String, DriverError> {
        let value = self.query(codes::SOURCE).await?;
        Ok(codes::source_name(&value))
    }

    async fn sound_mode(&self) -> Result<String, DriverError> {
        let value = self.query(codes::SOUND_MODE).await?;
        Ok(codes::sound_mode_name(&value))
    }

    async fn power_on(&self) -> Result<(), DriverError> {
        self.request(codes::POWER, codes::ON).await.map(|_| ())
    }

    async fn power_off(&self) -> Result<(), DriverError> {
        self.request(codes::POWER, codes::OFF).await.map(|_| ())
    }

    fn subscribe(&self) -> broadcast::Receiver<DriverEvent> {
        match lock(&self.events).as_ref() {
            Some(tx) => tx.subscribe(),
            // Connection already gone: hand out a receiver that reports closed
            None => broadcast::channel(1).1,
        }
    }
}

async fn read_loop(
    address: SocketAddr,
    mut reader: OwnedReadHalf,
    waiters: Waiters,
    events: EventSender,
    closed: Arc<AtomicBool>,
) {
    loop {
        let message = match read_message(&mut reader).await {
            Ok(message) => message,
            Err(e) => {
                debug!(address = %address, error = %e, "Receiver connection ended");
                break;
            }
        };

        if let Some(pending) = lock(&waiters).remove(&message.command) {
            for tx in pending {
                let _ = tx.send(message.parameter.clone());
            }
        }

        if let Some(event) = codes::to_event(&message) {
            if let Some(tx) = lock(&events).as_ref() {
                let _ = tx.send(event);
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    // Dropping senders fails pending queries and ends every subscription
    lock(&waiters).clear();
    lock(&events).take();
    info!(address = %address, "Disconnected from receiver");
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
