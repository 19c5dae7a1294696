//! Scripted mock transport for session and tool tests.
//!
//! The mock records every transport call in order, tracks how many calls are
//! in flight at once (the session must never allow more than one), and
//! replays scripted notification payloads when a characteristic is
//! subscribed.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use thingy_mcp::ble::transport::{Link, LinkEvent, NotificationSink, Transport};
use thingy_mcp::ble::types::{DiscoveredPeripheral, TransportError};

/// How long the mock takes to "deliver" a queued notification.
const NOTIFY_DELAY: Duration = Duration::from_millis(10);

/// Artificial per-call latency so overlapping calls would be observable.
const CALL_LATENCY: Duration = Duration::from_millis(2);

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ReadChar(Uuid),
    Write(Uuid, Vec<u8>, bool),
    Subscribe(Uuid),
    Unsubscribe(Uuid),
    Disconnect,
}

/// A scripted link to one fake Thingy.
pub struct MockLink {
    address: String,
    name: Option<String>,
    dead: Mutex<bool>,
    calls: Mutex<Vec<Call>>,
    in_flight: Mutex<usize>,
    max_in_flight: Mutex<usize>,
    notify_queues: Mutex<HashMap<Uuid, VecDeque<Vec<u8>>>>,
    readable: Mutex<HashMap<Uuid, Vec<u8>>>,
    missing: Mutex<HashSet<Uuid>>,
    event_tx: broadcast::Sender<LinkEvent>,
}

impl MockLink {
    pub fn new(address: &str, name: Option<&str>) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(4);
        Arc::new(Self {
            address: address.to_string(),
            name: name.map(|n| n.to_string()),
            dead: Mutex::new(false),
            calls: Mutex::new(Vec::new()),
            in_flight: Mutex::new(0),
            max_in_flight: Mutex::new(0),
            notify_queues: Mutex::new(HashMap::new()),
            readable: Mutex::new(HashMap::new()),
            missing: Mutex::new(HashSet::new()),
            event_tx,
        })
    }

    /// Queue a payload to be delivered on the next subscription to `uuid`.
    pub fn queue_notification(&self, uuid: Uuid, payload: &[u8]) {
        self.notify_queues
            .lock()
            .entry(uuid)
            .or_default()
            .push_back(payload.to_vec());
    }

    /// Make `uuid` answer direct reads with `payload`.
    pub fn set_readable(&self, uuid: Uuid, payload: &[u8]) {
        self.readable.lock().insert(uuid, payload.to_vec());
    }

    /// Pretend `uuid` was never discovered on this peripheral; operations
    /// on it fail with an unclassified stack error, as the real transport's
    /// characteristic lookup does.
    pub fn set_missing(&self, uuid: Uuid) {
        self.missing.lock().insert(uuid);
    }

    fn missing_error(&self, uuid: Uuid) -> Option<TransportError> {
        self.missing
            .lock()
            .contains(&uuid)
            .then(|| TransportError::Ble(format!("characteristic {} not found", uuid)))
    }

    /// Simulate an asynchronous link loss.
    pub fn drop_link(&self) {
        *self.dead.lock() = true;
        let _ = self.event_tx.send(LinkEvent::Disconnected);
    }

    /// Every transport call recorded so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Only the characteristic writes, in order.
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write(uuid, payload, with_response) => Some((uuid, payload, with_response)),
                _ => None,
            })
            .collect()
    }

    /// Highest number of simultaneously outstanding transport calls seen.
    pub fn max_in_flight(&self) -> usize {
        *self.max_in_flight.lock()
    }

    fn begin(&self, call: Call) {
        self.calls.lock().push(call);
        let mut in_flight = self.in_flight.lock();
        *in_flight += 1;
        let mut max = self.max_in_flight.lock();
        *max = (*max).max(*in_flight);
    }

    fn end(&self) {
        *self.in_flight.lock() -= 1;
    }

    fn is_dead(&self) -> bool {
        *self.dead.lock()
    }
}

/// `Box<dyn Link>` wrapper so tests keep an inspectable `Arc<MockLink>`.
pub struct MockLinkHandle(pub Arc<MockLink>);

#[async_trait]
impl Link for MockLinkHandle {
    fn address(&self) -> String {
        self.0.address.clone()
    }

    fn name(&self) -> Option<String> {
        self.0.name.clone()
    }

    fn events(&self) -> broadcast::Receiver<LinkEvent> {
        self.0.event_tx.subscribe()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.0.begin(Call::Disconnect);
        tokio::time::sleep(CALL_LATENCY).await;
        *self.0.dead.lock() = true;
        self.0.end();
        Ok(())
    }

    async fn read_char(&self, uuid: Uuid) -> Result<Vec<u8>, TransportError> {
        self.0.begin(Call::ReadChar(uuid));
        tokio::time::sleep(CALL_LATENCY).await;
        let result = if self.0.is_dead() {
            Err(TransportError::LinkLost)
        } else if let Some(e) = self.0.missing_error(uuid) {
            Err(e)
        } else {
            match self.0.readable.lock().get(&uuid) {
                Some(payload) => Ok(payload.clone()),
                None => Err(TransportError::NotPermitted(format!(
                    "characteristic {} does not support read",
                    uuid
                ))),
            }
        };
        self.0.end();
        result
    }

    async fn write_char(
        &self,
        uuid: Uuid,
        payload: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError> {
        self.0
            .begin(Call::Write(uuid, payload.to_vec(), with_response));
        tokio::time::sleep(CALL_LATENCY).await;
        let result = if self.0.is_dead() {
            Err(TransportError::LinkLost)
        } else if let Some(e) = self.0.missing_error(uuid) {
            Err(e)
        } else {
            Ok(())
        };
        self.0.end();
        result
    }

    async fn subscribe(&self, uuid: Uuid, sink: NotificationSink) -> Result<(), TransportError> {
        self.0.begin(Call::Subscribe(uuid));
        tokio::time::sleep(CALL_LATENCY).await;
        if self.0.is_dead() {
            self.0.end();
            return Err(TransportError::LinkLost);
        }
        if let Some(e) = self.0.missing_error(uuid) {
            self.0.end();
            return Err(e);
        }

        let payload = self
            .0
            .notify_queues
            .lock()
            .get_mut(&uuid)
            .and_then(|queue| queue.pop_front());
        if let Some(payload) = payload {
            tokio::spawn(async move {
                tokio::time::sleep(NOTIFY_DELAY).await;
                let _ = sink.send(payload).await;
            });
        }

        self.0.end();
        Ok(())
    }

    async fn unsubscribe(&self, uuid: Uuid) -> Result<(), TransportError> {
        self.0.begin(Call::Unsubscribe(uuid));
        tokio::time::sleep(CALL_LATENCY).await;
        self.0.end();
        Ok(())
    }
}

/// Transport whose scan results and connectable links are scripted.
pub struct MockTransport {
    scan_results: Mutex<Vec<DiscoveredPeripheral>>,
    links: Mutex<Vec<Arc<MockLink>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scan_results: Mutex::new(Vec::new()),
            links: Mutex::new(Vec::new()),
        })
    }

    pub fn add_scan_result(&self, address: &str, name: Option<&str>, rssi: i16) {
        self.scan_results.lock().push(DiscoveredPeripheral {
            address: address.to_string(),
            name: name.map(|n| n.to_string()),
            rssi: Some(rssi),
        });
    }

    /// Make `link` available for one future connect to its address.
    pub fn add_link(&self, link: Arc<MockLink>) {
        self.links.lock().push(link);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn scan(&self, _timeout: Duration) -> Result<Vec<DiscoveredPeripheral>, TransportError> {
        Ok(self.scan_results.lock().clone())
    }

    async fn connect(
        &self,
        address: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn Link>, TransportError> {
        let mut links = self.links.lock();
        let position = links
            .iter()
            .position(|l| l.address == address)
            .ok_or_else(|| TransportError::NotFound(address.to_string()))?;
        let link = links.remove(position);
        Ok(Box::new(MockLinkHandle(link)))
    }
}
