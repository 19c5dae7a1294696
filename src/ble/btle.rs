//! btleplug-backed transport implementation.
//!
//! One adapter, one peripheral link at a time. The link owns a single
//! notification pump task that fans payloads out to the sinks registered by
//! [`Link::subscribe`], and a monitor task that turns adapter disconnect
//! events into [`LinkEvent::Disconnected`].

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::ble::transport::{Link, LinkEvent, NotificationSink, Transport};
use crate::ble::types::{DiscoveredPeripheral, TransportError};
use crate::ble::uuids::ENVIRONMENT_SERVICE_UUID;

/// Peripherals whose advertised name contains this fragment are Thingys.
const THINGY_NAME_FRAGMENT: &str = "Thingy";

fn map_btle_err(err: btleplug::Error) -> TransportError {
    match err {
        btleplug::Error::TimedOut(_) => TransportError::Timeout,
        btleplug::Error::DeviceNotFound => TransportError::NotFound("peripheral".to_string()),
        btleplug::Error::NotConnected => TransportError::LinkLost,
        btleplug::Error::PermissionDenied => {
            TransportError::NotPermitted("permission denied".to_string())
        }
        btleplug::Error::NotSupported(what) => TransportError::NotPermitted(what),
        other => {
            let message = other.to_string();
            if message.to_ascii_lowercase().contains("not permitted") {
                TransportError::NotPermitted(message)
            } else {
                TransportError::Ble(message)
            }
        }
    }
}

/// Transport over the first available platform Bluetooth adapter.
pub struct BtleTransport {
    adapter: Adapter,
}

impl BtleTransport {
    /// Initialize the platform BLE stack and claim the first adapter.
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await.map_err(map_btle_err)?;
        let adapters = manager.adapters().await.map_err(map_btle_err)?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(TransportError::AdapterNotFound)?;

        tracing::info!("BLE adapter initialized");
        Ok(Self { adapter })
    }

    async fn peripheral_by_address(&self, address: &str) -> Result<Peripheral, TransportError> {
        let peripherals = self.adapter.peripherals().await.map_err(map_btle_err)?;

        peripherals
            .into_iter()
            .find(|p| p.id().to_string() == address)
            .ok_or_else(|| TransportError::NotFound(address.to_string()))
    }
}

/// True when the advertisement marks a Thingy:52.
fn is_thingy(name: Option<&str>, services: &[Uuid]) -> bool {
    name.map(|n| n.contains(THINGY_NAME_FRAGMENT)).unwrap_or(false)
        || services.contains(&ENVIRONMENT_SERVICE_UUID)
}

#[async_trait]
impl Transport for BtleTransport {
    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredPeripheral>, TransportError> {
        tracing::info!(timeout_secs = timeout.as_secs(), "starting BLE scan");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::AdapterBusy(e.to_string()))?;

        tokio::time::sleep(timeout).await;

        if let Err(e) = self.adapter.stop_scan().await {
            tracing::warn!("failed to stop scan: {}", e);
        }

        let mut discovered = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for peripheral in self.adapter.peripherals().await.map_err(map_btle_err)? {
            let Some(properties) = peripheral.properties().await.map_err(map_btle_err)? else {
                continue;
            };
            if !is_thingy(properties.local_name.as_deref(), &properties.services) {
                continue;
            }

            let address = peripheral.id().to_string();
            if !seen.insert(address.clone()) {
                continue;
            }

            tracing::debug!(
                address = %address,
                name = ?properties.local_name,
                rssi = ?properties.rssi,
                "found Thingy"
            );
            discovered.push(DiscoveredPeripheral {
                address,
                name: properties.local_name,
                rssi: properties.rssi,
            });
        }

        tracing::info!("scan finished: {} Thingy peripheral(s)", discovered.len());
        Ok(discovered)
    }

    async fn connect(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn Link>, TransportError> {
        tracing::info!(address = %address, "connecting");

        let peripheral = self.peripheral_by_address(address).await?;

        tokio::time::timeout(timeout, peripheral.connect())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(map_btle_err)?;

        peripheral.discover_services().await.map_err(map_btle_err)?;

        let name = peripheral
            .properties()
            .await
            .ok()
            .flatten()
            .and_then(|p| p.local_name);

        tracing::info!(address = %address, name = ?name, "connected");
        Ok(Box::new(BtleLink::new(
            self.adapter.clone(),
            peripheral,
            address.to_string(),
            name,
        )))
    }
}

/// An established btleplug link to one Thingy.
pub struct BtleLink {
    peripheral: Peripheral,
    address: String,
    name: Option<String>,
    event_tx: broadcast::Sender<LinkEvent>,
    sinks: Arc<Mutex<HashMap<Uuid, NotificationSink>>>,
    pump: tokio::task::JoinHandle<()>,
    monitor: tokio::task::JoinHandle<()>,
}

impl BtleLink {
    fn new(adapter: Adapter, peripheral: Peripheral, address: String, name: Option<String>) -> Self {
        let (event_tx, _) = broadcast::channel(4);
        let sinks: Arc<Mutex<HashMap<Uuid, NotificationSink>>> = Arc::new(Mutex::new(HashMap::new()));

        let pump = tokio::spawn(Self::pump_notifications(
            peripheral.clone(),
            sinks.clone(),
            event_tx.clone(),
        ));
        let monitor = tokio::spawn(Self::monitor_disconnect(
            adapter,
            peripheral.id(),
            event_tx.clone(),
        ));

        Self {
            peripheral,
            address,
            name,
            event_tx,
            sinks,
            pump,
            monitor,
        }
    }

    /// Fan incoming notifications out to the sink registered for each UUID.
    async fn pump_notifications(
        peripheral: Peripheral,
        sinks: Arc<Mutex<HashMap<Uuid, NotificationSink>>>,
        event_tx: broadcast::Sender<LinkEvent>,
    ) {
        let mut stream = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("failed to open notification stream: {}", e);
                let _ = event_tx.send(LinkEvent::Disconnected);
                return;
            }
        };

        while let Some(notification) = stream.next().await {
            let sink = sinks.lock().await.get(&notification.uuid).cloned();
            if let Some(sink) = sink {
                tracing::debug!(uuid = %notification.uuid, len = notification.value.len(), "notification");
                let _ = sink.send(notification.value).await;
            }
        }

        // Stream end means the peripheral is gone.
        let _ = event_tx.send(LinkEvent::Disconnected);
    }

    /// Watch adapter events for a disconnect of this peripheral.
    async fn monitor_disconnect(
        adapter: Adapter,
        id: btleplug::platform::PeripheralId,
        event_tx: broadcast::Sender<LinkEvent>,
    ) {
        let mut events = match adapter.events().await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("failed to get adapter events: {}", e);
                return;
            }
        };

        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(disconnected) = event {
                if disconnected == id {
                    tracing::warn!("peripheral disconnected");
                    let _ = event_tx.send(LinkEvent::Disconnected);
                    return;
                }
            }
        }
    }

    fn find_characteristic(&self, uuid: Uuid) -> Result<Characteristic, TransportError> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| TransportError::Ble(format!("characteristic {} not found", uuid)))
    }
}

#[async_trait]
impl Link for BtleLink {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn events(&self) -> broadcast::Receiver<LinkEvent> {
        self.event_tx.subscribe()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.pump.abort();
        self.monitor.abort();

        if let Err(e) = self.peripheral.disconnect().await {
            // Idempotent: a link that is already down is not an error.
            tracing::debug!("disconnect on closed link: {}", e);
        }
        Ok(())
    }

    async fn read_char(&self, uuid: Uuid) -> Result<Vec<u8>, TransportError> {
        let characteristic = self.find_characteristic(uuid)?;
        if !characteristic.properties.contains(CharPropFlags::READ) {
            return Err(TransportError::NotPermitted(format!(
                "characteristic {} does not support read",
                uuid
            )));
        }

        self.peripheral
            .read(&characteristic)
            .await
            .map_err(map_btle_err)
    }

    async fn write_char(
        &self,
        uuid: Uuid,
        payload: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError> {
        let characteristic = self.find_characteristic(uuid)?;
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        self.peripheral
            .write(&characteristic, payload, write_type)
            .await
            .map_err(map_btle_err)
    }

    async fn subscribe(&self, uuid: Uuid, sink: NotificationSink) -> Result<(), TransportError> {
        let characteristic = self.find_characteristic(uuid)?;

        self.sinks.lock().await.insert(uuid, sink);
        if let Err(e) = self.peripheral.subscribe(&characteristic).await {
            self.sinks.lock().await.remove(&uuid);
            return Err(map_btle_err(e));
        }

        tracing::debug!(uuid = %uuid, "subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, uuid: Uuid) -> Result<(), TransportError> {
        if self.sinks.lock().await.remove(&uuid).is_none() {
            // Idempotent: nothing was subscribed.
            return Ok(());
        }

        let characteristic = self.find_characteristic(uuid)?;
        self.peripheral
            .unsubscribe(&characteristic)
            .await
            .map_err(map_btle_err)?;

        tracing::debug!(uuid = %uuid, "unsubscribed");
        Ok(())
    }
}

impl Drop for BtleLink {
    fn drop(&mut self) {
        self.pump.abort();
        self.monitor.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_thingy_by_name() {
        assert!(is_thingy(Some("Thingy"), &[]));
        assert!(is_thingy(Some("MyThingy52"), &[]));
        assert!(!is_thingy(Some("HeartRateBand"), &[]));
        assert!(!is_thingy(None, &[]));
    }

    #[test]
    fn test_is_thingy_by_service() {
        assert!(is_thingy(None, &[ENVIRONMENT_SERVICE_UUID]));
        assert!(!is_thingy(None, &[Uuid::from_u128(0x1234)]));
    }
}
