//! Transport abstraction over the platform BLE stack.
//!
//! The session talks to these traits, never to btleplug directly, so tests
//! can drive it with a scripted transport. The transport performs no mutual
//! exclusion; serializing operations on the link is the session's job.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::ble::types::{DiscoveredPeripheral, TransportError};

/// Delivery sink for characteristic notifications.
///
/// The transport pushes each notification payload for a subscribed
/// characteristic into its sink until the characteristic is unsubscribed.
pub type NotificationSink = mpsc::Sender<Vec<u8>>;

/// Asynchronous events about the state of an established link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The peripheral dropped the connection (or the stack lost it).
    Disconnected,
}

/// Entry point to the BLE stack: scanning and connection establishment.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Scan for Thingy peripherals for the given duration.
    ///
    /// Results are filtered to peripherals advertising a name containing
    /// "Thingy" or the Environment service UUID, deduplicated by address.
    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredPeripheral>, TransportError>;

    /// Connect to a peripheral by address and discover its services.
    async fn connect(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Box<dyn Link>, TransportError>;
}

/// An established connection to one peripheral.
#[async_trait]
pub trait Link: Send + Sync {
    /// Peripheral address this link is bound to.
    fn address(&self) -> String;

    /// Advertised peripheral name, if known.
    fn name(&self) -> Option<String>;

    /// Subscribe to link-state events. Each call returns a fresh receiver.
    fn events(&self) -> broadcast::Receiver<LinkEvent>;

    /// Tear the link down. Idempotent on an already-closed link.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Direct characteristic read.
    ///
    /// Fails with [`TransportError::NotPermitted`] when the characteristic
    /// does not support read; the caller falls back to a notification read.
    async fn read_char(&self, uuid: Uuid) -> Result<Vec<u8>, TransportError>;

    /// Characteristic write, with or without response.
    async fn write_char(
        &self,
        uuid: Uuid,
        payload: &[u8],
        with_response: bool,
    ) -> Result<(), TransportError>;

    /// Start delivering notifications for `uuid` into `sink`.
    async fn subscribe(&self, uuid: Uuid, sink: NotificationSink) -> Result<(), TransportError>;

    /// Stop delivering notifications for `uuid`. Idempotent.
    async fn unsubscribe(&self, uuid: Uuid) -> Result<(), TransportError>;
}
