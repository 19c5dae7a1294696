//! Thingy:52 MCP bridge.
//!
//! Exposes a single Nordic Thingy:52 BLE peripheral as a set of Model
//! Context Protocol tools: device discovery and connection, environment and
//! motion sensor reads, LED and speaker control. The heart of the crate is
//! the BLE session layer, which serializes every GATT transaction and
//! implements the notification-based read pattern the Thingy firmware
//! requires.

pub mod ble;
pub mod server;
pub mod tools;

// Re-export commonly used types
pub use ble::session::{PeripheralInfo, Session};
pub use ble::types::{SensorReading, SessionConfig, SessionError};
pub use server::ThingyServer;
