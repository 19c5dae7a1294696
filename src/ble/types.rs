//! Core types for the Thingy:52 bridge: sensor readings, actuator commands,
//! configuration records, and the error taxonomy.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// A peripheral seen during a scan.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredPeripheral {
    /// Platform identifier: MAC address on Linux/Windows, opaque UUID on macOS.
    pub address: String,
    /// Advertised name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// 3D vector for accelerometer/gyroscope/magnetometer readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Create a new vector with specified components.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Device orientation as reported by the motion fusion firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    Landscape,
    ReversePortrait,
    ReverseLandscape,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Landscape => write!(f, "landscape"),
            Orientation::ReversePortrait => write!(f, "reverse_portrait"),
            Orientation::ReverseLandscape => write!(f, "reverse_landscape"),
        }
    }
}

/// A decoded sensor value.
///
/// Every reading is the product of exactly one decode of a well-formed
/// payload; partial payloads surface as [`CodecError`]s, never as zero-filled
/// readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "sensor", rename_all = "snake_case")]
pub enum SensorReading {
    Temperature { celsius: f64 },
    Humidity { percent: u8 },
    Pressure { hpa: f64 },
    AirQuality { co2_ppm: u16, tvoc_ppb: u16 },
    Color { red: u16, green: u16, blue: u16, clear: u16 },
    Light { lux: f32 },
    StepCount { steps: u32, elapsed_ms: u32 },
    Quaternion { w: f64, x: f64, y: f64, z: f64 },
    Euler { roll_deg: f64, pitch_deg: f64, yaw_deg: f64 },
    Heading { deg: f64 },
    Orientation { orientation: Orientation },
    RawMotion { accel: Vec3, gyro: Vec3, mag: Vec3 },
    TapEvent { direction: u8, count: u8 },
    Battery { percent: u8 },
}

/// LED actuation command; one four-byte frame per command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedCommand {
    Off,
    /// Constant color from explicit RGB components.
    Constant { red: u8, green: u8, blue: u8 },
    /// Breathing effect using a firmware color code (1..=7).
    ///
    /// `delay_ms` is validated at the tool surface (50..=10000) but the
    /// four-byte frame carries no delay field.
    Breathe { color_code: u8, intensity: u8, delay_ms: u16 },
    /// Single pulse using a firmware color code (1..=7).
    OneShot { color_code: u8, intensity: u8 },
}

/// Speaker actuation command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCommand {
    /// One of the eight preset samples stored in firmware.
    PresetSound { id: u8 },
    /// Shorthand for preset sample 1.
    Beep,
}

/// Motion service configuration record (9 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionConfig {
    /// Step counter update interval in milliseconds.
    pub step_interval_ms: u16,
    /// Temperature compensation interval in milliseconds.
    pub temp_comp_interval_ms: u16,
    /// Magnetometer compensation interval in milliseconds.
    pub mag_comp_interval_ms: u16,
    /// Motion processing frequency in Hz (max 200).
    pub motion_freq_hz: u16,
    /// Enable wake on motion.
    pub wake_on_motion: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            step_interval_ms: 1000,
            temp_comp_interval_ms: 5000,
            mag_comp_interval_ms: 5000,
            motion_freq_hz: 200,
            wake_on_motion: true,
        }
    }
}

/// Environment service configuration record (9 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentConfig {
    /// Temperature update interval in milliseconds.
    pub temp_interval_ms: u16,
    /// Pressure update interval in milliseconds.
    pub pressure_interval_ms: u16,
    /// Humidity update interval in milliseconds.
    pub humidity_interval_ms: u16,
    /// Color sensor update interval in milliseconds.
    pub color_interval_ms: u16,
    /// Gas sensor sampling mode: 1 = 1 s, 2 = 10 s, 3 = 60 s.
    pub gas_mode: u8,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            temp_interval_ms: 1000,
            pressure_interval_ms: 1000,
            humidity_interval_ms: 1000,
            color_interval_ms: 1000,
            gas_mode: 1,
        }
    }
}

/// Partial update applied read-modify-write onto the environment
/// configuration record; `None` fields keep the device's current value.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentUpdate {
    pub temp_interval_ms: Option<u16>,
    pub pressure_interval_ms: Option<u16>,
    pub humidity_interval_ms: Option<u16>,
    pub color_interval_ms: Option<u16>,
    pub gas_mode: Option<u8>,
}

impl EnvironmentUpdate {
    /// Apply this update on top of an existing record.
    pub fn apply(&self, base: EnvironmentConfig) -> EnvironmentConfig {
        EnvironmentConfig {
            temp_interval_ms: self.temp_interval_ms.unwrap_or(base.temp_interval_ms),
            pressure_interval_ms: self.pressure_interval_ms.unwrap_or(base.pressure_interval_ms),
            humidity_interval_ms: self.humidity_interval_ms.unwrap_or(base.humidity_interval_ms),
            color_interval_ms: self.color_interval_ms.unwrap_or(base.color_interval_ms),
            gas_mode: self.gas_mode.unwrap_or(base.gas_mode),
        }
    }
}

/// Timeouts and retry behavior for the session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Default scan duration.
    pub scan_timeout: Duration,
    /// Timeout for connection establishment including service discovery.
    pub connect_timeout: Duration,
    /// Per-characteristic wait for a notification payload.
    pub read_timeout: Duration,
    /// Timeout for characteristic writes.
    pub write_timeout: Duration,
    /// Pause before the single internal retry of a timed-out read or write.
    pub retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Payload parse failure from a codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {what} payload: expected {expected_len} bytes, got {got_len}")]
pub struct CodecError {
    /// Byte count the codec requires.
    pub expected_len: usize,
    /// Byte count actually received.
    pub got_len: usize,
    /// Which characteristic's payload failed to parse.
    pub what: &'static str,
}

impl CodecError {
    pub(crate) fn new(what: &'static str, expected_len: usize, got_len: usize) -> Self {
        Self {
            expected_len,
            got_len,
            what,
        }
    }
}

/// Errors surfaced by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No usable Bluetooth adapter on this host.
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// The platform BLE stack refused a concurrent operation.
    #[error("Bluetooth adapter busy: {0}")]
    AdapterBusy(String),

    /// No peripheral with the requested address.
    #[error("peripheral not found: {0}")]
    NotFound(String),

    /// The firmware refused the operation (e.g. direct read of a
    /// notify-only characteristic).
    #[error("operation not permitted by peripheral: {0}")]
    NotPermitted(String),

    /// The operation did not complete in time.
    #[error("BLE operation timed out")]
    Timeout,

    /// The link dropped mid-operation.
    #[error("BLE link lost")]
    LinkLost,

    /// Any other platform BLE stack error.
    #[error("BLE error: {0}")]
    Ble(String),
}

/// Errors surfaced by the session, classified per the bridge error taxonomy.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A connected-only operation was invoked while disconnected.
    #[error("not connected to a device")]
    NotConnected,

    /// A conflicting state transition or duplicate waiter was attempted.
    #[error("session busy: {0}")]
    Busy(String),

    /// The operation (including its single retry) timed out.
    #[error("operation timed out")]
    Timeout,

    /// The link dropped; the session is now disconnected.
    #[error("link lost")]
    LinkLost,

    /// Argument range violation caught before any BLE interaction.
    #[error("invalid {field}: {reason}")]
    InvalidArgument {
        field: &'static str,
        reason: &'static str,
    },

    /// A characteristic payload failed to parse.
    #[error("malformed payload from {uuid}: {source}")]
    MalformedPayload {
        uuid: Uuid,
        #[source]
        source: CodecError,
    },

    /// The firmware refused the operation.
    #[error("not permitted: {0}")]
    NotPermitted(String),

    /// The platform BLE stack refused a concurrent operation.
    #[error("adapter busy: {0}")]
    AdapterBusy(String),

    /// No peripheral with the requested address.
    #[error("not found: {0}")]
    NotFound(String),

    /// Motion fusion read attempted before motion was configured.
    #[error("motion not configured; call configure_motion first")]
    NotConfigured,

    /// Any other transport failure.
    #[error(transparent)]
    Transport(TransportError),
}

impl SessionError {
    /// Classify a transport error at the session boundary.
    pub fn from_transport(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => SessionError::Timeout,
            TransportError::LinkLost => SessionError::LinkLost,
            TransportError::NotPermitted(msg) => SessionError::NotPermitted(msg),
            TransportError::AdapterBusy(msg) => SessionError::AdapterBusy(msg),
            TransportError::NotFound(addr) => SessionError::NotFound(addr),
            TransportError::AdapterNotFound => {
                SessionError::NotFound("bluetooth adapter".to_string())
            }
            other => SessionError::Transport(other),
        }
    }

    /// Stable error kind string advertised through the tool surface.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::NotConnected => "NotConnected",
            SessionError::Busy(_) => "BusyError",
            SessionError::Timeout => "Timeout",
            SessionError::LinkLost => "LinkLost",
            SessionError::InvalidArgument { .. } => "InvalidArgument",
            SessionError::MalformedPayload { .. } => "MalformedPayload",
            SessionError::NotPermitted(_) => "NotPermitted",
            SessionError::AdapterBusy(_) => "AdapterBusy",
            SessionError::NotFound(_) => "NotFound",
            SessionError::NotConfigured => "NotConfigured",
            // Unclassified stack errors do not imply a dead link; the session
            // stays connected, so the reported kind must not say otherwise.
            SessionError::Transport(_) => "BleError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::new("temperature", 2, 1);
        assert_eq!(
            err.to_string(),
            "malformed temperature payload: expected 2 bytes, got 1"
        );
    }

    #[test]
    fn test_transport_error_classification() {
        assert_eq!(
            SessionError::from_transport(TransportError::Timeout).kind(),
            "Timeout"
        );
        assert_eq!(
            SessionError::from_transport(TransportError::LinkLost).kind(),
            "LinkLost"
        );
        assert_eq!(
            SessionError::from_transport(TransportError::NotPermitted("read".into())).kind(),
            "NotPermitted"
        );
        assert_eq!(
            SessionError::from_transport(TransportError::NotFound("AA".into())).kind(),
            "NotFound"
        );
        // An unclassified stack error must not masquerade as a lost link:
        // the session stays connected after it.
        assert_eq!(
            SessionError::from_transport(TransportError::Ble("gatt failure".into())).kind(),
            "BleError"
        );
    }

    #[test]
    fn test_default_session_config() {
        let config = SessionConfig::default();
        assert_eq!(config.scan_timeout, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_orientation_serde_names() {
        let json = serde_json::to_string(&Orientation::ReversePortrait).unwrap();
        assert_eq!(json, "\"reverse_portrait\"");
    }
}
