//! BLE core: UUID registry, byte codecs, transport abstraction, and the
//! single-peripheral session.

pub mod btle;
pub mod codec;
pub mod session;
pub mod transport;
pub mod types;
pub mod uuids;

pub use session::{PeripheralInfo, Session};
pub use transport::{Link, LinkEvent, NotificationSink, Transport};
pub use types::{
    CodecError, DiscoveredPeripheral, EnvironmentConfig, EnvironmentUpdate, LedCommand,
    MotionConfig, Orientation, SensorReading, SessionConfig, SessionError, SoundCommand,
    TransportError, Vec3,
};
