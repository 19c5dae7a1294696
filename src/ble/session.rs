//! Single-peripheral session: the connection state machine, the operation
//! lock that serializes every GATT transaction, and the notification-based
//! read pattern most Thingy characteristics require.
//!
//! Many Thingy sensor characteristics reject direct reads with "not
//! permitted"; the only way to sample them is subscribe, wait for the next
//! notification the firmware emits, then unsubscribe. The session implements
//! that as one composite operation whose cleanup runs on every exit path,
//! including cancellation of the surrounding tool call.

use parking_lot::Mutex as SyncMutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::ble::codec;
use crate::ble::transport::{Link, LinkEvent, Transport};
use crate::ble::types::{
    DiscoveredPeripheral, EnvironmentConfig, EnvironmentUpdate, LedCommand, MotionConfig,
    SensorReading, SessionConfig, SessionError, SoundCommand, TransportError,
};
use crate::ble::uuids;

/// How the session samples a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPolicy {
    /// Try a direct read first, fall back to a notification read when the
    /// firmware refuses it.
    DirectFirst,
    /// Subscribe and wait for the next notification; never read directly.
    NotifyOnly,
}

/// Connection state of the session.
enum LinkState {
    Disconnected,
    Connecting,
    Connected(Active),
    Disconnecting,
}

struct Active {
    link: Arc<dyn Link>,
    address: String,
    name: Option<String>,
    /// Set once the motion configuration record has been written on this link.
    motion_configured: Arc<AtomicBool>,
    monitor: tokio::task::JoinHandle<()>,
}

/// Peripheral identity returned by connect and status calls.
#[derive(Debug, Clone)]
pub struct PeripheralInfo {
    pub address: String,
    pub name: Option<String>,
}

/// Owns the one active BLE link and serializes every operation on it.
pub struct Session {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    state: Mutex<LinkState>,
    /// Held for the full duration of every operation that touches the link,
    /// including the subscribe/wait/unsubscribe triple.
    op_lock: Mutex<()>,
    /// Single-slot pending notification deliveries, keyed by characteristic.
    waiters: Arc<SyncMutex<HashSet<Uuid>>>,
    /// Handle to ourselves for the per-connection link monitor task.
    weak: Weak<Session>,
}

impl Session {
    /// Create a session over the given transport, starting disconnected.
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            transport,
            config,
            state: Mutex::new(LinkState::Disconnected),
            op_lock: Mutex::new(()),
            waiters: Arc::new(SyncMutex::new(HashSet::new())),
            weak: weak.clone(),
        })
    }

    /// Scan for Thingy peripherals.
    pub async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredPeripheral>, SessionError> {
        self.transport
            .scan(timeout)
            .await
            .map_err(SessionError::from_transport)
    }

    /// Connect to a peripheral. Rejected with a busy error from any state
    /// other than disconnected.
    pub async fn connect(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<PeripheralInfo, SessionError> {
        {
            let mut state = self.state.lock().await;
            match *state {
                LinkState::Disconnected => *state = LinkState::Connecting,
                LinkState::Connecting => {
                    return Err(SessionError::Busy("connect already in progress".to_string()))
                }
                LinkState::Connected(_) => {
                    return Err(SessionError::Busy("already connected".to_string()))
                }
                LinkState::Disconnecting => {
                    return Err(SessionError::Busy("disconnect in progress".to_string()))
                }
            }
        }

        let result = self.transport.connect(address, timeout).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(link) => {
                let link: Arc<dyn Link> = Arc::from(link);
                let info = PeripheralInfo {
                    address: link.address(),
                    name: link.name(),
                };
                let monitor = tokio::spawn(Self::monitor_link(self.weak.clone(), link.events()));
                *state = LinkState::Connected(Active {
                    link,
                    address: info.address.clone(),
                    name: info.name.clone(),
                    motion_configured: Arc::new(AtomicBool::new(false)),
                    monitor,
                });
                tracing::info!(address = %info.address, "session connected");
                Ok(info)
            }
            Err(e) => {
                *state = LinkState::Disconnected;
                Err(SessionError::from_transport(e))
            }
        }
    }

    /// Tear down the active link. Idempotent when already disconnected.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        // Serialize with any in-flight operation before touching the link.
        let _op = self.op_lock.lock().await;

        let active = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, LinkState::Disconnecting) {
                LinkState::Connected(active) => active,
                LinkState::Disconnected => {
                    *state = LinkState::Disconnected;
                    return Ok(());
                }
                other @ LinkState::Connecting => {
                    *state = other;
                    return Err(SessionError::Busy("connect in progress".to_string()));
                }
                LinkState::Disconnecting => {
                    *state = LinkState::Disconnecting;
                    return Err(SessionError::Busy("disconnect in progress".to_string()));
                }
            }
        };

        active.monitor.abort();
        let result = active.link.disconnect().await;

        *self.state.lock().await = LinkState::Disconnected;
        tracing::info!("session disconnected");

        result.map_err(SessionError::from_transport)
    }

    /// True while a peripheral is connected.
    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.lock().await, LinkState::Connected(_))
    }

    /// Identity of the connected peripheral, if any.
    pub async fn peripheral_info(&self) -> Option<PeripheralInfo> {
        match &*self.state.lock().await {
            LinkState::Connected(active) => Some(PeripheralInfo {
                address: active.address.clone(),
                name: active.name.clone(),
            }),
            _ => None,
        }
    }

    /// Watches the transport's link events and flips the session to
    /// disconnected when the peripheral drops while idle.
    async fn monitor_link(
        session: Weak<Session>,
        mut events: tokio::sync::broadcast::Receiver<LinkEvent>,
    ) {
        // Only disconnect events exist; a lagged or closed receiver means
        // the link is gone too.
        let _ = events.recv().await;
        if let Some(session) = session.upgrade() {
            session.mark_disconnected().await;
        }
    }

    /// Transition to disconnected after an observed link loss.
    async fn mark_disconnected(&self) {
        let mut state = self.state.lock().await;
        if let LinkState::Connected(active) = &*state {
            active.monitor.abort();
            *state = LinkState::Disconnected;
            tracing::warn!("link lost; session is now disconnected");
        }
    }

    fn classify(&self, err: TransportError) -> SessionError {
        SessionError::from_transport(err)
    }

    async fn active(&self) -> Result<(Arc<dyn Link>, Arc<AtomicBool>), SessionError> {
        match &*self.state.lock().await {
            LinkState::Connected(active) => {
                Ok((active.link.clone(), active.motion_configured.clone()))
            }
            _ => Err(SessionError::NotConnected),
        }
    }

    // === Read path ===

    /// Sample a characteristic with the session's default timeout, retrying
    /// once after a transient timeout.
    async fn read_payload(&self, uuid: Uuid, policy: ReadPolicy) -> Result<Vec<u8>, SessionError> {
        let _op = self.op_lock.lock().await;
        let (link, _) = self.active().await?;

        let result = self
            .read_once(&link, uuid, policy, self.config.read_timeout)
            .await;
        let result = match result {
            Err(SessionError::Timeout) => {
                tracing::warn!(uuid = %uuid, "read timed out, retrying once");
                tokio::time::sleep(self.config.retry_delay).await;
                self.read_once(&link, uuid, policy, self.config.read_timeout)
                    .await
            }
            other => other,
        };

        if matches!(result, Err(SessionError::LinkLost)) {
            self.mark_disconnected().await;
        }
        result
    }

    async fn read_once(
        &self,
        link: &Arc<dyn Link>,
        uuid: Uuid,
        policy: ReadPolicy,
        timeout: Duration,
    ) -> Result<Vec<u8>, SessionError> {
        if policy == ReadPolicy::DirectFirst {
            match tokio::time::timeout(timeout, link.read_char(uuid)).await {
                Err(_) => return Err(SessionError::Timeout),
                Ok(Ok(data)) => return Ok(data),
                Ok(Err(TransportError::NotPermitted(_))) => {
                    tracing::debug!(uuid = %uuid, "direct read refused, using notification read");
                }
                Ok(Err(e)) => return Err(self.classify(e)),
            }
        }

        self.notify_read(link, uuid, timeout).await
    }

    /// The composite notification read: install waiter, subscribe, wait for
    /// the first payload or a link-loss event, unsubscribe unconditionally.
    async fn notify_read(
        &self,
        link: &Arc<dyn Link>,
        uuid: Uuid,
        timeout: Duration,
    ) -> Result<Vec<u8>, SessionError> {
        // Single-slot waiter per characteristic. The op lock makes a clash
        // impossible; this check backs that invariant.
        if !self.waiters.lock().insert(uuid) {
            return Err(SessionError::Busy(format!(
                "notification read already pending on {}",
                uuid
            )));
        }
        let mut guard = NotifyGuard {
            link: link.clone(),
            uuid,
            waiters: self.waiters.clone(),
            subscribed: false,
            done: false,
        };

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(1);
        let mut events = link.events();

        match tokio::time::timeout(timeout, link.subscribe(uuid, tx)).await {
            Err(_) => {
                guard.finish().await;
                return Err(SessionError::Timeout);
            }
            Ok(Err(e)) => {
                guard.finish().await;
                return Err(self.classify(e));
            }
            Ok(Ok(())) => guard.subscribed = true,
        }

        let outcome = tokio::select! {
            payload = rx.recv() => match payload {
                Some(data) => Ok(data),
                // The transport dropped the sink; the link is gone.
                None => Err(SessionError::LinkLost),
            },
            _ = events.recv() => Err(SessionError::LinkLost),
            _ = tokio::time::sleep(timeout) => Err(SessionError::Timeout),
        };

        guard.finish().await;
        outcome
    }

    /// Sample and decode one sensor characteristic.
    async fn read_sensor(
        &self,
        uuid: Uuid,
        policy: ReadPolicy,
        decode: fn(&[u8]) -> Result<SensorReading, crate::ble::types::CodecError>,
    ) -> Result<SensorReading, SessionError> {
        let payload = self.read_payload(uuid, policy).await?;
        decode(&payload).map_err(|source| SessionError::MalformedPayload { uuid, source })
    }

    /// Read the ambient temperature in degrees celsius.
    pub async fn read_temperature(&self) -> Result<SensorReading, SessionError> {
        self.read_sensor(
            uuids::TEMPERATURE_UUID,
            ReadPolicy::NotifyOnly,
            codec::decode_temperature,
        )
        .await
    }

    /// Read the relative humidity in percent.
    pub async fn read_humidity(&self) -> Result<SensorReading, SessionError> {
        self.read_sensor(
            uuids::HUMIDITY_UUID,
            ReadPolicy::NotifyOnly,
            codec::decode_humidity,
        )
        .await
    }

    /// Read the barometric pressure in hPa.
    pub async fn read_pressure(&self) -> Result<SensorReading, SessionError> {
        self.read_sensor(
            uuids::PRESSURE_UUID,
            ReadPolicy::NotifyOnly,
            codec::decode_pressure,
        )
        .await
    }

    /// Read eCO2 and TVOC from the gas sensor.
    pub async fn read_air_quality(&self) -> Result<SensorReading, SessionError> {
        self.read_sensor(
            uuids::AIR_QUALITY_UUID,
            ReadPolicy::NotifyOnly,
            codec::decode_air_quality,
        )
        .await
    }

    /// Read the RGBC color sensor channels.
    pub async fn read_color(&self) -> Result<SensorReading, SessionError> {
        self.read_sensor(uuids::COLOR_UUID, ReadPolicy::NotifyOnly, codec::decode_color)
            .await
    }

    /// Read ambient light intensity (the color sensor's clear channel).
    pub async fn read_light_intensity(&self) -> Result<SensorReading, SessionError> {
        self.read_sensor(
            uuids::COLOR_UUID,
            ReadPolicy::NotifyOnly,
            codec::decode_light_intensity,
        )
        .await
    }

    /// Read the battery charge level.
    ///
    /// Battery level is the one characteristic known to permit direct reads,
    /// so this tries read first and falls back to a notification.
    pub async fn read_battery(&self) -> Result<SensorReading, SessionError> {
        self.read_sensor(
            uuids::BATTERY_LEVEL_UUID,
            ReadPolicy::DirectFirst,
            codec::decode_battery,
        )
        .await
    }

    /// Read the rotation quaternion from the motion fusion.
    pub async fn read_quaternion(&self) -> Result<SensorReading, SessionError> {
        self.read_sensor(
            uuids::QUATERNION_UUID,
            ReadPolicy::NotifyOnly,
            codec::decode_quaternion,
        )
        .await
    }

    /// Read Euler angles (roll, pitch, yaw) in degrees.
    pub async fn read_euler(&self) -> Result<SensorReading, SessionError> {
        self.ensure_motion_configured().await?;
        self.read_sensor(uuids::EULER_UUID, ReadPolicy::NotifyOnly, codec::decode_euler)
            .await
    }

    /// Read the compass heading in degrees, [0, 360).
    pub async fn read_heading(&self) -> Result<SensorReading, SessionError> {
        self.ensure_motion_configured().await?;
        self.read_sensor(
            uuids::HEADING_UUID,
            ReadPolicy::NotifyOnly,
            codec::decode_heading,
        )
        .await
    }

    /// Read the device orientation.
    pub async fn read_orientation(&self) -> Result<SensorReading, SessionError> {
        self.ensure_motion_configured().await?;
        self.read_sensor(
            uuids::ORIENTATION_UUID,
            ReadPolicy::NotifyOnly,
            codec::decode_orientation,
        )
        .await
    }

    /// Read raw accelerometer/gyroscope/magnetometer vectors.
    pub async fn read_raw_motion(&self) -> Result<SensorReading, SessionError> {
        self.ensure_motion_configured().await?;
        self.read_sensor(
            uuids::RAW_MOTION_UUID,
            ReadPolicy::NotifyOnly,
            codec::decode_raw_motion,
        )
        .await
    }

    /// Read the step counter.
    pub async fn read_step_count(&self) -> Result<SensorReading, SessionError> {
        self.ensure_motion_configured().await?;
        self.read_sensor(
            uuids::STEP_COUNTER_UUID,
            ReadPolicy::NotifyOnly,
            codec::decode_step_count,
        )
        .await
    }

    /// Wait up to `timeout` for the next tap event.
    ///
    /// Unlike the sensor reads this waits the caller's full timeout for an
    /// event that may never come, so a timeout is not retried; the
    /// subscription is dropped and taps between calls are missed.
    pub async fn read_tap(&self, timeout: Duration) -> Result<SensorReading, SessionError> {
        let _op = self.op_lock.lock().await;
        let (link, _) = self.active().await?;

        let result = self.notify_read(&link, uuids::TAP_UUID, timeout).await;
        if matches!(result, Err(SessionError::LinkLost)) {
            self.mark_disconnected().await;
        }

        let payload = result?;
        codec::decode_tap(&payload).map_err(|source| SessionError::MalformedPayload {
            uuid: uuids::TAP_UUID,
            source,
        })
    }

    // === Actuation path ===

    async fn write_payload(
        &self,
        uuid: Uuid,
        payload: &[u8],
        with_response: bool,
    ) -> Result<(), SessionError> {
        let _op = self.op_lock.lock().await;
        let (link, _) = self.active().await?;
        self.write_locked(&link, uuid, payload, with_response).await
    }

    /// Write with the op lock already held, retrying once on timeout.
    async fn write_locked(
        &self,
        link: &Arc<dyn Link>,
        uuid: Uuid,
        payload: &[u8],
        with_response: bool,
    ) -> Result<(), SessionError> {
        let result = self
            .write_once(link, uuid, payload, with_response)
            .await;
        let result = match result {
            Err(SessionError::Timeout) => {
                tracing::warn!(uuid = %uuid, "write timed out, retrying once");
                tokio::time::sleep(self.config.retry_delay).await;
                self.write_once(link, uuid, payload, with_response).await
            }
            other => other,
        };

        if matches!(result, Err(SessionError::LinkLost)) {
            self.mark_disconnected().await;
        }
        result
    }

    async fn write_once(
        &self,
        link: &Arc<dyn Link>,
        uuid: Uuid,
        payload: &[u8],
        with_response: bool,
    ) -> Result<(), SessionError> {
        match tokio::time::timeout(
            self.config.write_timeout,
            link.write_char(uuid, payload, with_response),
        )
        .await
        {
            Err(_) => Err(SessionError::Timeout),
            Ok(result) => result.map_err(|e| self.classify(e)),
        }
    }

    /// Apply an LED command. Both LED and speaker writes go without response
    /// on this firmware.
    pub async fn set_led(&self, command: LedCommand) -> Result<(), SessionError> {
        let frame = codec::encode_led(&command);
        tracing::debug!(frame = ?frame, "LED write");
        self.write_payload(uuids::LED_UUID, &frame, false).await
    }

    /// Trigger a preset sound sample.
    pub async fn play_sound(&self, command: SoundCommand) -> Result<(), SessionError> {
        let frame = codec::encode_sound(&command);
        tracing::debug!(frame = ?frame, "speaker write");
        self.write_payload(uuids::SPEAKER_DATA_UUID, &frame, false)
            .await
    }

    // === Configuration ===

    /// Write the motion configuration record. Idempotent; later motion reads
    /// skip the automatic configuration once this has succeeded.
    pub async fn configure_motion(&self, config: MotionConfig) -> Result<(), SessionError> {
        let _op = self.op_lock.lock().await;
        let (link, configured) = self.active().await?;

        let record = codec::encode_motion_config(&config);
        self.write_locked(&link, uuids::MOTION_CONFIG_UUID, &record, false)
            .await?;

        configured.store(true, Ordering::Release);
        tracing::info!(
            step_interval_ms = config.step_interval_ms,
            motion_freq_hz = config.motion_freq_hz,
            "motion sensors configured"
        );
        Ok(())
    }

    /// Motion fusion outputs are produced only after the configuration record
    /// has been written; write the defaults on first use of this link.
    async fn ensure_motion_configured(&self) -> Result<(), SessionError> {
        let (_, configured) = self.active().await?;
        if configured.load(Ordering::Acquire) {
            return Ok(());
        }
        self.configure_motion(MotionConfig::default()).await
    }

    /// Read-modify-write the environment configuration record.
    ///
    /// When the current record cannot be read (some firmwares refuse the
    /// read), the update is applied on top of the defaults instead.
    pub async fn configure_environment(
        &self,
        update: EnvironmentUpdate,
    ) -> Result<(), SessionError> {
        // The gas sensor only understands modes 1, 2 and 3; anything else
        // must never reach the firmware.
        if let Some(mode) = update.gas_mode {
            if !(1..=3).contains(&mode) {
                return Err(SessionError::InvalidArgument {
                    field: "gas_mode",
                    reason: "must be 1, 2 or 3",
                });
            }
        }

        let _op = self.op_lock.lock().await;
        let (link, _) = self.active().await?;

        let base = match tokio::time::timeout(
            self.config.read_timeout,
            link.read_char(uuids::ENVIRONMENT_CONFIG_UUID),
        )
        .await
        {
            Ok(Ok(data)) => codec::decode_environment_config(&data).unwrap_or_default(),
            Ok(Err(TransportError::LinkLost)) => {
                self.mark_disconnected().await;
                return Err(SessionError::LinkLost);
            }
            _ => {
                tracing::debug!("environment config not readable, starting from defaults");
                EnvironmentConfig::default()
            }
        };

        let merged = update.apply(base);
        let record = codec::encode_environment_config(&merged);
        self.write_locked(&link, uuids::ENVIRONMENT_CONFIG_UUID, &record, false)
            .await?;

        tracing::info!(gas_mode = merged.gas_mode, "environment sensors configured");
        Ok(())
    }
}

/// Cleanup for the composite notification read.
///
/// Removes the waiter slot and unsubscribes even when the surrounding tool
/// call is cancelled mid-wait; in that case the unsubscribe is detached onto
/// the runtime since drop cannot await.
struct NotifyGuard {
    link: Arc<dyn Link>,
    uuid: Uuid,
    waiters: Arc<SyncMutex<HashSet<Uuid>>>,
    subscribed: bool,
    done: bool,
}

impl NotifyGuard {
    async fn finish(&mut self) {
        self.done = true;
        self.waiters.lock().remove(&self.uuid);
        if self.subscribed {
            if let Err(e) = self.link.unsubscribe(self.uuid).await {
                tracing::warn!(uuid = %self.uuid, "unsubscribe failed: {}", e);
            }
            self.subscribed = false;
        }
    }
}

impl Drop for NotifyGuard {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.waiters.lock().remove(&self.uuid);
        if self.subscribed {
            let link = self.link.clone();
            let uuid = self.uuid;
            tokio::spawn(async move {
                if let Err(e) = link.unsubscribe(uuid).await {
                    tracing::warn!(uuid = %uuid, "detached unsubscribe failed: {}", e);
                }
            });
        }
    }
}
