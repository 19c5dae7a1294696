//! Tool surface advertised to the MCP layer.
//!
//! Each tool is a thin adapter: validate arguments, call the session, format
//! the result. Session errors are mapped to the `{"error": {...}}` envelope;
//! tools never invent error kinds of their own.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::ble::codec::{breathe_color_code, named_color, BREATHE_COLOR_CODES, NAMED_COLORS};
use crate::ble::session::Session;
use crate::ble::types::{LedCommand, SensorReading, SessionError, SoundCommand};

/// Failures surfaced through the tool result envelope.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Argument schema or range violation; no BLE interaction performed.
    #[error("invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    /// No tool with the requested name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Anything the session reported, passed through unchanged.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ToolError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable error kind advertised to MCP clients.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidArgument { .. } => "InvalidArgument",
            ToolError::UnknownTool(_) => "NotFound",
            ToolError::Session(e) => e.kind(),
        }
    }

    /// The `{"error": {...}}` envelope for this failure.
    pub fn to_value(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        match self {
            ToolError::InvalidArgument { field, .. } => {
                error["details"] = json!({ "field": field });
            }
            ToolError::Session(SessionError::MalformedPayload { uuid, source }) => {
                error["details"] = json!({
                    "uuid": uuid.to_string(),
                    "expected_len": source.expected_len,
                    "got_len": source.got_len,
                });
            }
            _ => {}
        }
        json!({ "error": error })
    }
}

/// A tool as advertised to the MCP framing layer.
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn no_args() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn timeout_schema(default: u64, min: u64, max: u64) -> Value {
    json!({
        "type": "object",
        "properties": {
            "timeout_seconds": {
                "type": "integer",
                "description": "Timeout in seconds",
                "default": default,
                "minimum": min,
                "maximum": max,
            }
        }
    })
}

/// The full, fixed tool set.
pub fn tool_definitions() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "scan_devices",
            description: "Scan for nearby Thingy:52 devices and list their addresses",
            input_schema: timeout_schema(10, 1, 60),
        },
        ToolDef {
            name: "connect_device",
            description: "Connect to a Thingy:52 by Bluetooth address",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "address": {
                        "type": "string",
                        "description": "Bluetooth address from scan_devices (e.g. AA:BB:CC:DD:EE:FF)",
                    },
                    "timeout_seconds": {
                        "type": "integer",
                        "default": 30,
                        "minimum": 1,
                        "maximum": 300,
                    }
                },
                "required": ["address"],
            }),
        },
        ToolDef {
            name: "disconnect_device",
            description: "Disconnect from the currently connected device",
            input_schema: no_args(),
        },
        ToolDef {
            name: "get_device_status",
            description: "Report connection state and battery level",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_temperature",
            description: "Read the ambient temperature in degrees Celsius",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_humidity",
            description: "Read the relative humidity in percent",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_pressure",
            description: "Read the barometric pressure in hPa",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_air_quality",
            description: "Read eCO2 (ppm) and TVOC (ppb) from the gas sensor",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_color_sensor",
            description: "Read the RGBC color sensor channels",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_light_intensity",
            description: "Read ambient light intensity in lux",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_all_sensors",
            description: "Read all environmental sensors; failed sensors come back null",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_quaternion",
            description: "Read the rotation quaternion from the motion fusion",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_euler_angles",
            description: "Read roll, pitch and yaw in degrees",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_heading",
            description: "Read the compass heading in degrees (0-360)",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_orientation",
            description: "Read the device orientation (portrait/landscape)",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_raw_motion",
            description: "Read raw accelerometer, gyroscope and magnetometer vectors",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_step_count",
            description: "Read the step counter",
            input_schema: no_args(),
        },
        ToolDef {
            name: "read_tap_event",
            description: "Wait for the next tap on the device and report its direction",
            input_schema: timeout_schema(10, 1, 60),
        },
        ToolDef {
            name: "set_led_color",
            description: "Set the LED to a constant color by name or RGB components",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "color": {
                        "type": "string",
                        "description": "Named color (red, green, blue, white, warm_white, cool_white, yellow, cyan, magenta, purple, orange, pink)",
                    },
                    "red": { "type": "integer", "minimum": 0, "maximum": 255 },
                    "green": { "type": "integer", "minimum": 0, "maximum": 255 },
                    "blue": { "type": "integer", "minimum": 0, "maximum": 255 },
                    "intensity": {
                        "type": "integer",
                        "description": "Brightness scaling in percent",
                        "default": 100,
                        "minimum": 0,
                        "maximum": 100,
                    }
                },
            }),
        },
        ToolDef {
            name: "set_led_breathe",
            description: "Set the LED to a breathing effect using a named color",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "color": {
                        "type": "string",
                        "description": "Breathe color (red, green, yellow, blue, magenta, cyan, white)",
                    },
                    "intensity": {
                        "type": "integer",
                        "default": 20,
                        "minimum": 0,
                        "maximum": 100,
                    },
                    "delay_ms": {
                        "type": "integer",
                        "default": 1000,
                        "minimum": 50,
                        "maximum": 10000,
                    }
                },
                "required": ["color"],
            }),
        },
        ToolDef {
            name: "turn_off_led",
            description: "Turn the LED off",
            input_schema: no_args(),
        },
        ToolDef {
            name: "play_sound",
            description: "Play one of the eight preset sound samples (1-8)",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sound_id": { "type": "integer", "minimum": 1, "maximum": 8 }
                },
                "required": ["sound_id"],
            }),
        },
        ToolDef {
            name: "beep",
            description: "Play a short beep (preset sound 1)",
            input_schema: no_args(),
        },
    ]
}

// === Argument structs ===

fn default_scan_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_tap_timeout() -> u64 {
    10
}

fn default_intensity() -> u8 {
    100
}

fn default_breathe_intensity() -> u8 {
    20
}

fn default_breathe_delay() -> u16 {
    1000
}

#[derive(Debug, Deserialize)]
struct ScanArgs {
    #[serde(default = "default_scan_timeout")]
    timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct ConnectArgs {
    address: String,
    #[serde(default = "default_connect_timeout")]
    timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct TapArgs {
    #[serde(default = "default_tap_timeout")]
    timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct LedColorArgs {
    color: Option<String>,
    red: Option<i64>,
    green: Option<i64>,
    blue: Option<i64>,
    #[serde(default = "default_intensity")]
    intensity: u8,
}

#[derive(Debug, Deserialize)]
struct LedBreatheArgs {
    color: String,
    #[serde(default = "default_breathe_intensity")]
    intensity: u8,
    #[serde(default = "default_breathe_delay")]
    delay_ms: u16,
}

#[derive(Debug, Deserialize)]
struct PlaySoundArgs {
    sound_id: i64,
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::invalid("arguments", e.to_string()))
}

fn channel_u8(field: &str, value: i64) -> Result<u8, ToolError> {
    u8::try_from(value).map_err(|_| ToolError::invalid(field, "must be 0..255"))
}

/// Scale an RGB channel by intensity percent, rounding down.
fn scale_channel(value: u8, intensity: u8) -> u8 {
    (value as u32 * intensity as u32 / 100) as u8
}

fn tap_direction_name(direction: u8) -> &'static str {
    match direction {
        1 => "x_up",
        2 => "x_down",
        3 => "y_up",
        4 => "y_down",
        5 => "z_up",
        6 => "z_down",
        _ => "unknown",
    }
}

// === Dispatch ===

/// Invoke a tool by name with JSON arguments.
///
/// Returns the tool's success payload, or a [`ToolError`] the caller renders
/// through [`ToolError::to_value`].
pub async fn dispatch(
    session: &Arc<Session>,
    name: &str,
    args: Value,
) -> Result<Value, ToolError> {
    tracing::debug!(tool = name, "dispatching tool call");
    match name {
        "scan_devices" => scan_devices(session, args).await,
        "connect_device" => connect_device(session, args).await,
        "disconnect_device" => disconnect_device(session).await,
        "get_device_status" => get_device_status(session).await,
        "read_temperature" => read_temperature(session).await,
        "read_humidity" => read_humidity(session).await,
        "read_pressure" => read_pressure(session).await,
        "read_air_quality" => read_air_quality(session).await,
        "read_color_sensor" => read_color_sensor(session).await,
        "read_light_intensity" => read_light_intensity(session).await,
        "read_all_sensors" => read_all_sensors(session).await,
        "read_quaternion" => read_quaternion(session).await,
        "read_euler_angles" => read_euler_angles(session).await,
        "read_heading" => read_heading(session).await,
        "read_orientation" => read_orientation(session).await,
        "read_raw_motion" => read_raw_motion(session).await,
        "read_step_count" => read_step_count(session).await,
        "read_tap_event" => read_tap_event(session, args).await,
        "set_led_color" => set_led_color(session, args).await,
        "set_led_breathe" => set_led_breathe(session, args).await,
        "turn_off_led" => turn_off_led(session).await,
        "play_sound" => play_sound(session, args).await,
        "beep" => beep(session).await,
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

// === Device management ===

async fn scan_devices(session: &Arc<Session>, args: Value) -> Result<Value, ToolError> {
    let args: ScanArgs = parse_args(args)?;
    if !(1..=60).contains(&args.timeout_seconds) {
        return Err(ToolError::invalid("timeout_seconds", "must be 1..60"));
    }

    let devices = session
        .scan(Duration::from_secs(args.timeout_seconds))
        .await?;
    Ok(json!(devices))
}

async fn connect_device(session: &Arc<Session>, args: Value) -> Result<Value, ToolError> {
    let args: ConnectArgs = parse_args(args)?;
    if args.address.is_empty() {
        return Err(ToolError::invalid("address", "must not be empty"));
    }
    if !(1..=300).contains(&args.timeout_seconds) {
        return Err(ToolError::invalid("timeout_seconds", "must be 1..300"));
    }

    let info = session
        .connect(&args.address, Duration::from_secs(args.timeout_seconds))
        .await?;
    Ok(json!({
        "connected": true,
        "address": info.address,
        "name": info.name,
    }))
}

async fn disconnect_device(session: &Arc<Session>) -> Result<Value, ToolError> {
    session.disconnect().await?;
    Ok(json!({ "connected": false }))
}

async fn get_device_status(session: &Arc<Session>) -> Result<Value, ToolError> {
    let Some(info) = session.peripheral_info().await else {
        return Ok(json!({ "connected": false }));
    };

    // Battery is best-effort; a failed read must not fail the status call.
    let battery_percent = match session.read_battery().await {
        Ok(SensorReading::Battery { percent }) => Some(percent),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("could not read battery level: {}", e);
            None
        }
    };

    Ok(json!({
        "connected": true,
        "address": info.address,
        "name": info.name,
        "battery_percent": battery_percent,
    }))
}

// === Environmental sensors ===

async fn read_temperature(session: &Arc<Session>) -> Result<Value, ToolError> {
    match session.read_temperature().await? {
        SensorReading::Temperature { celsius } => Ok(json!({
            "temperature_celsius": celsius,
            "unit": "°C",
        })),
        other => unreachable!("temperature decode produced {:?}", other),
    }
}

async fn read_humidity(session: &Arc<Session>) -> Result<Value, ToolError> {
    match session.read_humidity().await? {
        SensorReading::Humidity { percent } => Ok(json!({
            "humidity_percent": percent,
            "unit": "%",
        })),
        other => unreachable!("humidity decode produced {:?}", other),
    }
}

async fn read_pressure(session: &Arc<Session>) -> Result<Value, ToolError> {
    match session.read_pressure().await? {
        SensorReading::Pressure { hpa } => Ok(json!({
            "pressure_hpa": hpa,
            "unit": "hPa",
        })),
        other => unreachable!("pressure decode produced {:?}", other),
    }
}

async fn read_air_quality(session: &Arc<Session>) -> Result<Value, ToolError> {
    match session.read_air_quality().await? {
        SensorReading::AirQuality { co2_ppm, tvoc_ppb } => Ok(json!({
            "co2_ppm": co2_ppm,
            "tvoc_ppb": tvoc_ppb,
        })),
        other => unreachable!("air quality decode produced {:?}", other),
    }
}

async fn read_color_sensor(session: &Arc<Session>) -> Result<Value, ToolError> {
    match session.read_color().await? {
        SensorReading::Color {
            red,
            green,
            blue,
            clear,
        } => Ok(json!({
            "red": red,
            "green": green,
            "blue": blue,
            "clear": clear,
        })),
        other => unreachable!("color decode produced {:?}", other),
    }
}

async fn read_light_intensity(session: &Arc<Session>) -> Result<Value, ToolError> {
    match session.read_light_intensity().await? {
        SensorReading::Light { lux } => Ok(json!({ "lux": lux })),
        other => unreachable!("light decode produced {:?}", other),
    }
}

async fn read_all_sensors(session: &Arc<Session>) -> Result<Value, ToolError> {
    let mut result = json!({
        "temperature": Value::Null,
        "humidity": Value::Null,
        "pressure": Value::Null,
        "air_quality": Value::Null,
        "color": Value::Null,
        "light": Value::Null,
    });
    let mut errors = Vec::new();

    let readings: [(&str, Result<Value, ToolError>); 6] = [
        ("temperature", read_temperature(session).await),
        ("humidity", read_humidity(session).await),
        ("pressure", read_pressure(session).await),
        ("air_quality", read_air_quality(session).await),
        ("color", read_color_sensor(session).await),
        ("light", read_light_intensity(session).await),
    ];

    for (sensor, reading) in readings {
        match reading {
            Ok(value) => result[sensor] = value,
            Err(e) => {
                tracing::warn!(sensor = sensor, "sensor read failed: {}", e);
                errors.push(json!({
                    "sensor": sensor,
                    "kind": e.kind(),
                    "message": e.to_string(),
                }));
            }
        }
    }

    result["errors"] = Value::Array(errors);
    Ok(result)
}

// === Motion sensors ===

async fn read_quaternion(session: &Arc<Session>) -> Result<Value, ToolError> {
    match session.read_quaternion().await? {
        SensorReading::Quaternion { w, x, y, z } => Ok(json!({
            "w": w, "x": x, "y": y, "z": z,
        })),
        other => unreachable!("quaternion decode produced {:?}", other),
    }
}

async fn read_euler_angles(session: &Arc<Session>) -> Result<Value, ToolError> {
    match session.read_euler().await? {
        SensorReading::Euler {
            roll_deg,
            pitch_deg,
            yaw_deg,
        } => Ok(json!({
            "roll_deg": roll_deg,
            "pitch_deg": pitch_deg,
            "yaw_deg": yaw_deg,
        })),
        other => unreachable!("euler decode produced {:?}", other),
    }
}

async fn read_heading(session: &Arc<Session>) -> Result<Value, ToolError> {
    match session.read_heading().await? {
        SensorReading::Heading { deg } => Ok(json!({ "heading_deg": deg })),
        other => unreachable!("heading decode produced {:?}", other),
    }
}

async fn read_orientation(session: &Arc<Session>) -> Result<Value, ToolError> {
    match session.read_orientation().await? {
        SensorReading::Orientation { orientation } => Ok(json!({
            "orientation": orientation.to_string(),
        })),
        other => unreachable!("orientation decode produced {:?}", other),
    }
}

async fn read_raw_motion(session: &Arc<Session>) -> Result<Value, ToolError> {
    match session.read_raw_motion().await? {
        SensorReading::RawMotion { accel, gyro, mag } => Ok(json!({
            "accelerometer_g": accel,
            "gyroscope_deg_s": gyro,
            "magnetometer_ut": mag,
        })),
        other => unreachable!("raw motion decode produced {:?}", other),
    }
}

async fn read_step_count(session: &Arc<Session>) -> Result<Value, ToolError> {
    match session.read_step_count().await? {
        SensorReading::StepCount { steps, elapsed_ms } => Ok(json!({
            "steps": steps,
            "elapsed_ms": elapsed_ms,
        })),
        other => unreachable!("step count decode produced {:?}", other),
    }
}

async fn read_tap_event(session: &Arc<Session>, args: Value) -> Result<Value, ToolError> {
    let args: TapArgs = parse_args(args)?;
    if !(1..=60).contains(&args.timeout_seconds) {
        return Err(ToolError::invalid("timeout_seconds", "must be 1..60"));
    }

    match session
        .read_tap(Duration::from_secs(args.timeout_seconds))
        .await?
    {
        SensorReading::TapEvent { direction, count } => Ok(json!({
            "direction": tap_direction_name(direction),
            "count": count,
            "type": if count == 2 { "double" } else { "single" },
        })),
        other => unreachable!("tap decode produced {:?}", other),
    }
}

// === LED ===

async fn set_led_color(session: &Arc<Session>, args: Value) -> Result<Value, ToolError> {
    let args: LedColorArgs = parse_args(args)?;
    if args.intensity > 100 {
        return Err(ToolError::invalid("intensity", "must be 0..100"));
    }

    // Range-check each provided channel before looking at the combination so
    // that an out-of-range value names its own field.
    let red = args.red.map(|v| channel_u8("red", v)).transpose()?;
    let green = args.green.map(|v| channel_u8("green", v)).transpose()?;
    let blue = args.blue.map(|v| channel_u8("blue", v)).transpose()?;

    let (red, green, blue) = match (&args.color, red, green, blue) {
        (Some(name), None, None, None) => {
            let key = name.to_lowercase().replace(' ', "_");
            named_color(&key).ok_or_else(|| {
                let known: Vec<&str> = NAMED_COLORS.iter().map(|(n, _)| *n).collect();
                ToolError::invalid(
                    "color",
                    format!("unknown color '{}'; known: {}", name, known.join(", ")),
                )
            })?
        }
        (None, Some(r), Some(g), Some(b)) => (r, g, b),
        _ => {
            return Err(ToolError::invalid(
                "color",
                "provide either a color name or all of red, green and blue",
            ))
        }
    };

    let command = LedCommand::Constant {
        red: scale_channel(red, args.intensity),
        green: scale_channel(green, args.intensity),
        blue: scale_channel(blue, args.intensity),
    };
    session.set_led(command).await?;

    Ok(json!({
        "status": "success",
        "message": format!(
            "LED set to RGB({},{},{}) at {}% intensity",
            red, green, blue, args.intensity
        ),
    }))
}

async fn set_led_breathe(session: &Arc<Session>, args: Value) -> Result<Value, ToolError> {
    let args: LedBreatheArgs = parse_args(args)?;
    if args.intensity > 100 {
        return Err(ToolError::invalid("intensity", "must be 0..100"));
    }
    if !(50..=10000).contains(&args.delay_ms) {
        return Err(ToolError::invalid("delay_ms", "must be 50..10000"));
    }

    // Breathe mode takes a firmware color code, never RGB.
    let key = args.color.to_lowercase().replace(' ', "_");
    let color_code = breathe_color_code(&key).ok_or_else(|| {
        let known: Vec<&str> = BREATHE_COLOR_CODES.iter().map(|(n, _)| *n).collect();
        ToolError::invalid(
            "color",
            format!(
                "unknown breathe color '{}'; known: {}",
                args.color,
                known.join(", ")
            ),
        )
    })?;

    session
        .set_led(LedCommand::Breathe {
            color_code,
            intensity: args.intensity,
            delay_ms: args.delay_ms,
        })
        .await?;

    Ok(json!({
        "status": "success",
        "message": format!("LED breathing {}", args.color),
    }))
}

async fn turn_off_led(session: &Arc<Session>) -> Result<Value, ToolError> {
    session.set_led(LedCommand::Off).await?;
    Ok(json!({
        "status": "success",
        "message": "LED turned off",
    }))
}

// === Sound ===

async fn play_sound(session: &Arc<Session>, args: Value) -> Result<Value, ToolError> {
    let args: PlaySoundArgs = parse_args(args)?;
    let id = u8::try_from(args.sound_id)
        .ok()
        .filter(|id| (1..=8).contains(id))
        .ok_or_else(|| ToolError::invalid("sound_id", "must be 1..8"))?;

    session.play_sound(SoundCommand::PresetSound { id }).await?;
    Ok(json!({
        "status": "success",
        "message": format!("playing sound {}", id),
    }))
}

async fn beep(session: &Arc<Session>) -> Result<Value, ToolError> {
    session.play_sound(SoundCommand::Beep).await?;
    Ok(json!({
        "status": "success",
        "message": "beep",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_definitions_are_unique_and_complete() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), 23);

        let mut names: Vec<&str> = defs.iter().map(|d| d.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 23, "duplicate tool name");
    }

    #[test]
    fn test_every_schema_is_an_object() {
        for def in tool_definitions() {
            assert_eq!(
                def.input_schema["type"], "object",
                "schema for {} is not an object",
                def.name
            );
        }
    }

    #[test]
    fn test_scale_channel_floors() {
        assert_eq!(scale_channel(255, 50), 127);
        assert_eq!(scale_channel(255, 100), 255);
        assert_eq!(scale_channel(255, 0), 0);
        assert_eq!(scale_channel(10, 25), 2);
    }

    #[test]
    fn test_tap_direction_names() {
        assert_eq!(tap_direction_name(1), "x_up");
        assert_eq!(tap_direction_name(6), "z_down");
        assert_eq!(tap_direction_name(0), "unknown");
        assert_eq!(tap_direction_name(7), "unknown");
    }

    #[test]
    fn test_error_envelope_shape() {
        let err = ToolError::invalid("red", "must be 0..255");
        let value = err.to_value();
        assert_eq!(value["error"]["kind"], "InvalidArgument");
        assert_eq!(value["error"]["details"]["field"], "red");
    }
}
