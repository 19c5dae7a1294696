//! Byte codecs for the Thingy:52 characteristics.
//!
//! One pure decoder per sensor characteristic and one encoder per actuator
//! command. Decoders take a raw notification/read payload and return a typed
//! [`SensorReading`] or a [`CodecError`]; no I/O happens here.

use crate::ble::types::{
    CodecError, EnvironmentConfig, LedCommand, MotionConfig, Orientation, SensorReading,
    SoundCommand, Vec3,
};

/// Quaternion components are signed Q30 fixed point.
///
/// Q30 and Q16 values need double precision: an f32 mantissa cannot hold a
/// full 31-bit fixed-point value.
const Q30: f64 = (1u32 << 30) as f64;
/// Euler angles and heading are signed Q16 fixed point degrees.
const Q16: f64 = (1u32 << 16) as f64;
/// Accelerometer raw samples are Q10 g.
const ACCEL_Q: f32 = (1u32 << 10) as f32;
/// Gyroscope raw samples are Q5 degrees/second.
const GYRO_Q: f32 = (1u32 << 5) as f32;
/// Magnetometer raw samples are Q4 microtesla.
const MAG_Q: f32 = (1u32 << 4) as f32;

fn check_len(what: &'static str, expected: usize, data: &[u8]) -> Result<(), CodecError> {
    if data.len() != expected {
        return Err(CodecError::new(what, expected, data.len()));
    }
    Ok(())
}

fn out_of_range(what: &'static str, len: usize) -> CodecError {
    CodecError::new(what, len, len)
}

fn i16_le(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

fn u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn i32_le(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn u32_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Decode a temperature payload: `int8` integer celsius + `uint8` hundredths.
pub fn decode_temperature(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("temperature", 2, data)?;

    let integer = data[0] as i8;
    let hundredths = data[1];
    if hundredths > 99 {
        return Err(out_of_range("temperature hundredths", data.len()));
    }

    let celsius = integer as f64 + hundredths as f64 / 100.0;
    if !(-40.0..=85.0).contains(&celsius) {
        return Err(out_of_range("temperature range", data.len()));
    }

    Ok(SensorReading::Temperature { celsius })
}

/// Decode a humidity payload: one `uint8` percent in [0, 100].
pub fn decode_humidity(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("humidity", 1, data)?;

    let percent = data[0];
    if percent > 100 {
        return Err(out_of_range("humidity range", data.len()));
    }

    Ok(SensorReading::Humidity { percent })
}

/// Decode a pressure payload: `int32 LE` integer pascals + `uint8` hundredths
/// of a pascal, reported in hPa and validated to [260.0, 1260.0].
pub fn decode_pressure(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("pressure", 5, data)?;

    let integer = i32_le(data, 0);
    let hundredths = data[4];
    if hundredths > 99 {
        return Err(out_of_range("pressure hundredths", data.len()));
    }

    let hpa = (integer as f64 * 100.0 + hundredths as f64) / 10000.0;
    if !(260.0..=1260.0).contains(&hpa) {
        return Err(out_of_range("pressure range", data.len()));
    }

    Ok(SensorReading::Pressure { hpa })
}

/// Decode an air quality payload: `uint16 LE` eCO2 ppm + `uint16 LE` TVOC ppb.
///
/// Ranges follow the CCS811 datasheet: CO2 in [400, 8192], TVOC in [0, 1187].
pub fn decode_air_quality(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("air quality", 4, data)?;

    let co2_ppm = u16_le(data, 0);
    let tvoc_ppb = u16_le(data, 2);
    if !(400..=8192).contains(&co2_ppm) {
        return Err(out_of_range("air quality co2 range", data.len()));
    }
    if tvoc_ppb > 1187 {
        return Err(out_of_range("air quality tvoc range", data.len()));
    }

    Ok(SensorReading::AirQuality { co2_ppm, tvoc_ppb })
}

/// Decode a color payload: four `uint16 LE` channels R, G, B, Clear.
pub fn decode_color(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("color", 8, data)?;

    Ok(SensorReading::Color {
        red: u16_le(data, 0),
        green: u16_le(data, 2),
        blue: u16_le(data, 4),
        clear: u16_le(data, 6),
    })
}

/// Decode light intensity from a color payload.
///
/// The Thingy has no dedicated lux characteristic; the color sensor's clear
/// channel doubles as the ambient light reading.
pub fn decode_light_intensity(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("light intensity", 8, data)?;

    let clear = u16_le(data, 6);
    Ok(SensorReading::Light { lux: clear as f32 })
}

/// Decode a standard battery level payload: one `uint8` percent in [0, 100].
pub fn decode_battery(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("battery level", 1, data)?;

    let percent = data[0];
    if percent > 100 {
        return Err(out_of_range("battery range", data.len()));
    }

    Ok(SensorReading::Battery { percent })
}

/// Decode a quaternion payload: four `int32 LE` Q30 components, W X Y Z.
pub fn decode_quaternion(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("quaternion", 16, data)?;

    Ok(SensorReading::Quaternion {
        w: i32_le(data, 0) as f64 / Q30,
        x: i32_le(data, 4) as f64 / Q30,
        y: i32_le(data, 8) as f64 / Q30,
        z: i32_le(data, 12) as f64 / Q30,
    })
}

/// Decode an Euler angle payload: three `int32 LE` Q16 degrees, roll pitch yaw.
pub fn decode_euler(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("euler angles", 12, data)?;

    Ok(SensorReading::Euler {
        roll_deg: i32_le(data, 0) as f64 / Q16,
        pitch_deg: i32_le(data, 4) as f64 / Q16,
        yaw_deg: i32_le(data, 8) as f64 / Q16,
    })
}

/// Decode a heading payload: `int32 LE` Q16 degrees, normalized to [0, 360).
pub fn decode_heading(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("heading", 4, data)?;

    let deg = (i32_le(data, 0) as f64 / Q16).rem_euclid(360.0);
    Ok(SensorReading::Heading { deg })
}

/// Decode an orientation payload: one byte, 0..=3.
pub fn decode_orientation(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("orientation", 1, data)?;

    let orientation = match data[0] {
        0 => Orientation::Portrait,
        1 => Orientation::Landscape,
        2 => Orientation::ReversePortrait,
        3 => Orientation::ReverseLandscape,
        _ => return Err(out_of_range("orientation range", data.len())),
    };

    Ok(SensorReading::Orientation { orientation })
}

/// Decode a step counter payload: `uint32 LE` steps + `uint32 LE` elapsed ms.
pub fn decode_step_count(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("step counter", 8, data)?;

    Ok(SensorReading::StepCount {
        steps: u32_le(data, 0),
        elapsed_ms: u32_le(data, 4),
    })
}

/// Decode a tap payload: `uint8` direction (1..=6) + `uint8` count.
pub fn decode_tap(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("tap", 2, data)?;

    Ok(SensorReading::TapEvent {
        direction: data[0],
        count: data[1],
    })
}

/// Decode a raw motion payload: nine `int16 LE` values, three per sensor.
///
/// Scale factors: accelerometer Q10 (g), gyroscope Q5 (deg/s),
/// magnetometer Q4 (uT).
pub fn decode_raw_motion(data: &[u8]) -> Result<SensorReading, CodecError> {
    check_len("raw motion", 18, data)?;

    let accel = Vec3::new(
        i16_le(data, 0) as f32 / ACCEL_Q,
        i16_le(data, 2) as f32 / ACCEL_Q,
        i16_le(data, 4) as f32 / ACCEL_Q,
    );
    let gyro = Vec3::new(
        i16_le(data, 6) as f32 / GYRO_Q,
        i16_le(data, 8) as f32 / GYRO_Q,
        i16_le(data, 10) as f32 / GYRO_Q,
    );
    let mag = Vec3::new(
        i16_le(data, 12) as f32 / MAG_Q,
        i16_le(data, 14) as f32 / MAG_Q,
        i16_le(data, 16) as f32 / MAG_Q,
    );

    Ok(SensorReading::RawMotion { accel, gyro, mag })
}

/// Decode an environment configuration record (used for read-modify-write).
pub fn decode_environment_config(data: &[u8]) -> Result<EnvironmentConfig, CodecError> {
    check_len("environment config", 9, data)?;

    Ok(EnvironmentConfig {
        temp_interval_ms: u16_le(data, 0),
        pressure_interval_ms: u16_le(data, 2),
        humidity_interval_ms: u16_le(data, 4),
        color_interval_ms: u16_le(data, 6),
        gas_mode: data[8],
    })
}

/// Encode an LED command into its four-byte frame `[mode, p1, p2, p3]`.
///
/// The frame is always exactly four bytes. The firmware rejects five-byte
/// writes as not permitted, so breathe and one-shot carry only the color
/// code and intensity with a zero trailing byte.
pub fn encode_led(command: &LedCommand) -> [u8; 4] {
    match *command {
        LedCommand::Off => [0x00, 0x00, 0x00, 0x00],
        LedCommand::Constant { red, green, blue } => [0x01, red, green, blue],
        LedCommand::Breathe {
            color_code,
            intensity,
            delay_ms: _,
        } => [0x02, color_code, intensity, 0x00],
        LedCommand::OneShot {
            color_code,
            intensity,
        } => [0x03, color_code, intensity, 0x00],
    }
}

/// Encode a sound command into the two-byte speaker write `[0x03, sound_id]`.
///
/// 0x03 selects sample mode; the second byte picks one of the eight preset
/// samples stored in firmware.
pub fn encode_sound(command: &SoundCommand) -> [u8; 2] {
    let id = match *command {
        SoundCommand::PresetSound { id } => id,
        SoundCommand::Beep => 1,
    };
    [0x03, id]
}

/// Encode a motion configuration record into its nine-byte layout.
pub fn encode_motion_config(config: &MotionConfig) -> [u8; 9] {
    let mut data = [0u8; 9];
    data[0..2].copy_from_slice(&config.step_interval_ms.to_le_bytes());
    data[2..4].copy_from_slice(&config.temp_comp_interval_ms.to_le_bytes());
    data[4..6].copy_from_slice(&config.mag_comp_interval_ms.to_le_bytes());
    data[6..8].copy_from_slice(&config.motion_freq_hz.to_le_bytes());
    data[8] = config.wake_on_motion as u8;
    data
}

/// Encode an environment configuration record into its nine-byte layout.
pub fn encode_environment_config(config: &EnvironmentConfig) -> [u8; 9] {
    let mut data = [0u8; 9];
    data[0..2].copy_from_slice(&config.temp_interval_ms.to_le_bytes());
    data[2..4].copy_from_slice(&config.pressure_interval_ms.to_le_bytes());
    data[4..6].copy_from_slice(&config.humidity_interval_ms.to_le_bytes());
    data[6..8].copy_from_slice(&config.color_interval_ms.to_le_bytes());
    data[8] = config.gas_mode;
    data
}

/// Named LED colors accepted by the constant-mode tool.
pub const NAMED_COLORS: &[(&str, (u8, u8, u8))] = &[
    ("red", (255, 0, 0)),
    ("green", (0, 255, 0)),
    ("blue", (0, 0, 255)),
    ("white", (255, 255, 255)),
    ("warm_white", (255, 180, 107)),
    ("cool_white", (212, 235, 255)),
    ("yellow", (255, 255, 0)),
    ("cyan", (0, 255, 255)),
    ("magenta", (255, 0, 255)),
    ("purple", (128, 0, 128)),
    ("orange", (255, 165, 0)),
    ("pink", (255, 192, 203)),
];

/// Breathe-mode color codes understood by the firmware.
pub const BREATHE_COLOR_CODES: &[(&str, u8)] = &[
    ("red", 1),
    ("green", 2),
    ("yellow", 3),
    ("blue", 4),
    ("magenta", 5),
    ("cyan", 6),
    ("white", 7),
];

/// Look up the RGB triplet for a named constant-mode color.
pub fn named_color(name: &str) -> Option<(u8, u8, u8)> {
    NAMED_COLORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, rgb)| *rgb)
}

/// Look up the firmware color code for a named breathe-mode color.
pub fn breathe_color_code(name: &str) -> Option<u8> {
    BREATHE_COLOR_CODES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| *code)
}
