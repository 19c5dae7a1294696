//! UUID registry for the Nordic Thingy:52 GATT profile.
//!
//! The Thingy:52 exposes four vendor services plus the standard Battery
//! service. Vendor UUIDs follow the base form
//! `EF68ZZZZ-9B35-4933-9B10-52FFA9740042` where `ZZZZ` identifies the
//! service or characteristic.

use uuid::Uuid;

/// Environment Service UUID (0x0200)
pub const ENVIRONMENT_SERVICE_UUID: Uuid =
    Uuid::from_u128(0xef68_0200_9b35_4933_9b10_52ff_a974_0042);

/// Temperature Characteristic UUID (0x0201)
pub const TEMPERATURE_UUID: Uuid = Uuid::from_u128(0xef68_0201_9b35_4933_9b10_52ff_a974_0042);

/// Pressure Characteristic UUID (0x0202)
pub const PRESSURE_UUID: Uuid = Uuid::from_u128(0xef68_0202_9b35_4933_9b10_52ff_a974_0042);

/// Humidity Characteristic UUID (0x0203)
pub const HUMIDITY_UUID: Uuid = Uuid::from_u128(0xef68_0203_9b35_4933_9b10_52ff_a974_0042);

/// Air Quality (gas) Characteristic UUID (0x0204)
pub const AIR_QUALITY_UUID: Uuid = Uuid::from_u128(0xef68_0204_9b35_4933_9b10_52ff_a974_0042);

/// Color Characteristic UUID (0x0205)
pub const COLOR_UUID: Uuid = Uuid::from_u128(0xef68_0205_9b35_4933_9b10_52ff_a974_0042);

/// Environment Configuration Characteristic UUID (0x0206)
///
/// Holds the per-sensor update intervals and the gas sensor mode.
pub const ENVIRONMENT_CONFIG_UUID: Uuid =
    Uuid::from_u128(0xef68_0206_9b35_4933_9b10_52ff_a974_0042);

/// UI Service UUID (0x0300)
pub const UI_SERVICE_UUID: Uuid = Uuid::from_u128(0xef68_0300_9b35_4933_9b10_52ff_a974_0042);

/// LED Characteristic UUID (0x0301)
pub const LED_UUID: Uuid = Uuid::from_u128(0xef68_0301_9b35_4933_9b10_52ff_a974_0042);

/// Button Characteristic UUID (0x0302)
pub const BUTTON_UUID: Uuid = Uuid::from_u128(0xef68_0302_9b35_4933_9b10_52ff_a974_0042);

/// Motion Service UUID (0x0400)
pub const MOTION_SERVICE_UUID: Uuid = Uuid::from_u128(0xef68_0400_9b35_4933_9b10_52ff_a974_0042);

/// Motion Configuration Characteristic UUID (0x0401)
pub const MOTION_CONFIG_UUID: Uuid = Uuid::from_u128(0xef68_0401_9b35_4933_9b10_52ff_a974_0042);

/// Tap Characteristic UUID (0x0402)
pub const TAP_UUID: Uuid = Uuid::from_u128(0xef68_0402_9b35_4933_9b10_52ff_a974_0042);

/// Orientation Characteristic UUID (0x0403)
pub const ORIENTATION_UUID: Uuid = Uuid::from_u128(0xef68_0403_9b35_4933_9b10_52ff_a974_0042);

/// Quaternion Characteristic UUID (0x0404)
pub const QUATERNION_UUID: Uuid = Uuid::from_u128(0xef68_0404_9b35_4933_9b10_52ff_a974_0042);

/// Step Counter Characteristic UUID (0x0405)
pub const STEP_COUNTER_UUID: Uuid = Uuid::from_u128(0xef68_0405_9b35_4933_9b10_52ff_a974_0042);

/// Raw Motion Data Characteristic UUID (0x0406)
pub const RAW_MOTION_UUID: Uuid = Uuid::from_u128(0xef68_0406_9b35_4933_9b10_52ff_a974_0042);

/// Euler Angles Characteristic UUID (0x0407)
pub const EULER_UUID: Uuid = Uuid::from_u128(0xef68_0407_9b35_4933_9b10_52ff_a974_0042);

/// Rotation Matrix Characteristic UUID (0x0408)
pub const ROTATION_MATRIX_UUID: Uuid = Uuid::from_u128(0xef68_0408_9b35_4933_9b10_52ff_a974_0042);

/// Heading Characteristic UUID (0x0409)
pub const HEADING_UUID: Uuid = Uuid::from_u128(0xef68_0409_9b35_4933_9b10_52ff_a974_0042);

/// Gravity Vector Characteristic UUID (0x040A)
pub const GRAVITY_UUID: Uuid = Uuid::from_u128(0xef68_040a_9b35_4933_9b10_52ff_a974_0042);

/// Sound Service UUID (0x0500)
pub const SOUND_SERVICE_UUID: Uuid = Uuid::from_u128(0xef68_0500_9b35_4933_9b10_52ff_a974_0042);

/// Speaker Data Characteristic UUID (0x0502)
pub const SPEAKER_DATA_UUID: Uuid = Uuid::from_u128(0xef68_0502_9b35_4933_9b10_52ff_a974_0042);

/// Speaker Status Characteristic UUID (0x0503)
pub const SPEAKER_STATUS_UUID: Uuid = Uuid::from_u128(0xef68_0503_9b35_4933_9b10_52ff_a974_0042);

/// Microphone Characteristic UUID (0x0504)
pub const MICROPHONE_UUID: Uuid = Uuid::from_u128(0xef68_0504_9b35_4933_9b10_52ff_a974_0042);

/// Standard Battery Service UUID (0x180F)
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180f_0000_1000_8000_0080_5f9b_34fb);

/// Standard Battery Level Characteristic UUID (0x2A19)
pub const BATTERY_LEVEL_UUID: Uuid = Uuid::from_u128(0x0000_2a19_0000_1000_8000_0080_5f9b_34fb);

/// Look up a characteristic UUID by its symbolic sensor/actuator name.
///
/// The session uses this table to translate symbolic reads and writes into
/// concrete UUIDs; unknown names return `None`.
pub fn characteristic_by_name(name: &str) -> Option<Uuid> {
    let uuid = match name {
        "temperature" => TEMPERATURE_UUID,
        "pressure" => PRESSURE_UUID,
        "humidity" => HUMIDITY_UUID,
        "air_quality" => AIR_QUALITY_UUID,
        "color" => COLOR_UUID,
        "gas_mode" => ENVIRONMENT_CONFIG_UUID,
        "led" => LED_UUID,
        "button" => BUTTON_UUID,
        "motion_config" => MOTION_CONFIG_UUID,
        "tap" => TAP_UUID,
        "orientation" => ORIENTATION_UUID,
        "quaternion" => QUATERNION_UUID,
        "step_counter" => STEP_COUNTER_UUID,
        "raw_motion" => RAW_MOTION_UUID,
        "euler" => EULER_UUID,
        "rotation_matrix" => ROTATION_MATRIX_UUID,
        "heading" => HEADING_UUID,
        "gravity" => GRAVITY_UUID,
        "speaker_data" => SPEAKER_DATA_UUID,
        "speaker_status" => SPEAKER_STATUS_UUID,
        "microphone" => MICROPHONE_UUID,
        "battery_level" => BATTERY_LEVEL_UUID,
        _ => return None,
    };
    Some(uuid)
}
