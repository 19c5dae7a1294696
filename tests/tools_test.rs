//! End-to-end tool surface tests: dispatch with JSON arguments against the
//! scripted mock transport, asserting result payloads and wire traffic.

mod common;

use common::{Call, MockLink, MockTransport};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use thingy_mcp::ble::session::Session;
use thingy_mcp::ble::types::SessionConfig;
use thingy_mcp::ble::uuids;
use thingy_mcp::tools::{dispatch, ToolError};

const ADDR: &str = "AA:BB:CC:DD:EE:FF";

fn fast_config() -> SessionConfig {
    SessionConfig {
        read_timeout: Duration::from_millis(80),
        write_timeout: Duration::from_millis(80),
        retry_delay: Duration::from_millis(10),
        ..SessionConfig::default()
    }
}

fn session_with(link: Arc<MockLink>) -> Arc<Session> {
    let transport = MockTransport::new();
    transport.add_link(link);
    Session::new(transport, fast_config())
}

async fn connect(session: &Arc<Session>) {
    let result = dispatch(session, "connect_device", json!({ "address": ADDR }))
        .await
        .expect("connect_device failed");
    assert_eq!(result["connected"], true);
}

#[tokio::test]
async fn test_scan_and_connect() {
    let transport = MockTransport::new();
    transport.add_scan_result(ADDR, Some("Thingy"), -55);
    transport.add_link(MockLink::new(ADDR, Some("Thingy")));
    let session = Session::new(transport, fast_config());

    let result = dispatch(&session, "scan_devices", json!({ "timeout_seconds": 1 }))
        .await
        .unwrap();
    assert_eq!(result.as_array().unwrap().len(), 1);
    assert_eq!(result[0]["address"], ADDR);
    assert_eq!(result[0]["name"], "Thingy");
    assert_eq!(result[0]["rssi"], -55);

    let result = dispatch(&session, "connect_device", json!({ "address": ADDR }))
        .await
        .unwrap();
    assert_eq!(result["connected"], true);
    assert_eq!(result["address"], ADDR);
    assert_eq!(result["name"], "Thingy");
}

#[tokio::test]
async fn test_scan_timeout_out_of_range() {
    let session = session_with(MockLink::new(ADDR, None));

    let err = dispatch(&session, "scan_devices", json!({ "timeout_seconds": 0 }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidArgument");
}

#[tokio::test]
async fn test_read_temperature_result_shape() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    link.queue_notification(uuids::TEMPERATURE_UUID, &[0x17, 0x32]);
    let session = session_with(link);
    connect(&session).await;

    let result = dispatch(&session, "read_temperature", json!({})).await.unwrap();
    assert_eq!(result["temperature_celsius"], 23.5);
    assert_eq!(result["unit"], "°C");
}

#[tokio::test]
async fn test_read_air_quality_result_shape() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    link.queue_notification(uuids::AIR_QUALITY_UUID, &[0x58, 0x02, 0x4B, 0x00]);
    let session = session_with(link);
    connect(&session).await;

    let result = dispatch(&session, "read_air_quality", json!({})).await.unwrap();
    assert_eq!(result["co2_ppm"], 600);
    assert_eq!(result["tvoc_ppb"], 75);
}

#[tokio::test]
async fn test_set_led_color_by_name_writes_one_frame() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    let session = session_with(link.clone());
    connect(&session).await;

    dispatch(&session, "set_led_color", json!({ "color": "red" }))
        .await
        .unwrap();

    let writes = link.writes();
    assert_eq!(writes.len(), 1, "expected exactly one LED write");
    let (uuid, payload, with_response) = &writes[0];
    assert_eq!(*uuid, uuids::LED_UUID);
    assert_eq!(payload, &vec![0x01, 0xFF, 0x00, 0x00]);
    assert!(!with_response);
}

#[tokio::test]
async fn test_set_led_color_intensity_scaling() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    let session = session_with(link.clone());
    connect(&session).await;

    dispatch(
        &session,
        "set_led_color",
        json!({ "color": "red", "intensity": 50 }),
    )
    .await
    .unwrap();

    // floor(255 * 0.5) = 127
    let writes = link.writes();
    assert_eq!(writes[0].1, vec![0x01, 0x7F, 0x00, 0x00]);
}

#[tokio::test]
async fn test_set_led_color_rejects_out_of_range_channel() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    let session = session_with(link.clone());
    connect(&session).await;
    let calls_before = link.calls().len();

    let err = dispatch(&session, "set_led_color", json!({ "red": 300 }))
        .await
        .unwrap_err();
    let value = err.to_value();
    assert_eq!(value["error"]["kind"], "InvalidArgument");
    assert_eq!(value["error"]["details"]["field"], "red");

    // Validation failures never touch the link.
    assert_eq!(link.calls().len(), calls_before);
}

#[tokio::test]
async fn test_set_led_color_requires_name_or_full_rgb() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    let session = session_with(link.clone());
    connect(&session).await;

    let err = dispatch(&session, "set_led_color", json!({ "red": 10, "green": 20 }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidArgument");
    assert!(link.writes().is_empty());
}

#[tokio::test]
async fn test_set_led_breathe_uses_color_code() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    let session = session_with(link.clone());
    connect(&session).await;

    dispatch(
        &session,
        "set_led_breathe",
        json!({ "color": "blue", "intensity": 20, "delay_ms": 3000 }),
    )
    .await
    .unwrap();

    // Four bytes, never five: mode, color code, intensity, trailing zero.
    let writes = link.writes();
    assert_eq!(writes[0].1, vec![0x02, 0x04, 0x14, 0x00]);
}

#[tokio::test]
async fn test_set_led_breathe_rejects_non_breathe_color() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    let session = session_with(link.clone());
    connect(&session).await;

    // Orange is a constant-mode color; breathe mode has no code for it.
    let err = dispatch(&session, "set_led_breathe", json!({ "color": "orange" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidArgument");
    assert!(link.writes().is_empty());
}

#[tokio::test]
async fn test_turn_off_led() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    let session = session_with(link.clone());
    connect(&session).await;

    dispatch(&session, "turn_off_led", json!({})).await.unwrap();
    assert_eq!(link.writes()[0].1, vec![0x00, 0x00, 0x00, 0x00]);
}

#[tokio::test]
async fn test_beep_writes_sample_mode_frame() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    let session = session_with(link.clone());
    connect(&session).await;

    dispatch(&session, "beep", json!({})).await.unwrap();

    let writes = link.writes();
    assert_eq!(writes.len(), 1, "expected exactly one speaker write");
    let (uuid, payload, with_response) = &writes[0];
    assert_eq!(*uuid, uuids::SPEAKER_DATA_UUID);
    assert_eq!(payload, &vec![0x03, 0x01]);
    assert!(!with_response);
}

#[tokio::test]
async fn test_play_sound_range_check() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    let session = session_with(link.clone());
    connect(&session).await;

    let err = dispatch(&session, "play_sound", json!({ "sound_id": 9 }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidArgument");
    assert!(link.writes().is_empty());

    dispatch(&session, "play_sound", json!({ "sound_id": 8 }))
        .await
        .unwrap();
    assert_eq!(link.writes()[0].1, vec![0x03, 0x08]);
}

#[tokio::test]
async fn test_connected_only_tools_require_connection() {
    let session = session_with(MockLink::new(ADDR, None));

    for tool in [
        "read_temperature",
        "read_quaternion",
        "set_led_color",
        "beep",
    ] {
        let args = if tool == "set_led_color" {
            json!({ "color": "red" })
        } else {
            json!({})
        };
        let err = dispatch(&session, tool, args).await.unwrap_err();
        assert_eq!(err.kind(), "NotConnected", "tool {} wrong kind", tool);
    }
}

#[tokio::test]
async fn test_get_device_status_disconnected() {
    let session = session_with(MockLink::new(ADDR, None));

    let result = dispatch(&session, "get_device_status", json!({})).await.unwrap();
    assert_eq!(result["connected"], false);
    assert!(result.get("address").is_none());
}

#[tokio::test]
async fn test_get_device_status_with_battery() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    link.set_readable(uuids::BATTERY_LEVEL_UUID, &[92]);
    let session = session_with(link);
    connect(&session).await;

    let result = dispatch(&session, "get_device_status", json!({})).await.unwrap();
    assert_eq!(result["connected"], true);
    assert_eq!(result["address"], ADDR);
    assert_eq!(result["battery_percent"], 92);
}

#[tokio::test]
async fn test_read_all_sensors_partial_failure() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    link.queue_notification(uuids::TEMPERATURE_UUID, &[0x17, 0x32]);
    // Color feeds both the color and the light read.
    let mut color = Vec::new();
    for channel in [10u16, 20, 30, 400] {
        color.extend_from_slice(&channel.to_le_bytes());
    }
    link.queue_notification(uuids::COLOR_UUID, &color);
    link.queue_notification(uuids::COLOR_UUID, &color);
    // Humidity, pressure and air quality never answer.
    let session = session_with(link);
    connect(&session).await;

    let result = dispatch(&session, "read_all_sensors", json!({})).await.unwrap();
    assert_eq!(result["temperature"]["temperature_celsius"], 23.5);
    assert_eq!(result["color"]["clear"], 400);
    assert_eq!(result["light"]["lux"], 400.0);
    assert_eq!(result["humidity"], Value::Null);
    assert_eq!(result["pressure"], Value::Null);
    assert_eq!(result["air_quality"], Value::Null);

    let errors = result["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 3);
    for error in errors {
        assert_eq!(error["kind"], "Timeout");
    }
}

#[tokio::test]
async fn test_read_tap_event_reports_direction() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    link.queue_notification(uuids::TAP_UUID, &[5, 2]);
    let session = session_with(link);
    connect(&session).await;

    let result = dispatch(
        &session,
        "read_tap_event",
        json!({ "timeout_seconds": 1 }),
    )
    .await
    .unwrap();
    assert_eq!(result["direction"], "z_up");
    assert_eq!(result["count"], 2);
    assert_eq!(result["type"], "double");
}

#[tokio::test]
async fn test_read_orientation_auto_configures_motion() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    link.queue_notification(uuids::ORIENTATION_UUID, &[1]);
    let session = session_with(link.clone());
    connect(&session).await;

    let result = dispatch(&session, "read_orientation", json!({})).await.unwrap();
    assert_eq!(result["orientation"], "landscape");

    assert!(link
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Write(u, _, _) if *u == uuids::MOTION_CONFIG_UUID)));
}

#[tokio::test]
async fn test_read_quaternion_result_shape() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    let mut payload = Vec::new();
    payload.extend_from_slice(&(1i32 << 30).to_le_bytes());
    payload.extend_from_slice(&0i32.to_le_bytes());
    payload.extend_from_slice(&0i32.to_le_bytes());
    payload.extend_from_slice(&0i32.to_le_bytes());
    link.queue_notification(uuids::QUATERNION_UUID, &payload);
    let session = session_with(link);
    connect(&session).await;

    let result = dispatch(&session, "read_quaternion", json!({})).await.unwrap();
    assert_eq!(result["w"], 1.0);
    assert_eq!(result["x"], 0.0);
}

#[tokio::test]
async fn test_missing_characteristic_is_not_reported_as_link_loss() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    // This peripheral never exposed the temperature characteristic, so the
    // transport's lookup fails with an unclassified stack error.
    link.set_missing(uuids::TEMPERATURE_UUID);
    link.set_readable(uuids::BATTERY_LEVEL_UUID, &[77]);
    let session = session_with(link);
    connect(&session).await;

    let err = dispatch(&session, "read_temperature", json!({})).await.unwrap_err();
    let value = err.to_value();
    assert_eq!(value["error"]["kind"], "BleError");

    // The link is still up; the reported kind must agree with that.
    let result = dispatch(&session, "get_device_status", json!({})).await.unwrap();
    assert_eq!(result["connected"], true);
    assert_eq!(result["battery_percent"], 77);
}

#[tokio::test]
async fn test_unknown_tool() {
    let session = session_with(MockLink::new(ADDR, None));

    let err = dispatch(&session, "calibrate_warp_drive", json!({})).await.unwrap_err();
    assert!(matches!(err, ToolError::UnknownTool(_)));
    assert_eq!(err.kind(), "NotFound");
}

#[tokio::test]
async fn test_disconnect_tool_is_idempotent() {
    let link = MockLink::new(ADDR, Some("Thingy"));
    let session = session_with(link);
    connect(&session).await;

    let result = dispatch(&session, "disconnect_device", json!({})).await.unwrap();
    assert_eq!(result["connected"], false);

    let result = dispatch(&session, "disconnect_device", json!({})).await.unwrap();
    assert_eq!(result["connected"], false);
}
