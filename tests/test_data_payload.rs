mod common;
use common::*;

use chrono::{TimeZone, Utc};
use deye_bridge::deye::error::DecodeError;
use deye_bridge::deye::fields::{self, Value, DATA_MIN_PAYLOAD_LEN};
use deye_bridge::deye::packet;

#[test]
fn decodes_known_registers_with_scales() {
    let frame = Factory::data_frame();
    let packet = packet::parse_packet(&frame).unwrap();
    let readings = fields::parse_data_packet_payload(&packet).unwrap();

    assert_eq!(readings.get("frame_type"), Some(&Value::Int(1)));
    assert_eq!(readings.get("sensor_type"), Some(&Value::Int(4)));
    assert_eq!(readings.get("total_working_time"), Some(&Value::Int(1000)));
    assert_eq!(readings.get("power_on_time"), Some(&Value::Int(600)));
    assert_eq!(
        readings.get("offset_time"),
        Some(&Value::Int(1_699_999_000))
    );
    // total_working_time + offset_time
    assert_eq!(
        readings.get("timestamp"),
        Some(&Value::Timestamp(
            Utc.timestamp_opt(1_700_000_000, 0).unwrap()
        ))
    );

    assert_eq!(
        readings.get("inverter_serial"),
        Some(&Value::Text("2407123456".to_string()))
    );
    assert_eq!(
        readings.get("module_info"),
        Some(&Value::Text("MW3_16U_5406_1.53".to_string()))
    );

    assert_eq!(readings.get("running_state"), Some(&Value::Int(2)));
    assert_eq!(
        readings.get("battery_charge_today_kWh"),
        Some(&Value::Float(5.7))
    );
    assert_eq!(
        readings.get("total_from_pv_kWh"),
        Some(&Value::Float(12345.6))
    );
    assert_eq!(
        readings.get("inverter_time"),
        Some(&Value::Timestamp(
            Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap()
        ))
    );
    assert_eq!(readings.get("grid_freq_Hz"), Some(&Value::Float(49.99)));
    assert_eq!(readings.get("ct_total_power_W"), Some(&Value::Int(-250)));
    assert_eq!(readings.get("battery_volt_V"), Some(&Value::Float(52.3)));
    assert_eq!(readings.get("battery_soc_pct"), Some(&Value::Int(77)));
    assert_eq!(readings.get("pv1_volt_V"), Some(&Value::Float(123.4)));
    assert_eq!(readings.get("unkn_154"), Some(&Value::Int(-7)));

    // zeroed named registers still show up
    assert_eq!(readings.get("pv2_volt_V"), Some(&Value::Float(0.0)));
    assert_eq!(readings.get("load_total_power_W"), Some(&Value::Int(0)));

    // 8 leading fields + 146 named registers, no tail at the documented
    // payload length
    assert_eq!(readings.len(), 154);
    assert_eq!(readings.get("unkn_155"), None);
}

#[test]
fn longer_payload_grows_a_positional_tail() {
    let mut payload = Factory::data_payload();
    payload.extend_from_slice(&42i16.to_be_bytes());
    payload.extend_from_slice(&(-42i16).to_be_bytes());
    let frame = Factory::frame(0x42, &payload);

    let packet = packet::parse_packet(&frame).unwrap();
    let readings = fields::parse_data_packet_payload(&packet).unwrap();

    // four extra bytes: exactly two extra fields, numbering on from the
    // named table, everything else untouched
    assert_eq!(readings.len(), 156);
    assert_eq!(readings.get("unkn_155"), Some(&Value::Int(42)));
    assert_eq!(readings.get("unkn_156"), Some(&Value::Int(-42)));
    assert_eq!(readings.get("pv1_volt_V"), Some(&Value::Float(123.4)));
}

#[test]
fn odd_trailing_byte_is_ignored() {
    let mut payload = Factory::data_payload();
    payload.push(0x7f);
    let frame = Factory::frame(0x42, &payload);

    let packet = packet::parse_packet(&frame).unwrap();
    let readings = fields::parse_data_packet_payload(&packet).unwrap();

    assert_eq!(readings.len(), 154);
    assert_eq!(readings.get("unkn_155"), None);
}

#[test]
fn truncated_named_field_fails() {
    let mut payload = Factory::data_payload();
    payload.truncate(DATA_MIN_PAYLOAD_LEN - 1);
    let frame = Factory::frame(0x42, &payload);

    let packet = packet::parse_packet(&frame).unwrap();
    assert_eq!(
        fields::parse_data_packet_payload(&packet),
        Err(DecodeError::TruncatedPayload {
            field: "unkn_154",
            needed: DATA_MIN_PAYLOAD_LEN,
            actual: DATA_MIN_PAYLOAD_LEN - 1,
        })
    );
}

#[test]
fn deeply_truncated_payload_fails() {
    let frame = Factory::frame(0x42, &[1, 4, 0, 0]);
    let packet = packet::parse_packet(&frame).unwrap();

    assert!(matches!(
        fields::parse_data_packet_payload(&packet),
        Err(DecodeError::TruncatedPayload { .. })
    ));
}

#[test]
fn invalid_inverter_time_becomes_null() {
    let mut payload = Factory::data_payload();
    payload[fields::DATA_FIELD_BASE + 2 * 35..fields::DATA_FIELD_BASE + 2 * 35 + 6]
        .copy_from_slice(&[24, 13, 1, 0, 0, 0]); // month 13

    let frame = Factory::frame(0x42, &payload);
    let packet = packet::parse_packet(&frame).unwrap();
    let readings = fields::parse_data_packet_payload(&packet).unwrap();

    // an invalid timestamp doesn't fail the payload, it just decodes to
    // nothing
    assert_eq!(readings.get("inverter_time"), Some(&Value::Null));
    assert_eq!(readings.get("pv1_volt_V"), Some(&Value::Float(123.4)));
}

#[test]
fn identity_payload_happy_path() {
    let frame = Factory::handshake_frame();
    let packet = packet::parse_packet(&frame).unwrap();
    let identity = fields::parse_logger_packet_payload(&packet).unwrap();

    assert_eq!(identity.fw_version, "LSW3_15_270A_1.0");
    assert_eq!(identity.ip_addr, "10.0.30.114");
    assert_eq!(identity.hw_version, "MW3_16U_5406_1.53");
    assert_eq!(identity.ssid, "SolarWiFi");
}

#[test]
fn identity_payload_truncated() {
    let mut payload = Factory::identity_payload();
    payload.truncate(209);
    let frame = Factory::frame(0x41, &payload);

    let packet = packet::parse_packet(&frame).unwrap();
    assert_eq!(
        fields::parse_logger_packet_payload(&packet),
        Err(DecodeError::TruncatedPayload {
            field: "ssid",
            needed: 210,
            actual: 209,
        })
    );
}

#[test]
fn unterminated_identity_window_is_kept_whole() {
    let mut payload = Factory::identity_payload();
    for b in payload[172..210].iter_mut() {
        *b = b'A';
    }
    let frame = Factory::frame(0x41, &payload);

    let packet = packet::parse_packet(&frame).unwrap();
    let identity = fields::parse_logger_packet_payload(&packet).unwrap();
    assert_eq!(identity.ssid, "A".repeat(38));
}
