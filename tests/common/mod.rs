#![allow(dead_code)]

use deye_bridge::deye::fields::{DATA_FIELD_BASE, DATA_MIN_PAYLOAD_LEN, IDENTITY_MIN_PAYLOAD_LEN};
use deye_bridge::deye::packet;

pub const LOGGER_SERIAL: u32 = 2712345678;
pub const RESPONSE_SEQUENCE: u8 = 0x02;
pub const REQUEST_SEQUENCE: u8 = 0x42;

pub struct Factory;

impl Factory {
    /// A checksummed frame around `payload` with the usual header fields.
    pub fn frame(message_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; payload.len() + 13];
        frame[0] = 0xa5;
        frame[1..3].copy_from_slice(&(payload.len() as u16).to_le_bytes());
        frame[3] = 0x10; // reserved1
        frame[4] = message_type;
        frame[5] = RESPONSE_SEQUENCE;
        frame[6] = REQUEST_SEQUENCE;
        frame[7..11].copy_from_slice(&LOGGER_SERIAL.to_le_bytes());
        frame[11..11 + payload.len()].copy_from_slice(payload);

        let end = frame.len();
        frame[end - 2] = packet::checksum(&frame);
        frame[end - 1] = 0x15;
        frame
    }

    /// A data payload of exactly the named-table length with known values
    /// planted at interesting offsets.
    pub fn data_payload() -> Vec<u8> {
        let mut p = vec![0u8; DATA_MIN_PAYLOAD_LEN];

        p[0] = 1; // frame_type
        p[1] = 4; // sensor_type
        p[3..7].copy_from_slice(&1_000u32.to_be_bytes()); // total_working_time
        p[7..11].copy_from_slice(&600u32.to_be_bytes()); // power_on_time
        p[11..15].copy_from_slice(&1_699_999_000u32.to_be_bytes()); // offset_time
        p[25..35].copy_from_slice(b"2407123456"); // inverter_serial
        p[41..58].copy_from_slice(b"MW3_16U_5406_1.53"); // module_info

        set_register(&mut p, 0, 2); // running_state
        set_register(&mut p, 13, 57); // battery_charge_today_kWh -> 5.7
        set_register32(&mut p, 33, 123_456); // total_from_pv_kWh -> 12345.6
        p[DATA_FIELD_BASE + 2 * 35..DATA_FIELD_BASE + 2 * 35 + 6]
            .copy_from_slice(&[24, 3, 15, 10, 30, 0]); // inverter_time
        set_register(&mut p, 55, 4999); // grid_freq_Hz -> 49.99
        set_register(&mut p, 68, -250); // ct_total_power_W
        set_register(&mut p, 92, 5230); // battery_volt_V -> 52.3
        set_register(&mut p, 93, 77); // battery_soc_pct
        set_register(&mut p, 99, 1234); // pv1_volt_V -> 123.4
        set_register(&mut p, 154, -7); // unkn_154, last named field

        p
    }

    pub fn data_frame() -> Vec<u8> {
        Self::frame(0x42, &Self::data_payload())
    }

    /// A handshake payload just long enough for every identity window.
    pub fn identity_payload() -> Vec<u8> {
        let mut p = vec![0u8; IDENTITY_MIN_PAYLOAD_LEN];
        p[19..35].copy_from_slice(b"LSW3_15_270A_1.0");
        p[65..76].copy_from_slice(b"10.0.30.114");
        p[89..106].copy_from_slice(b"MW3_16U_5406_1.53");
        p[172..181].copy_from_slice(b"SolarWiFi");
        p
    }

    pub fn handshake_frame() -> Vec<u8> {
        Self::frame(0x41, &Self::identity_payload())
    }

    pub fn heartbeat_frame() -> Vec<u8> {
        Self::frame(0x47, &[0x00])
    }
}

pub fn set_register(payload: &mut [u8], index: usize, value: i16) {
    let off = DATA_FIELD_BASE + 2 * index;
    payload[off..off + 2].copy_from_slice(&value.to_be_bytes());
}

pub fn set_register32(payload: &mut [u8], index: usize, value: i32) {
    let off = DATA_FIELD_BASE + 2 * index;
    payload[off..off + 4].copy_from_slice(&value.to_be_bytes());
}
