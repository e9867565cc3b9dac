mod common;
use common::*;

use deye_bridge::deye::error::DecodeError;
use deye_bridge::deye::packet::{self, MessageType};
use std::convert::TryFrom;

#[test]
fn parse_header_happy_path() {
    let frame = Factory::heartbeat_frame();
    let header = packet::parse_header(&frame).unwrap();

    assert_eq!(header.magic, 0xa5);
    assert_eq!(header.payload_length, 1);
    assert_eq!(header.reserved1, 0x10);
    assert_eq!(header.message_type, 0x47);
    assert_eq!(header.response_sequence, RESPONSE_SEQUENCE);
    assert_eq!(header.request_sequence, REQUEST_SEQUENCE);
    assert_eq!(header.logger_serial, LOGGER_SERIAL);
}

#[test]
fn parse_header_rejects_bad_magic() {
    let mut frame = Factory::heartbeat_frame();
    frame[0] = 0xa6;

    assert_eq!(
        packet::parse_header(&frame),
        Err(DecodeError::InvalidMagic { found: 0xa6 })
    );
}

#[test]
fn parse_header_rejects_declared_length_mismatch() {
    let mut frame = Factory::heartbeat_frame();
    // declare one payload byte more than the frame actually carries
    frame[1..3].copy_from_slice(&2u16.to_le_bytes());

    assert_eq!(
        packet::parse_header(&frame),
        Err(DecodeError::LengthMismatch {
            expected: 15,
            actual: 14,
        })
    );
}

#[test]
fn parse_header_rejects_truncated_frame() {
    let frame = [0xa5u8; 12];
    assert!(matches!(
        packet::parse_header(&frame),
        Err(DecodeError::LengthMismatch { .. })
    ));
}

#[test]
fn parse_footer_happy_path() {
    let frame = Factory::heartbeat_frame();
    let footer = packet::parse_footer(&frame).unwrap();

    assert_eq!(footer.magic, 0x15);
    assert_eq!(footer.checksum, packet::checksum(&frame));
}

#[test]
fn parse_footer_rejects_bad_magic() {
    let mut frame = Factory::heartbeat_frame();
    let end = frame.len();
    frame[end - 1] = 0x16;

    assert_eq!(
        packet::parse_footer(&frame),
        Err(DecodeError::InvalidFooterMagic { found: 0x16 })
    );
}

// any single corrupted magic byte must flip a valid frame to failure
#[test]
fn either_magic_corruption_flips_the_result() {
    let frame = Factory::data_frame();
    assert!(packet::parse_header(&frame).is_ok());
    assert!(packet::parse_footer(&frame).is_ok());

    let mut bad_start = frame.clone();
    bad_start[0] = 0x00;
    assert!(packet::parse_header(&bad_start).is_err());

    let mut bad_end = frame;
    let end = bad_end.len();
    bad_end[end - 1] = 0x00;
    assert!(packet::parse_footer(&bad_end).is_err());
}

#[test]
fn checksum_of_zero_interior_minimum_frame_is_zero() {
    let mut frame = vec![0u8; 13];
    frame[0] = 0xa5;
    frame[12] = 0x15;

    assert_eq!(packet::checksum(&frame), 0);
}

#[test]
fn checksum_excludes_leading_magic_and_footer() {
    // interior is bytes 1..len-2; leading 0xa5 and both footer bytes must
    // not contribute
    let mut frame = vec![0u8; 13];
    frame[0] = 0xa5;
    frame[1] = 7;
    frame[10] = 11;
    frame[11] = 0xff; // stored checksum, excluded
    frame[12] = 0x15;

    assert_eq!(packet::checksum(&frame), 18);
}

#[test]
fn checksum_wraps_modulo_256() {
    let mut frame = vec![0u8; 13];
    frame[0] = 0xa5;
    frame[1] = 200;
    frame[2] = 200;
    frame[12] = 0x15;

    assert_eq!(packet::checksum(&frame), 144);
}

#[test]
fn parse_packet_exposes_payload_view() {
    let payload = [1u8, 2, 3, 4, 5];
    let frame = Factory::frame(0x42, &payload);

    let packet = packet::parse_packet(&frame).unwrap();
    assert_eq!(packet.payload, &payload);
    assert_eq!(packet.header.payload_length as usize, payload.len());
}

#[test]
fn parse_packet_accepts_unknown_message_types() {
    // classification is informational; an unknown type still parses
    let frame = Factory::frame(0x55, &[1, 2, 3]);
    let packet = packet::parse_packet(&frame).unwrap();
    assert_eq!(packet.header.message_type, 0x55);
}

#[test]
fn message_type_wire_codes() {
    assert_eq!(u8::from(MessageType::Handshake), 0x41);
    assert_eq!(u8::from(MessageType::Data), 0x42);
    assert_eq!(u8::from(MessageType::Heartbeat), 0x47);

    assert_eq!(MessageType::Handshake.response_code(), 0x11);
    assert_eq!(MessageType::Data.response_code(), 0x12);
    assert_eq!(MessageType::Heartbeat.response_code(), 0x17);

    assert_eq!(MessageType::try_from(0x42), Ok(MessageType::Data));
    assert!(MessageType::try_from(0x55).is_err());
}
