use crate::prelude::*;

use chrono::TimeZone;
use nom_derive::{Nom, Parse};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;
use std::convert::TryFrom;

use super::error::DecodeError;

pub const HEADER_LEN: usize = 11;
pub const FOOTER_LEN: usize = 2;
pub const FRAME_MIN_LEN: usize = HEADER_LEN + FOOTER_LEN;

pub const FRAME_START_MAGIC: u8 = 0xa5;
pub const FRAME_END_MAGIC: u8 = 0x15;

/// Request codes subtract this to become their response code, e.g.
/// DATA 0x42 -> 0x12. Only verified for the three types below.
const RESPONSE_OFFSET: u8 = 0x30;

pub const TIME_RESPONSE_LEN: usize = 23;
const TIME_RESPONSE_PAYLOAD_LEN: u16 = 10;

// MessageType {{{
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    Handshake = 0x41,
    Data = 0x42,
    // 0x43 is suspected to be a wifi info report; never captured, so not listed
    Heartbeat = 0x47,
}

impl MessageType {
    pub fn response_code(self) -> u8 {
        u8::from(self) - RESPONSE_OFFSET
    }
}
// }}}

// FrameHeader {{{
/// The 11 leading bytes of every frame. All multi-byte header fields are
/// little-endian, unlike the big-endian registers in the data payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Nom)]
#[nom(LittleEndian)]
pub struct FrameHeader {
    pub magic: u8,
    pub payload_length: u16,
    pub reserved1: u8,
    pub message_type: u8,
    pub response_sequence: u8,
    pub request_sequence: u8,
    pub logger_serial: u32,
}
// }}}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FrameFooter {
    pub checksum: u8,
    pub magic: u8,
}

/// A validated frame, split into its header and a borrowed payload view.
/// Never outlives the frame buffer it was parsed from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Packet<'a> {
    pub header: FrameHeader,
    pub payload: &'a [u8],
}

pub fn parse_header(frame: &[u8]) -> Result<FrameHeader, DecodeError> {
    if frame.len() < FRAME_MIN_LEN {
        return Err(DecodeError::LengthMismatch {
            expected: FRAME_MIN_LEN,
            actual: frame.len(),
        });
    }

    let (_, header) = FrameHeader::parse(frame).map_err(|_| DecodeError::LengthMismatch {
        expected: FRAME_MIN_LEN,
        actual: frame.len(),
    })?;

    if header.magic != FRAME_START_MAGIC {
        return Err(DecodeError::InvalidMagic {
            found: header.magic,
        });
    }

    let expected = header.payload_length as usize + HEADER_LEN + FOOTER_LEN;
    if expected != frame.len() {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: frame.len(),
        });
    }

    Ok(header)
}

pub fn parse_footer(frame: &[u8]) -> Result<FrameFooter, DecodeError> {
    if frame.len() < FRAME_MIN_LEN {
        return Err(DecodeError::LengthMismatch {
            expected: FRAME_MIN_LEN,
            actual: frame.len(),
        });
    }

    let footer = FrameFooter {
        checksum: frame[frame.len() - 2],
        magic: frame[frame.len() - 1],
    };

    if footer.magic != FRAME_END_MAGIC {
        return Err(DecodeError::InvalidFooterMagic {
            found: footer.magic,
        });
    }

    Ok(footer)
}

/// Wrapping byte sum over everything except the leading magic and the two
/// footer bytes. Computed on decode but never enforced here; whether a
/// mismatching frame is dropped is caller policy.
pub fn checksum(frame: &[u8]) -> u8 {
    let end = frame.len().saturating_sub(FOOTER_LEN);
    frame
        .get(1..end)
        .map(|interior| interior.iter().fold(0u8, |sum, b| sum.wrapping_add(*b)))
        .unwrap_or(0)
}

/// Splits a frame into header and payload view. The message type is only
/// classified for logging; a type we have never seen is not an error.
pub fn parse_packet(frame: &[u8]) -> Result<Packet<'_>, DecodeError> {
    let header = parse_header(frame)?;

    match MessageType::try_from(header.message_type) {
        Ok(t) => debug!("logger {}: RX {:?} packet", header.logger_serial, t),
        Err(_) => warn!(
            "logger {}: RX packet of unknown type 0x{:02x}",
            header.logger_serial, header.message_type
        ),
    }

    Ok(Packet {
        header,
        payload: &frame[HEADER_LEN..frame.len() - FOOTER_LEN],
    })
}

/// Six payload bytes as {year-2000, month, day, hour, minute, second}.
/// No calendar validation; an impossible date comes back as None and it is
/// up to the caller what to do with the invalid timestamp.
pub fn parse_time(buf: &[u8; 6]) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::Utc
        .with_ymd_and_hms(
            2000 + buf[0] as i32,
            buf[1] as u32,
            buf[2] as u32,
            buf[3] as u32,
            buf[4] as u32,
            buf[5] as u32,
        )
        .single()
}

// TimeResponseOptions {{{
/// Knobs for the two behaviours that differ between observed logger
/// firmwares: the value of the trailing 4-byte word (0 on most units, 1 on
/// some) and whether the timestamp is shifted away from UTC.
#[derive(Clone, Copy, Debug)]
pub struct TimeResponseOptions {
    pub tail_word: u32,
    pub utc_offset_secs: i64,
}

impl Default for TimeResponseOptions {
    fn default() -> Self {
        Self {
            tail_word: 0,
            utc_offset_secs: 0,
        }
    }
}
// }}}

/// Builds the 23-byte time-sync reply for a handshake/data/heartbeat
/// request. Refuses any other message type: the `- 0x30` code transform is
/// only verified for those three, so guessing would risk emitting a frame
/// the logger interprets as something else entirely.
pub fn build_time_response(
    packet: &Packet,
    now: chrono::DateTime<chrono::Utc>,
    opts: &TimeResponseOptions,
) -> Result<Vec<u8>, DecodeError> {
    let request_type =
        MessageType::try_from(packet.header.message_type).map_err(|_| {
            DecodeError::UnsupportedMessageType {
                type_byte: packet.header.message_type,
            }
        })?;

    let mut r = vec![0u8; TIME_RESPONSE_LEN];

    r[0] = FRAME_START_MAGIC;
    r[1..3].copy_from_slice(&TIME_RESPONSE_PAYLOAD_LEN.to_le_bytes());
    r[3] = packet.header.reserved1;
    r[4] = request_type.response_code();
    r[5] = packet.header.response_sequence.wrapping_add(1);
    r[6] = packet.header.request_sequence;
    r[7..11].copy_from_slice(&packet.header.logger_serial.to_le_bytes());

    r[11] = packet.payload.first().copied().unwrap_or(0);
    r[12] = 0x01;
    // time fields are little-endian like the header, not big-endian like
    // the payload registers
    let stamp = (now.timestamp() + opts.utc_offset_secs) as u32;
    r[13..17].copy_from_slice(&stamp.to_le_bytes());
    r[17..21].copy_from_slice(&opts.tail_word.to_le_bytes());

    r[21] = checksum(&r);
    r[22] = FRAME_END_MAGIC;

    Ok(r)
}
