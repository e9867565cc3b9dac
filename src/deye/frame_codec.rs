use crate::prelude::*;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use super::packet::{FOOTER_LEN, FRAME_START_MAGIC, HEADER_LEN};

/// Upper bound on a declared frame; anything bigger means the stream is
/// garbage, not a long packet.
const MAX_FRAME_LEN: usize = 4096;

/// Cuts complete frames out of the inbound byte stream using the payload
/// length declared at header bytes 1-2. Yields raw frame buffers; all
/// further validation (magics, checksum, payload decode) happens in the
/// codec proper.
#[derive(Default)]
pub struct FrameDecoder;

impl FrameDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameDecoder {
    type Item = Vec<u8>;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        // a stream that doesn't start with the frame magic can't be
        // resynchronized; drop the connection and let the logger retry
        if src[0] != FRAME_START_MAGIC {
            bail!(
                "stream desynchronized: expected frame magic 0xa5, got 0x{:02x}",
                src[0]
            );
        }

        let payload_length = u16::from_le_bytes([src[1], src[2]]) as usize;
        let frame_length = payload_length + HEADER_LEN + FOOTER_LEN;
        if frame_length > MAX_FRAME_LEN {
            bail!(
                "declared frame length {} exceeds maximum {}",
                frame_length,
                MAX_FRAME_LEN
            );
        }

        if src.len() < frame_length {
            src.reserve(frame_length - src.len());
            return Ok(None);
        }

        Ok(Some(src.split_to(frame_length).to_vec()))
    }
}
