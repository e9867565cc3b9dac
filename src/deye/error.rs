use thiserror::Error;

/// Errors returned by the frame codec.
///
/// All of these are terminal for the frame being decoded; recovery (drop the
/// frame, log, disconnect) is the caller's decision. Unknown message types
/// and unclassified trailing payload bytes are deliberately *not* errors.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum DecodeError {
    /// Leading frame byte was not 0xa5.
    #[error("invalid header magic 0x{found:02x}, expected 0xa5")]
    InvalidMagic { found: u8 },

    /// Trailing frame byte was not 0x15.
    #[error("invalid footer magic 0x{found:02x}, expected 0x15")]
    InvalidFooterMagic { found: u8 },

    /// The payload length declared in the header does not agree with the
    /// number of bytes actually received. Truncated or padded frame.
    #[error("frame length mismatch: header declares {expected} bytes but frame has {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A named payload field extends past the end of the payload.
    #[error("payload truncated: field `{field}` needs {needed} bytes but payload has {actual}")]
    TruncatedPayload {
        field: &'static str,
        needed: usize,
        actual: usize,
    },

    /// A time response was requested for a message type we have never
    /// observed; the `- 0x30` transform is only known to hold for
    /// handshake/data/heartbeat requests.
    #[error("no known response code for message type 0x{type_byte:02x}")]
    UnsupportedMessageType { type_byte: u8 },
}
