use bytes::Bytes;

use crate::codec::Origin;

/// Errors that can occur while framing, reading or writing packets.
///
/// Framing errors are fatal to a stream: once one is returned the read
/// position can no longer be trusted to sit on a packet boundary.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The preamble does not start with the magic header.
    #[error("illegal packet header 0x{0:08x} (expected 0xdeadbeef)")]
    IllegalHeader(u32),

    /// The declared length is shorter than the preamble itself.
    #[error("illegal packet length {0} (minimum 24)")]
    IllegalLength(i32),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The origin field is neither server nor client.
    #[error("unknown packet origin {0}")]
    UnknownOrigin(i32),

    /// The packet came from the wrong side of the connection.
    #[error("packet origin {actual} does not match expected {expected}")]
    OriginMismatch { expected: Origin, actual: Origin },

    /// The padding field is not zero.
    #[error("non-empty preamble padding {0}")]
    NonEmptyPadding(i32),

    /// The remaining-bytes field disagrees with the declared length.
    #[error("remaining byte count {actual} does not match expected {expected}")]
    LengthDiscrepancy { expected: i32, actual: i32 },

    /// An I/O error occurred while reading or writing packets.
    #[error("packet I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete packet was received.
    #[error("connection closed (incomplete packet)")]
    ConnectionClosed,

    /// `start` was called while a packet was already being written.
    #[error("packet writer already started for type 0x{0:08x}")]
    AlreadyStarted(u32),

    /// A write or flush was attempted without `start`.
    #[error("packet writer not started")]
    NotStarted,

    /// A string cannot be represented in the requested encoding.
    #[error("string cannot be encoded: {0}")]
    InvalidString(String),
}

/// Errors raised while decoding fields out of a payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// Fewer bytes remain than the field needs.
    #[error("payload ended early: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    /// A conditional read was attempted before `start_object`.
    #[error("no bit field is active")]
    NoBitField,

    /// The bit index lies outside the active bit field.
    #[error("bit {bit} out of range for a {bit_count}-bit field")]
    BitOutOfRange { bit: usize, bit_count: usize },

    /// A string length prefix is negative.
    #[error("invalid string length {0}")]
    InvalidStringLength(i32),

    /// A UTF-16 string contains unpaired surrogates.
    #[error("invalid UTF-16 string: {0}")]
    InvalidUtf16(#[from] std::string::FromUtf16Error),

    /// An ASCII string contains a byte above 0x7f.
    #[error("non-ASCII byte 0x{0:02x} in ASCII string")]
    NonAscii(u8),

    /// A field holds a value outside its domain.
    #[error("invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: i64 },
}

/// A payload that failed to decode, with enough context to diagnose it.
#[derive(Debug, thiserror::Error)]
#[error(
    "failed to parse packet type 0x{packet_type:08x} subtype 0x{subtype:02x} ({} payload bytes): {source}",
    .payload.len()
)]
pub struct ParseFailure {
    /// Packet type from the preamble.
    pub packet_type: u32,
    /// First payload byte.
    pub subtype: u8,
    /// The raw payload that failed to decode.
    pub payload: Bytes,
    /// What went wrong.
    #[source]
    pub source: PayloadError,
}

pub type Result<T> = std::result::Result<T, PacketError>;
