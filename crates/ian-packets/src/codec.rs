use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PacketError, Result};

/// Preamble: header (4) + length (4) + origin (4) + padding (4) +
/// remaining bytes (4) + packet type (4) = 24 bytes.
pub const PREAMBLE_SIZE: usize = 24;

/// Magic header opening every packet.
pub const HEADER: u32 = 0xDEAD_BEEF;

/// Default maximum payload size: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// Which side of the connection sent a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Server,
    Client,
}

impl Origin {
    /// Decode the wire value, if it is a known origin.
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Server),
            2 => Some(Self::Client),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            Self::Server => 1,
            Self::Client => 2,
        }
    }

    /// The other side of the connection.
    pub fn opposite(self) -> Self {
        match self {
            Self::Server => Self::Client,
            Self::Client => Self::Server,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("SERVER"),
            Self::Client => f.write_str("CLIENT"),
        }
    }
}

/// A framed packet whose payload has not been decoded yet.
#[derive(Debug, Clone)]
pub struct RawPacket {
    /// Who sent the packet.
    pub origin: Origin,
    /// The packet type hash.
    pub packet_type: u32,
    /// The payload following the preamble.
    pub payload: Bytes,
}

impl RawPacket {
    /// First payload byte, used to pick a factory among several sharing a
    /// packet type. Zero when the payload is empty.
    pub fn subtype(&self) -> u8 {
        self.payload.first().copied().unwrap_or(0)
    }

    /// The total wire size of this packet (preamble + payload).
    pub fn wire_size(&self) -> usize {
        PREAMBLE_SIZE + self.payload.len()
    }
}

/// Configuration for one side of a packet stream.
#[derive(Debug, Clone)]
pub struct PacketConfig {
    /// Origin stamped on written packets. Read packets must carry the
    /// opposite origin. Default: client.
    pub local_origin: Origin,
    /// Maximum payload size in bytes, both directions. Default: 1 MiB.
    pub max_payload_size: usize,
}

impl PacketConfig {
    /// Configuration for the server side, used by test servers and tools.
    pub fn server() -> Self {
        Self {
            local_origin: Origin::Server,
            ..Self::default()
        }
    }

    /// Origin expected on incoming packets.
    pub fn remote_origin(&self) -> Origin {
        self.local_origin.opposite()
    }
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            local_origin: Origin::Client,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Encode a packet into the wire format.
///
/// Wire format (all fields little-endian):
/// ```text
/// ┌────────────┬──────────┬──────────┬──────────┬────────────┬──────────┬──────────────┐
/// │ Header     │ Length   │ Origin   │ Padding  │ Remaining  │ Type     │ Payload      │
/// │ 0xDEADBEEF │ 24 + N   │ 1 or 2   │ 0        │ N + 4      │ hash     │ (N bytes)    │
/// └────────────┴──────────┴──────────┴──────────┴────────────┴──────────┴──────────────┘
/// ```
pub fn encode_packet(
    origin: Origin,
    packet_type: u32,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let max = i32::MAX as usize - PREAMBLE_SIZE;
    if payload.len() > max {
        return Err(PacketError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }
    let payload_len = payload.len() as i32;

    dst.reserve(PREAMBLE_SIZE + payload.len());
    dst.put_u32_le(HEADER);
    dst.put_i32_le(PREAMBLE_SIZE as i32 + payload_len);
    dst.put_i32_le(origin.to_wire());
    dst.put_i32_le(0);
    dst.put_i32_le(payload_len + 4);
    dst.put_u32_le(packet_type);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a packet from a buffer.
///
/// Preamble fields are validated as soon as their bytes are buffered, so a
/// corrupt header fails without waiting for the rest of the packet.
/// Returns `Ok(None)` if the buffer doesn't contain a complete packet yet.
/// On success, consumes the packet bytes from the buffer.
pub fn decode_packet(src: &mut BytesMut, config: &PacketConfig) -> Result<Option<RawPacket>> {
    let Some(header) = peek_i32(src, 0) else {
        return Ok(None);
    };
    if header as u32 != HEADER {
        return Err(PacketError::IllegalHeader(header as u32));
    }

    let Some(length) = peek_i32(src, 4) else {
        return Ok(None);
    };
    if length < PREAMBLE_SIZE as i32 {
        return Err(PacketError::IllegalLength(length));
    }
    let payload_len = length as usize - PREAMBLE_SIZE;
    if payload_len > config.max_payload_size {
        return Err(PacketError::PayloadTooLarge {
            size: payload_len,
            max: config.max_payload_size,
        });
    }

    let Some(origin) = peek_i32(src, 8) else {
        return Ok(None);
    };
    let origin = Origin::from_wire(origin).ok_or(PacketError::UnknownOrigin(origin))?;
    let expected = config.remote_origin();
    if origin != expected {
        return Err(PacketError::OriginMismatch {
            expected,
            actual: origin,
        });
    }

    let Some(padding) = peek_i32(src, 12) else {
        return Ok(None);
    };
    if padding != 0 {
        return Err(PacketError::NonEmptyPadding(padding));
    }

    let Some(remaining) = peek_i32(src, 16) else {
        return Ok(None);
    };
    let expected_remaining = payload_len as i32 + 4;
    if remaining != expected_remaining {
        return Err(PacketError::LengthDiscrepancy {
            expected: expected_remaining,
            actual: remaining,
        });
    }

    let Some(packet_type) = peek_i32(src, 20) else {
        return Ok(None);
    };

    if src.len() < PREAMBLE_SIZE + payload_len {
        return Ok(None); // Need more data
    }

    src.advance(PREAMBLE_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(RawPacket {
        origin,
        packet_type: packet_type as u32,
        payload,
    }))
}

fn peek_i32(src: &[u8], offset: usize) -> Option<i32> {
    let mut field = src.get(offset..offset + 4)?;
    Some(field.get_i32_le())
}
